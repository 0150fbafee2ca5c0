//! Publisher trait for pushing staged records into a store

use eyre::{Report, Result};

/// Publisher trait for bulk-publishing staged records
///
/// A publisher runs after the task has drained the extractor and the loader
/// has flushed its staging files. It reads those files and upserts their
/// contents into the destination store.
pub trait Publisher: Send {
    /// Publish everything that was staged
    ///
    /// # Errors
    /// Returns an error if any batch fails to publish
    fn publish(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Wrap this publisher so `callback` observes the publish outcome
    fn with_callback(self, callback: impl Callback + 'static) -> Callbacks<Self>
    where
        Self: Sized,
    {
        Callbacks::new(self).register(callback)
    }
}

/// Hook notified after a publish succeeds or fails
pub trait Callback: Send + Sync {
    fn on_success(&self) -> Result<()>;

    fn on_failure(&self, error: &Report) -> Result<()>;
}

/// Publisher that publishes nothing
///
/// Used for jobs whose loader is the final destination.
#[derive(Debug, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    async fn publish(&mut self) -> Result<()> {
        log::debug!("No publisher configured, skipping publish");
        Ok(())
    }
}

/// Publisher wrapper that runs registered callbacks after publishing
///
/// On success every callback's `on_success` runs in registration order and the
/// first callback error is returned. On failure every callback's `on_failure`
/// runs (callback errors are logged) and the original publish error is
/// returned.
pub struct Callbacks<P> {
    inner: P,
    callbacks: Vec<Box<dyn Callback>>,
}

impl<P: Publisher> Callbacks<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            callbacks: Vec::new(),
        }
    }

    /// Register another callback
    pub fn register(mut self, callback: impl Callback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Publisher> Publisher for Callbacks<P> {
    async fn publish(&mut self) -> Result<()> {
        match self.inner.publish().await {
            Ok(()) => {
                let mut first_err = None;
                for callback in &self.callbacks {
                    if let Err(err) = callback.on_success() {
                        log::warn!("Publish success callback errored: {:#}", err);
                        first_err.get_or_insert(err);
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
            Err(err) => {
                for callback in &self.callbacks {
                    if let Err(callback_err) = callback.on_failure(&err) {
                        log::warn!("Publish failure callback errored: {:#}", callback_err);
                    }
                }
                Err(err)
            }
        }
    }
}
