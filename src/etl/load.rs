//! Loader trait for writing records to a destination

use eyre::Result;

/// Loader trait for writing records to a destination
///
/// Implementors define where records are staged:
/// - CSV files for the Neo4j publisher
/// - NDJSON files for the Elasticsearch publisher
/// - In-memory collectors
///
/// `close` must be called once loading is finished so buffered writers are
/// flushed. [`DefaultTask`](super::DefaultTask) does this automatically.
pub trait Loader: Send {
    /// The type of records to load
    type Item: Send;

    /// Load a single record
    ///
    /// # Errors
    /// Returns an error if loading fails (I/O, serialization, validation, etc.)
    fn load(&mut self, item: Self::Item) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Flush and release any resources held by the loader
    fn close(&mut self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Loader that hands every record to a closure
///
/// # Example
/// ```
/// use databuilder::etl::{GenericLoader, Loader};
///
/// # async fn example() -> eyre::Result<()> {
/// let mut seen = Vec::new();
/// let mut loader = GenericLoader::new(|item: i32| {
///     seen.push(item);
///     Ok(())
/// });
/// loader.load(1).await?;
/// # Ok(())
/// # }
/// ```
pub struct GenericLoader<T, F> {
    callback: F,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<T, F> GenericLoader<T, F>
where
    F: FnMut(T) -> Result<()>,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> Loader for GenericLoader<T, F>
where
    T: Send,
    F: FnMut(T) -> Result<()> + Send,
{
    type Item = T;

    async fn load(&mut self, item: Self::Item) -> Result<()> {
        (self.callback)(item)
    }
}
