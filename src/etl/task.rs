//! Task orchestration for the extract → transform → load loop

use super::{Extractor, Loader, Transformer};
use crate::config::ConfigTree;
use eyre::Result;

/// Default number of extracted records between progress log lines
pub const DEFAULT_PROGRESS_REPORT_FREQUENCY: u64 = 500;

/// A unit of work run by a job before publishing
pub trait Task: Send {
    /// Run the task to completion
    fn run(&mut self) -> impl std::future::Future<Output = Result<TaskReport>> + Send;
}

/// Counters collected while a task runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Records pulled from the extractor
    pub extracted: u64,
    /// Records handed to the loader
    pub loaded: u64,
    /// Extracted records the transformer dropped entirely
    pub filtered: u64,
}

/// Task that drives an extractor through a transformer into a loader
///
/// # Type Parameters
/// - `E`: Extractor type
/// - `T`: Transformer type (must transform from E::Item)
/// - `L`: Loader type (must load T::Output)
///
/// # Example
/// ```no_run
/// use databuilder::etl::{DefaultTask, GenericExtractor, GenericLoader, NoopTransformer, Task};
///
/// # async fn example() -> eyre::Result<()> {
/// let mut task = DefaultTask::new(
///     GenericExtractor::new(vec![1, 2, 3]),
///     NoopTransformer::<i32>::new(),
///     GenericLoader::new(|item: i32| {
///         println!("{}", item);
///         Ok(())
///     }),
/// );
///
/// let report = task.run().await?;
/// println!("Loaded {} records", report.loaded);
/// # Ok(())
/// # }
/// ```
pub struct DefaultTask<E, T, L> {
    extractor: E,
    transformer: T,
    loader: L,
    progress_report_frequency: u64,
}

impl<E, T, L> DefaultTask<E, T, L>
where
    E: Extractor,
    T: Transformer<Input = E::Item>,
    L: Loader<Item = T::Output>,
{
    /// Create a new task
    pub fn new(extractor: E, transformer: T, loader: L) -> Self {
        Self {
            extractor,
            transformer,
            loader,
            progress_report_frequency: DEFAULT_PROGRESS_REPORT_FREQUENCY,
        }
    }

    /// Apply `task.progress_report_frequency` from the job config
    pub fn with_config(mut self, job_conf: &ConfigTree) -> Result<Self> {
        self.progress_report_frequency = job_conf.get_u64_or(
            "task.progress_report_frequency",
            DEFAULT_PROGRESS_REPORT_FREQUENCY,
        )?;
        Ok(self)
    }

    pub fn with_progress_report_frequency(mut self, frequency: u64) -> Self {
        self.progress_report_frequency = frequency;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    async fn drain(&mut self, report: &mut TaskReport) -> Result<()> {
        while let Some(record) = self.extractor.extract().await? {
            report.extracted += 1;

            let outputs = self.transformer.transform(record)?;
            if outputs.is_empty() {
                report.filtered += 1;
            }
            for output in outputs {
                self.loader.load(output).await?;
                report.loaded += 1;
            }

            if self.progress_report_frequency > 0
                && report.extracted % self.progress_report_frequency == 0
            {
                log::info!(
                    "Processed {} records ({} loaded)",
                    report.extracted,
                    report.loaded
                );
            }
        }
        Ok(())
    }
}

impl<E, T, L> Task for DefaultTask<E, T, L>
where
    E: Extractor,
    T: Transformer<Input = E::Item>,
    L: Loader<Item = T::Output>,
{
    /// Run the extract → transform → load loop until the extractor is exhausted
    ///
    /// The extractor and loader are closed whether or not the loop succeeds.
    /// The first error encountered is returned.
    async fn run(&mut self) -> Result<TaskReport> {
        log::info!("Starting task");
        let mut report = TaskReport::default();

        let drained = self.drain(&mut report).await;
        let extractor_closed = self.extractor.close().await;
        let loader_closed = self.loader.close().await;

        drained?;
        extractor_closed?;
        loader_closed?;

        if report.extracted == 0 {
            log::warn!("No records extracted, task complete");
        } else {
            log::info!(
                "Task complete: extracted {}, loaded {}, filtered {}",
                report.extracted,
                report.loaded,
                report.filtered
            );
        }
        Ok(report)
    }
}
