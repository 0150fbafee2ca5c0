//! Job lifecycle: run a task, then publish what it staged

use super::{NoopPublisher, Publisher, Task, TaskReport};
use crate::config::ConfigTree;
use eyre::{Context, Result};
use std::time::{Duration, Instant};

/// Outcome of a successful job launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub task: TaskReport,
    pub elapsed: Duration,
}

/// Job that runs a task and then its publisher
///
/// The publisher only runs after the task succeeds. Failures from either
/// stage are logged with the job identifier and returned.
pub struct DefaultJob<T, P = NoopPublisher> {
    identifier: String,
    task: T,
    publisher: P,
}

impl<T: Task> DefaultJob<T, NoopPublisher> {
    /// Create a job whose task is the final destination
    pub fn new(identifier: impl Into<String>, task: T) -> Self {
        Self::with_publisher(identifier, task, NoopPublisher)
    }
}

impl<T: Task, P: Publisher> DefaultJob<T, P> {
    pub fn with_publisher(identifier: impl Into<String>, task: T, publisher: P) -> Self {
        Self {
            identifier: identifier.into(),
            task,
            publisher,
        }
    }

    /// Create a job named by `job.identifier` (default `databuilder`)
    pub fn from_config(job_conf: &ConfigTree, task: T, publisher: P) -> Self {
        let identifier = job_conf.get_string_or("job.identifier", "databuilder");
        Self::with_publisher(identifier, task, publisher)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Run the task, then publish
    ///
    /// # Errors
    /// Returns the task error (publisher skipped) or the publisher error
    pub async fn launch(&mut self) -> Result<JobReport> {
        let started = Instant::now();
        log::info!("Launching job '{}'", self.identifier);

        let task = self
            .task
            .run()
            .await
            .with_context(|| format!("Task failed for job '{}'", self.identifier))?;

        self.publisher
            .publish()
            .await
            .with_context(|| format!("Publish failed for job '{}'", self.identifier))?;

        let elapsed = started.elapsed();
        log::info!(
            "Job '{}' finished in {:.2?}: {} records loaded",
            self.identifier,
            elapsed,
            task.loaded
        );
        Ok(JobReport { task, elapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CountingTask {
        fail: bool,
    }

    impl Task for CountingTask {
        async fn run(&mut self) -> Result<TaskReport> {
            if self.fail {
                eyre::bail!("extract failed");
            }
            Ok(TaskReport {
                extracted: 3,
                loaded: 3,
                filtered: 0,
            })
        }
    }

    struct FlagPublisher(Arc<Mutex<bool>>);

    impl Publisher for FlagPublisher {
        async fn publish(&mut self) -> Result<()> {
            *self.0.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_job_runs_task_then_publisher() {
        let published = Arc::new(Mutex::new(false));
        let mut job = DefaultJob::with_publisher(
            "test_job",
            CountingTask { fail: false },
            FlagPublisher(published.clone()),
        );

        let report = job.launch().await.unwrap();
        assert_eq!(report.task.loaded, 3);
        assert!(*published.lock().unwrap());
    }

    #[tokio::test]
    async fn test_job_skips_publish_when_task_fails() {
        let published = Arc::new(Mutex::new(false));
        let mut job = DefaultJob::with_publisher(
            "test_job",
            CountingTask { fail: true },
            FlagPublisher(published.clone()),
        );

        let err = job.launch().await.unwrap_err();
        assert_eq!(err.to_string(), "Task failed for job 'test_job'");
        assert!(format!("{:#}", err).contains("extract failed"));
        assert!(!*published.lock().unwrap());
    }

    struct BrokenPublisher;

    impl Publisher for BrokenPublisher {
        async fn publish(&mut self) -> Result<()> {
            eyre::bail!("store unavailable")
        }
    }

    #[tokio::test]
    async fn test_publish_error_returned_with_job_context() {
        let mut job = DefaultJob::with_publisher("nightly", CountingTask { fail: false }, BrokenPublisher);

        let err = job.launch().await.unwrap_err();
        assert_eq!(err.to_string(), "Publish failed for job 'nightly'");
        assert_eq!(err.root_cause().to_string(), "store unavailable");
    }

    #[test]
    fn test_identifier_from_config() {
        let conf = ConfigTree::from_pairs([("job.identifier", "table_metadata")]);
        let job = DefaultJob::from_config(&conf, CountingTask { fail: false }, NoopPublisher);
        assert_eq!(job.identifier(), "table_metadata");

        let job = DefaultJob::new("x", CountingTask { fail: false });
        assert_eq!(job.identifier(), "x");
    }
}
