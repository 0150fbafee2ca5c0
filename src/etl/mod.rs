//! Core ETL (Extract, Transform, Load) abstractions
//!
//! This module provides the trait definitions for a databuilder job:
//! extractors pull records, transformers reshape them, loaders stage them,
//! and publishers push the staged result into a store. A [`DefaultTask`]
//! drives the first three stages and a [`DefaultJob`] runs the task followed
//! by its publisher.

mod extract;
mod job;
mod load;
mod publish;
mod task;
mod transform;

pub use extract::{Extractor, GenericExtractor};
pub use job::{DefaultJob, JobReport};
pub use load::{GenericLoader, Loader};
pub use publish::{Callback, Callbacks, NoopPublisher, Publisher};
pub use task::{DEFAULT_PROGRESS_REPORT_FREQUENCY, DefaultTask, Task, TaskReport};
pub use transform::{ChainedTransformer, NoopTransformer, Then, Transformer};
