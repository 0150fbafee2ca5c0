//! Extractor trait for pulling records from a source

use crate::config::{ConfigTree, FromConfig, Scoped};
use eyre::Result;
use serde_json::Value;
use std::collections::VecDeque;

/// Extractor trait for pulling records from a source one at a time
///
/// Implementors define how to read records from sources like:
/// - CSV files
/// - REST APIs
/// - Neo4j queries
///
/// `extract` returns `Ok(None)` once the source is exhausted. Callers should
/// stop pulling at that point.
///
/// # Example
/// ```no_run
/// use databuilder::etl::Extractor;
/// use eyre::Result;
///
/// struct Countdown(u32);
///
/// impl Extractor for Countdown {
///     type Item = u32;
///
///     async fn extract(&mut self) -> Result<Option<Self::Item>> {
///         if self.0 == 0 {
///             return Ok(None);
///         }
///         self.0 -= 1;
///         Ok(Some(self.0))
///     }
/// }
/// ```
pub trait Extractor: Send {
    /// The type of records extracted
    type Item: Send;

    /// Pull the next record from the source
    ///
    /// # Errors
    /// Returns an error if extraction fails (network, I/O, parsing, etc.)
    fn extract(&mut self) -> impl std::future::Future<Output = Result<Option<Self::Item>>> + Send;

    /// Release any resources held by the extractor
    fn close(&mut self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Extractor that yields a fixed list of records
///
/// Useful for seeding a job from configuration or for tests.
pub struct GenericExtractor<T> {
    values: VecDeque<T>,
}

impl<T> GenericExtractor<T> {
    pub fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Records not yet extracted
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl Scoped for GenericExtractor<Value> {
    const SCOPE: &'static str = "extractor.generic";
}

impl FromConfig for GenericExtractor<Value> {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Ok(Self::new(conf.get_list("values")))
    }
}

impl<T: Send> Extractor for GenericExtractor<T> {
    type Item = T;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.values.pop_front())
    }
}
