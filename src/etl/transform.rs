//! Transformer trait for record transformation

use eyre::Result;

/// Transformer trait for mapping one record to zero, one or many records
///
/// Implementors define how to reshape records:
/// - Field cleanup (removing or rewriting fields)
/// - Enrichment (templated fields)
/// - Model conversion (dicts into graph-serializable models)
///
/// Returning an empty vector filters the record out of the pipeline.
///
/// # Example
/// ```
/// use databuilder::etl::Transformer;
/// use eyre::Result;
///
/// struct SkipEmpty;
///
/// impl Transformer for SkipEmpty {
///     type Input = String;
///     type Output = String;
///
///     fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>> {
///         if input.is_empty() {
///             return Ok(vec![]);
///         }
///         Ok(vec![input])
///     }
/// }
///
/// let out = SkipEmpty.transform_many(vec!["a".into(), "".into()]).unwrap();
/// assert_eq!(out, vec!["a".to_string()]);
/// ```
pub trait Transformer: Send + Sync {
    /// Input record type
    type Input: Send;

    /// Output record type after transformation
    type Output: Send;

    /// Transform a single record
    ///
    /// # Errors
    /// Returns an error if transformation fails (validation, conversion, etc.)
    fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>>;

    /// Transform multiple records, flattening the results
    fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.extend(self.transform(input)?);
        }
        Ok(outputs)
    }

    /// Feed every output of this transformer into `next`
    fn then<B>(self, next: B) -> Then<Self, B>
    where
        Self: Sized,
        B: Transformer<Input = Self::Output>,
    {
        Then { first: self, next }
    }
}

/// Transformer that passes records through unchanged
///
/// The generic parameter T must be specified when creating the transformer.
pub struct NoopTransformer<T> {
    _phantom: std::marker::PhantomData<fn(T) -> T>,
}

impl<T> Default for NoopTransformer<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> NoopTransformer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Send> Transformer for NoopTransformer<T> {
    type Input = T;
    type Output = T;

    fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>> {
        Ok(vec![input])
    }
}

/// Two transformers composed in sequence
pub struct Then<A, B> {
    first: A,
    next: B,
}

impl<A, B> Transformer for Then<A, B>
where
    A: Transformer,
    B: Transformer<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>> {
        let intermediate = self.first.transform(input)?;
        self.next.transform_many(intermediate)
    }
}

/// Ordered list of same-typed transformers
///
/// Each output of one stage is fed to the next stage, so a record fanned out
/// early is transformed once per copy downstream.
pub struct ChainedTransformer<T> {
    transformers: Vec<Box<dyn Transformer<Input = T, Output = T>>>,
}

impl<T: Send> ChainedTransformer<T> {
    pub fn new(transformers: Vec<Box<dyn Transformer<Input = T, Output = T>>>) -> Self {
        Self { transformers }
    }

    /// Append a stage to the end of the chain
    pub fn push(&mut self, transformer: impl Transformer<Input = T, Output = T> + 'static) {
        self.transformers.push(Box::new(transformer));
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl<T: Send> Default for ChainedTransformer<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Send> Transformer for ChainedTransformer<T> {
    type Input = T;
    type Output = T;

    fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>> {
        let mut records = vec![input];
        for transformer in &self.transformers {
            if records.is_empty() {
                break;
            }
            records = transformer.transform_many(records)?;
        }
        Ok(records)
    }
}
