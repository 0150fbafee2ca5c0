//! Remove field transformer
//!
//! Drops fields from dict records before they reach a model or loader.

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Transformer;
use eyre::Result;
use serde_json::Value;

/// Transformer that removes the configured fields from objects
///
/// # Example
/// ```
/// use databuilder::transform::RemoveFieldTransformer;
/// use databuilder::etl::Transformer;
/// use serde_json::json;
///
/// let remover = RemoveFieldTransformer::new(["raw_ddl", "owner_id"]);
/// let input = json!({
///     "table_name": "orders",
///     "raw_ddl": "CREATE TABLE orders (...)",
///     "owner_id": 42
/// });
///
/// let output = remover.transform(input).unwrap();
/// assert_eq!(output, vec![json!({"table_name": "orders"})]);
/// ```
pub struct RemoveFieldTransformer {
    fields: Vec<String>,
}

impl RemoveFieldTransformer {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl Scoped for RemoveFieldTransformer {
    const SCOPE: &'static str = "transformer.remove_field";
}

impl FromConfig for RemoveFieldTransformer {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let fields = conf.get_str_list("field_names")?;
        if fields.is_empty() {
            log::warn!("remove_field transformer configured without field_names");
        }
        Ok(Self::new(fields))
    }
}

impl Transformer for RemoveFieldTransformer {
    type Input = Value;
    type Output = Value;

    fn transform(&self, mut input: Self::Input) -> Result<Vec<Self::Output>> {
        if let Some(obj) = input.as_object_mut() {
            for field in &self.fields {
                obj.remove(field);
            }
        }
        Ok(vec![input])
    }
}
