//! Dict record → graph model conversion

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Transformer;
use crate::models::{GraphRecord, ModelClass};
use eyre::Result;
use serde_json::Value;

/// Deserializes each dict record into the configured model
pub struct DictToModel {
    model_class: ModelClass,
}

impl DictToModel {
    pub fn new(model_class: ModelClass) -> Self {
        Self { model_class }
    }

    pub fn model_class(&self) -> ModelClass {
        self.model_class
    }
}

impl Scoped for DictToModel {
    const SCOPE: &'static str = "transformer.dict_to_model";
}

impl FromConfig for DictToModel {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Ok(Self::new(conf.get_str("model_class")?.parse()?))
    }
}

impl Transformer for DictToModel {
    type Input = Value;
    type Output = GraphRecord;

    fn transform(&self, input: Self::Input) -> Result<Vec<Self::Output>> {
        Ok(vec![self.model_class.from_record(input)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converts_records() {
        let conf = ConfigTree::from_pairs([("model_class", "table_owner")]);
        let transformer = DictToModel::from_config(&conf).unwrap();
        assert_eq!(transformer.model_class(), ModelClass::TableOwner);

        let models = transformer
            .transform(json!({
                "db_name": "hive",
                "cluster": "gold",
                "schema": "core",
                "table_name": "orders",
                "owners": "a@x.com,b@x.com"
            }))
            .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].nodes().len(), 2);
        assert_eq!(models[0].relationships().len(), 2);
    }

    #[test]
    fn test_unknown_model_class() {
        let conf = ConfigTree::from_pairs([("model_class", "dashboard_usage")]);
        assert!(DictToModel::from_config(&conf).is_err());
        assert!(DictToModel::from_config(&ConfigTree::new()).is_err());
    }
}
