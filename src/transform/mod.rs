//! Record transformers
//!
//! Dict transformers work on `serde_json::Value` records and can be chained
//! with [`ChainedTransformer`](crate::etl::ChainedTransformer).
//! [`DictToModel`] ends a chain by turning dicts into graph models.

mod dict_to_model;
mod regex_str_replace;
mod remove_field;
mod template_variable;

pub use dict_to_model::DictToModel;
pub use regex_str_replace::RegexStrReplaceTransformer;
pub use remove_field::RemoveFieldTransformer;
pub use template_variable::{TemplateVariableSubstitutionTransformer, render_template};
