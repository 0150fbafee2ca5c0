//! `{field}` template rendering

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Transformer;
use eyre::{Result, eyre};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Fill `{field}` placeholders from a record
///
/// Strings are inserted raw, other scalars in their JSON form.
///
/// # Errors
/// Returns an error naming the first placeholder with no value in `record`
pub fn render_template(template: &str, record: &Map<String, Value>) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = match record.get(name.as_str()) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(eyre!(
                    "Template '{}' references '{}', which the record does not have",
                    template,
                    name.as_str()
                ));
            }
            Some(other) => other.to_string(),
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Sets `field_name` to `template` rendered with the record's own fields
///
/// # Example
/// ```
/// use databuilder::transform::TemplateVariableSubstitutionTransformer;
/// use databuilder::etl::Transformer;
/// use serde_json::json;
///
/// let transformer = TemplateVariableSubstitutionTransformer::new(
///     "description",
///     "Table {table_name} owned by {team}",
/// );
/// let output = transformer
///     .transform(json!({"table_name": "orders", "team": "growth"}))
///     .unwrap();
/// assert_eq!(output[0]["description"], "Table orders owned by growth");
/// ```
pub struct TemplateVariableSubstitutionTransformer {
    field_name: String,
    template: String,
}

impl TemplateVariableSubstitutionTransformer {
    pub fn new(field_name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            template: template.into(),
        }
    }
}

impl Scoped for TemplateVariableSubstitutionTransformer {
    const SCOPE: &'static str = "transformer.template_variable_substitution";
}

impl FromConfig for TemplateVariableSubstitutionTransformer {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Ok(Self::new(conf.get_str("field_name")?, conf.get_str("template")?))
    }
}

impl Transformer for TemplateVariableSubstitutionTransformer {
    type Input = Value;
    type Output = Value;

    fn transform(&self, mut input: Self::Input) -> Result<Vec<Self::Output>> {
        let Some(record) = input.as_object_mut() else {
            eyre::bail!("Template substitution needs an object record, got: {}", input);
        };
        let rendered = render_template(&self.template, record)?;
        record.insert(self.field_name.clone(), Value::String(rendered));
        Ok(vec![input])
    }
}
