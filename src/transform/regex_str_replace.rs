//! Regex replacement on a single string field

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Transformer;
use eyre::{Context, Result};
use regex::Regex;
use serde_json::Value;

/// Applies `(pattern, replacement)` pairs, in order, to one string field
///
/// Replacements may reference capture groups (`$1`, `${name}`). Records
/// where the field is missing or not a string pass through untouched.
pub struct RegexStrReplaceTransformer {
    attribute_name: String,
    replacements: Vec<(Regex, String)>,
}

impl RegexStrReplaceTransformer {
    /// # Errors
    /// Returns an error if any pattern fails to compile
    pub fn new<I, P, R>(attribute_name: impl Into<String>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let replacements = pairs
            .into_iter()
            .map(|(pattern, replacement)| {
                let pattern = pattern.as_ref();
                Regex::new(pattern)
                    .with_context(|| format!("Invalid regex '{}'", pattern))
                    .map(|regex| (regex, replacement.into()))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            attribute_name: attribute_name.into(),
            replacements,
        })
    }
}

impl Scoped for RegexStrReplaceTransformer {
    const SCOPE: &'static str = "transformer.regex_str_replace";
}

impl FromConfig for RegexStrReplaceTransformer {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let attribute_name = conf.get_str("attribute_name")?;
        let pairs: Vec<(String, String)> = conf
            .get_list("regex_replace_tuple_list")
            .into_iter()
            .map(|pair| {
                serde_json::from_value(pair.clone()).with_context(|| {
                    format!(
                        "regex_replace_tuple_list entries must be [pattern, replacement], got: {}",
                        pair
                    )
                })
            })
            .collect::<Result<_>>()?;
        Self::new(attribute_name, pairs)
    }
}

impl Transformer for RegexStrReplaceTransformer {
    type Input = Value;
    type Output = Value;

    fn transform(&self, mut input: Self::Input) -> Result<Vec<Self::Output>> {
        if let Some(Value::String(text)) = input.get_mut(&self.attribute_name) {
            for (regex, replacement) in &self.replacements {
                let replaced = regex.replace_all(text, replacement.as_str()).into_owned();
                *text = replaced;
            }
        }
        Ok(vec![input])
    }
}
