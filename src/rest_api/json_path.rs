//! Minimal JSON path evaluation for REST API responses
//!
//! Supported segments, separated by `.`:
//! - `name` selects a field of an object
//! - `[*]` selects every element of an array (or every value of an object)
//! - `[n]` selects one array element
//! - `[a,b,c]` selects several fields of an object, in the listed order;
//!   a missing field yields `null` so each object contributes one value per name
//!
//! Brackets may follow a name directly: `spaces[*].[token,name]`.

use eyre::Result;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^\[\]]*)(?P<brackets>(?:\[[^\[\]]*\])*)$")
        .expect("segment pattern is valid")
});
static NULL: Value = Value::Null;
static BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("bracket pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Field(String),
    Wildcard,
    Index(usize),
    Fields(Vec<String>),
}

/// A compiled JSON path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    steps: Vec<Step>,
}

impl JsonPath {
    /// Compile a path expression
    ///
    /// # Errors
    /// Returns an error for unbalanced brackets or empty selectors
    pub fn parse(path: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for segment in path.trim().split('.').map(str::trim) {
            if segment.is_empty() || segment == "$" {
                continue;
            }
            let Some(caps) = SEGMENT.captures(segment) else {
                eyre::bail!("Invalid JSON path segment '{}' in '{}'", segment, path);
            };

            let name = caps.name("name").map(|m| m.as_str()).unwrap_or("");
            match name {
                "" | "$" => {}
                "*" => steps.push(Step::Wildcard),
                name => steps.push(Step::Field(name.to_string())),
            }

            let brackets = caps.name("brackets").map(|m| m.as_str()).unwrap_or("");
            for bracket in BRACKET.captures_iter(brackets) {
                steps.push(parse_bracket(&bracket[1], path)?);
            }
        }

        Ok(Self {
            raw: path.to_string(),
            steps,
        })
    }

    /// Evaluate against a document, returning every match in document order
    pub fn find(&self, document: &Value) -> Vec<Value> {
        let mut current = vec![document];
        for step in &self.steps {
            let mut next = Vec::new();
            for value in current {
                match step {
                    Step::Field(name) => next.extend(value.get(name)),
                    Step::Wildcard => match value {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => {}
                    },
                    Step::Index(index) => next.extend(value.get(*index)),
                    Step::Fields(names) => {
                        if let Value::Object(map) = value {
                            next.extend(names.iter().map(|name| map.get(name).unwrap_or(&NULL)))
                        }
                    }
                }
            }
            current = next;
        }
        current.into_iter().cloned().collect()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_bracket(content: &str, path: &str) -> Result<Step> {
    let content = content.trim();
    if content == "*" {
        return Ok(Step::Wildcard);
    }
    if let Ok(index) = content.parse::<usize>() {
        return Ok(Step::Index(index));
    }
    let names: Vec<String> = content
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .collect();
    if names.iter().any(|n| n.is_empty()) {
        eyre::bail!("Empty field selector '[{}]' in JSON path '{}'", content, path);
    }
    Ok(match names.len() {
        1 => Step::Field(names.into_iter().next().unwrap_or_default()),
        _ => Step::Fields(names),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "spaces": [
                {"token": "a1", "name": "Alpha", "meta": {"id": 1}},
                {"token": "b2", "name": "Beta", "meta": {"id": 2}}
            ],
            "total": 2
        })
    }

    #[test]
    fn test_field_and_wildcard() {
        let path = JsonPath::parse("spaces[*].token").unwrap();
        assert_eq!(path.find(&doc()), vec![json!("a1"), json!("b2")]);

        let path = JsonPath::parse("spaces[*].meta.id").unwrap();
        assert_eq!(path.find(&doc()), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_multi_field_flattens_per_element() {
        let path = JsonPath::parse("spaces[*].[token,name]").unwrap();
        assert_eq!(
            path.find(&doc()),
            vec![json!("a1"), json!("Alpha"), json!("b2"), json!("Beta")]
        );
    }

    #[test]
    fn test_multi_field_keeps_width_when_fields_missing() {
        let doc = json!({"spaces": [{"id": 1}, {"name": "sales"}]});
        let path = JsonPath::parse("spaces[*].[id,name]").unwrap();
        assert_eq!(
            path.find(&doc),
            vec![json!(1), Value::Null, Value::Null, json!("sales")]
        );

        let scalars = json!({"spaces": [1, 2]});
        assert!(path.find(&scalars).is_empty());
    }

    #[test]
    fn test_index_and_root() {
        assert_eq!(
            JsonPath::parse("spaces[1].name").unwrap().find(&doc()),
            vec![json!("Beta")]
        );
        assert_eq!(
            JsonPath::parse("$.total").unwrap().find(&doc()),
            vec![json!(2)]
        );
        assert_eq!(
            JsonPath::parse("[*].id").unwrap().find(&json!([{"id": 7}, {"id": 8}])),
            vec![json!(7), json!(8)]
        );
    }

    #[test]
    fn test_missing_fields_yield_nothing() {
        assert!(JsonPath::parse("spaces[*].owner").unwrap().find(&doc()).is_empty());
        assert!(JsonPath::parse("nothing[*]").unwrap().find(&doc()).is_empty());
        assert!(JsonPath::parse("spaces[9]").unwrap().find(&doc()).is_empty());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(JsonPath::parse("spaces[*").is_err());
        assert!(JsonPath::parse("spaces[a,,b]").is_err());
    }
}
