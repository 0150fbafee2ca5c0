//! Lenient field deserializers
//!
//! Records coming from CSV files carry every cell as a string, while records
//! from REST APIs or config carry real JSON types. These helpers accept both.

use serde::de::Error;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrString {
    List(Vec<String>),
    String(String),
}

/// Integer from a JSON number or a numeric string (blank is an error)
pub fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.trim().is_empty() => {
            Err(D::Error::custom("expected an integer, got a blank value"))
        }
        NumberOrString::String(s) => parse_i64(&s),
    }
}

/// Like [`lenient_i64`], but a blank string is 0
pub fn lenient_i64_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.trim().is_empty() => Ok(0),
        NumberOrString::String(s) => parse_i64(&s),
    }
}

fn parse_i64<E: Error>(s: &str) -> Result<i64, E> {
    s.trim()
        .parse()
        .map_err(|e| E::custom(format!("invalid integer '{}': {}", s, e)))
}

/// Boolean from a JSON bool or "true"/"false" strings (empty is false)
pub fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Ok(true),
            "false" | "f" | "no" | "0" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}

/// String list from a JSON array or a comma-separated string
pub fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = match Option::<ListOrString>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListOrString::List(items)) => items,
        Some(ListOrString::String(s)) => s.split(',').map(String::from).collect(),
    };
    Ok(values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Optional string where blank values count as absent
pub fn blank_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}
