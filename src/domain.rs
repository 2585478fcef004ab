#![forbid(unsafe_code)]

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Key/value payload a remote party publishes on a relation.
pub type RelationData = BTreeMap<String, JsonValue>;

/// Key added to every aggregated `list` entry naming the remote source.
pub const SOURCE_KEY: &str = "source";

/// String form used for environment projection and joined sections.
///
/// Strings are taken verbatim, `null` renders empty, anything else is compact JSON.
pub fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn relation_data<I, K, V>(pairs: I) -> RelationData
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<JsonValue>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
