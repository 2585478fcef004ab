use crate::config::declarations::{DependencyDeclaration, FieldKind, FieldSpec};
use crate::domain::RelationData;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Relation data that does not satisfy its declaration's field schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_issues(.issues))]
pub struct SchemaError {
    pub relation: String,
    pub source_id: String,
    pub issues: Vec<FieldIssue>,
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks `data` against the declaration and returns it with declared fields
/// coerced to their canonical JSON type. Undeclared keys pass through.
pub fn validate(
    declaration: &DependencyDeclaration,
    source: &str,
    data: &RelationData,
) -> Result<RelationData, SchemaError> {
    let mut normalized = data.clone();
    let mut issues = Vec::new();

    for spec in &declaration.fields {
        let value = data.get(&spec.name).filter(|value| !is_absent(value));
        match value {
            None if spec.required => issues.push(FieldIssue {
                field: spec.name.clone(),
                reason: "missing required value".to_string(),
            }),
            None => {
                normalized.remove(&spec.name);
            }
            Some(value) => match coerce(spec, value) {
                Ok(coerced) => {
                    normalized.insert(spec.name.clone(), coerced);
                }
                Err(reason) => issues.push(FieldIssue {
                    field: spec.name.clone(),
                    reason,
                }),
            },
        }
    }

    if issues.is_empty() {
        Ok(normalized)
    } else {
        Err(SchemaError {
            relation: declaration.name.clone(),
            source_id: source.to_string(),
            issues,
        })
    }
}

fn is_absent(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn coerce(spec: &FieldSpec, value: &JsonValue) -> Result<JsonValue, String> {
    match spec.kind {
        FieldKind::String => match value {
            JsonValue::String(_) => Ok(value.clone()),
            JsonValue::Number(_) | JsonValue::Bool(_) => Ok(JsonValue::String(value.to_string())),
            _ => Err(expected(spec.kind, value)),
        },
        FieldKind::Integer => match value {
            JsonValue::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
            JsonValue::String(text) => text
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| expected(spec.kind, value)),
            _ => Err(expected(spec.kind, value)),
        },
        FieldKind::Boolean => match value {
            JsonValue::Bool(_) => Ok(value.clone()),
            JsonValue::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(JsonValue::Bool(true)),
                "false" => Ok(JsonValue::Bool(false)),
                _ => Err(expected(spec.kind, value)),
            },
            _ => Err(expected(spec.kind, value)),
        },
        FieldKind::Url => {
            let JsonValue::String(text) = value else {
                return Err(expected(spec.kind, value));
            };
            Url::parse(text.trim())
                .map(|_| JsonValue::String(text.trim().to_string()))
                .map_err(|err| format!("invalid URL `{text}`: {err}"))
        }
        FieldKind::Base64 => {
            let JsonValue::String(text) = value else {
                return Err(expected(spec.kind, value));
            };
            STANDARD
                .decode(text.trim())
                .map(|_| JsonValue::String(text.trim().to_string()))
                .map_err(|err| format!("failed to decode base64 value: {err}"))
        }
        FieldKind::Json => match value {
            JsonValue::String(text) => serde_json::from_str::<JsonValue>(text)
                .map_err(|err| format!("invalid JSON document: {err}")),
            other => Ok(other.clone()),
        },
    }
}

fn expected(kind: FieldKind, value: &JsonValue) -> String {
    format!("expected {}, got {}", kind.as_str(), describe(value))
}

fn describe(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relation_data;
    use serde_json::json;

    fn gitlab() -> DependencyDeclaration {
        DependencyDeclaration::new("gitlab", true)
            .with_field(FieldSpec::required("host", FieldKind::String))
            .with_field(FieldSpec::required("port", FieldKind::Integer))
            .with_field(FieldSpec::required("gitlab_host_cert_b64", FieldKind::Base64))
            .with_field(FieldSpec::optional("secure", FieldKind::Boolean))
    }

    #[test]
    fn coerces_string_encoded_scalars() {
        let data = relation_data([
            ("host", json!("gitlab.example.com")),
            ("port", json!("443")),
            ("gitlab_host_cert_b64", json!("Y2VydA==")),
            ("secure", json!("TRUE")),
        ]);
        let normalized = validate(&gitlab(), "gitlab/0", &data).expect("valid data");
        assert_eq!(normalized["port"], json!(443));
        assert_eq!(normalized["secure"], json!(true));
    }

    #[test]
    fn collects_every_field_issue() {
        let data = relation_data([
            ("port", json!("https")),
            ("gitlab_host_cert_b64", json!("not base64!")),
        ]);
        let err = validate(&gitlab(), "gitlab/0", &data).unwrap_err();
        let fields: Vec<_> = err.issues.iter().map(|issue| issue.field.as_str()).collect();
        assert_eq!(fields, vec!["host", "port", "gitlab_host_cert_b64"]);
        assert!(err.to_string().starts_with("host: missing required value"));
    }
}
