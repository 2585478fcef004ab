mod reconcile;
mod relations;
mod workload;

use serde::de::Error as _;
use serde::Deserialize;
use serde_yaml::{self, Value as YamlValue};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub use reconcile::{JitterMode, ReconcileSettings, RetryPolicy, DEFAULT_APPLY_TIMEOUT};
pub use relations::{
    AggregationRule, DependencyDeclaration, FieldKind, FieldSpec, Multiplicity, PUBLISH_PLACEHOLDERS,
};
pub use workload::{normalise_advertised_url, WorkloadSettings, VALID_LOG_LEVELS};

/// Typed view of the declarations file: the workload, the loop tuning and the
/// relations the workload depends on, in declaration order.
#[derive(Debug, Clone)]
pub struct DeclarationsConfig {
    pub api_version: ApiVersion,
    pub workload: WorkloadSettings,
    pub reconcile: ReconcileSettings,
    pub relations: Vec<DependencyDeclaration>,
}

const TOP_LEVEL_FIELDS: &str = "api_version, workload, reconcile, relations";

impl DeclarationsConfig {
    pub fn from_reader(mut reader: impl Read) -> Result<Self, DeclarationConfigError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DeclarationConfigError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, DeclarationConfigError> {
        let mut documents = serde_yaml::Deserializer::from_str(contents);
        let mut parsed = None;
        let mut extra_errors = Vec::new();

        for (index, document) in documents.by_ref().enumerate() {
            if index == 0 {
                parsed = Some(RawDeclarationsFile::deserialize(document)?);
            } else {
                let _: YamlValue = YamlValue::deserialize(document)?;
                extra_errors
                    .push("error[root]: multiple YAML documents are not supported".to_string());
                break;
            }
        }

        let Some(raw) = parsed else {
            let err = serde_yaml::Error::custom(
                "declarations config must contain exactly one YAML document",
            );
            return Err(DeclarationConfigError::Parse(err));
        };

        Self::from_raw(raw, extra_errors).map_err(DeclarationConfigError::Invalid)
    }

    fn from_raw(
        raw: RawDeclarationsFile,
        mut errors: Vec<String>,
    ) -> Result<Self, DeclarationValidationError> {
        let RawDeclarationsFile {
            api_version: raw_api_version,
            workload: raw_workload,
            reconcile: raw_reconcile,
            relations: raw_relations,
            extra_fields,
        } = raw;

        for key in extra_fields.keys() {
            errors.push(format!(
                "error[root]: unknown top-level key \"{key}\" (expected one of {TOP_LEVEL_FIELDS})"
            ));
        }

        let api_version = parse_api_version(raw_api_version, &mut errors);
        let workload = workload::parse_workload(raw_workload, &mut errors);
        let reconcile = reconcile::parse_reconcile(raw_reconcile, &mut errors);
        let relations = relations::parse_relations(raw_relations, &mut errors);
        relations::validate_environment_names(&relations, &mut errors);
        relations::validate_artifact_paths(&relations, &mut errors);

        if errors.is_empty() {
            Ok(Self {
                api_version,
                workload,
                reconcile,
                relations,
            })
        } else {
            Err(DeclarationValidationError::new(
                errors,
                schema_version_label(&api_version),
            ))
        }
    }

    pub fn relation(&self, name: &str) -> Option<&DependencyDeclaration> {
        self.relations
            .iter()
            .find(|declaration| declaration.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    Unsupported(String),
}

fn parse_api_version(raw: Option<String>, errors: &mut Vec<String>) -> ApiVersion {
    match raw {
        None => {
            errors
                .push("error[root]: api_version is required (supported versions: v1)".to_string());
            ApiVersion::V1
        }
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                errors.push("error[root]: api_version must be a non-empty string".to_string());
                ApiVersion::V1
            } else if trimmed.eq_ignore_ascii_case("v1") {
                ApiVersion::V1
            } else {
                errors.push(format!(
                    "error[root]: api_version `{trimmed}` is not supported (supported versions: v1)"
                ));
                ApiVersion::Unsupported(trimmed.to_string())
            }
        }
    }
}

fn schema_version_label(version: &ApiVersion) -> String {
    match version {
        ApiVersion::V1 => "v1".to_string(),
        ApiVersion::Unsupported(other) => other.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct RawDeclarationsFile {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    workload: Option<workload::RawWorkloadSection>,
    #[serde(default)]
    reconcile: Option<reconcile::RawReconcileSection>,
    #[serde(default)]
    relations: Vec<relations::RawRelation>,
    #[serde(default)]
    #[serde(flatten)]
    extra_fields: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Error)]
pub enum DeclarationConfigError {
    #[error("failed to read declarations config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse declarations config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(DeclarationValidationError),
}

#[derive(Debug, Error)]
#[error("declarations config validation failed:\nschema_version: \"{schema_version}\"\n{rendered}")]
pub struct DeclarationValidationError {
    schema_version: String,
    messages: Vec<String>,
    rendered: String,
}

impl DeclarationValidationError {
    pub fn new(messages: Vec<String>, schema_version: impl Into<String>) -> Self {
        let rendered = messages
            .iter()
            .map(|msg| format!("- {msg}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            schema_version: schema_version.into(),
            messages,
            rendered,
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

pub(crate) fn parse_duration_value(
    field_label: &str,
    raw: Option<String>,
    errors: &mut Vec<String>,
) -> Option<std::time::Duration> {
    let raw_value = raw?;

    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        errors.push(format!(
            "error[{field_label}]: must be a non-empty duration string"
        ));
        return None;
    }

    match humantime::parse_duration(trimmed) {
        Ok(duration) if duration.is_zero() => {
            errors.push(format!("error[{field_label}]: must be greater than zero"));
            None
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            errors.push(format!(
                "error[{field_label}]: must be a valid duration (got `{trimmed}`)"
            ));
            None
        }
    }
}
