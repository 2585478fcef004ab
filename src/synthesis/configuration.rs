use super::SynthesisError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Workload settings as rendered into the runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSection {
    pub image: String,
    pub deployment_mode: String,
    pub log_levels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertised_url: Option<String>,
}

/// Decoded relation value the workload receives as a file.
///
/// Only the digest and size are serialised, so the content hash still covers
/// the bytes without embedding them in the rendered JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub relation: String,
    pub field: String,
    pub sha256: String,
    pub size: usize,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(relation: impl Into<String>, field: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            relation: relation.into(),
            field: field.into(),
            sha256: hex::encode(Sha256::digest(&contents)),
            size: contents.len(),
            contents,
        }
    }
}

/// Concrete configuration handed to the workload.
///
/// Every map is ordered, so serialisation is canonical and the content hash
/// depends only on the values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeConfiguration {
    pub workload: WorkloadSection,
    pub environment: BTreeMap<String, String>,
    pub sections: BTreeMap<String, JsonValue>,
    /// Files to write next to the configuration, keyed by relative path.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, Artifact>,
}

impl RuntimeConfiguration {
    pub fn image(&self) -> &str {
        &self.workload.image
    }

    pub fn section(&self, name: &str) -> Option<&JsonValue> {
        self.sections.get(name)
    }

    pub fn artifact(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.get(path)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SynthesisError> {
        serde_json::to_vec(self).map_err(SynthesisError::Encode)
    }

    pub fn to_pretty_json(&self) -> Result<String, SynthesisError> {
        serde_json::to_string_pretty(self).map_err(SynthesisError::Encode)
    }

    /// Hex-encoded SHA-256 of the canonical JSON form.
    pub fn content_hash(&self) -> Result<String, SynthesisError> {
        let bytes = self.to_json_bytes()?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
