pub mod configuration;
pub mod synthesizer;

use thiserror::Error;

pub use configuration::{Artifact, RuntimeConfiguration, WorkloadSection};
pub use synthesizer::synthesize;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("required relation `{relation}` has no valid data")]
    MissingRequired { relation: String },
    #[error("failed to decode `{field}` of relation `{relation}` into `{path}`: {reason}")]
    Artifact {
        relation: String,
        field: String,
        path: String,
        reason: String,
    },
    #[error("failed to encode runtime configuration: {0}")]
    Encode(#[source] serde_json::Error),
}
