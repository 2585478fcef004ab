//! Seams between the reconciliation loop and the outside world.
//!
//! The loop only ever talks to the workload, the status surface and remote
//! relation parties through these traits, so tests can drive it with in-memory
//! doubles.

pub mod file;
pub mod log;

use crate::readiness::WorkloadStatus;
use crate::synthesis::RuntimeConfiguration;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use file::FileWorkload;
pub use log::{LogRelationDataSink, LogStatusPublisher};

/// Transient failure talking to the workload. Always retried.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("workload {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("workload rejected request: {0}")]
    Workload(String),
    #[error("workload I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait WorkloadControl: Send + Sync {
    /// Pushes the configuration to the workload. Must be idempotent.
    async fn apply(&self, config: &RuntimeConfiguration) -> Result<(), ApplyError>;

    async fn restart(&self) -> Result<(), ApplyError>;

    /// Image the workload reports running, if it is running at all.
    async fn current_image_ref(&self) -> Result<Option<String>, ApplyError>;
}

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, status: &WorkloadStatus);
}

#[async_trait]
pub trait RelationDataSink: Send + Sync {
    /// Writes this unit's data onto `relation` for the remote `source`.
    async fn publish_local(
        &self,
        relation: &str,
        source: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ApplyError>;
}
