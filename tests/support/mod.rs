#![allow(dead_code)]

pub mod mocks;

use mocks::{MockPublisher, MockRelationSink, MockWorkload};
use std::sync::Arc;
use workload_operator::config::DeclarationsConfig;
use workload_operator::reconcile::Reconciler;

pub const APP_NAME: &str = "legend-engine";

/// Mock surfaces shared between a test and the reconciler it drives.
#[derive(Clone, Default)]
pub struct Harness {
    pub workload: MockWorkload,
    pub publisher: MockPublisher,
    pub sink: MockRelationSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconciler(&self, config: &DeclarationsConfig) -> Reconciler {
        Reconciler::new(
            config,
            APP_NAME,
            Arc::new(self.workload.clone()),
            Arc::new(self.publisher.clone()),
            Arc::new(self.sink.clone()),
        )
    }
}
