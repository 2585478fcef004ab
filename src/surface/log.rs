use super::{ApplyError, RelationDataSink, StatusPublisher};
use crate::readiness::WorkloadStatus;
use crate::relation_event;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusPublisher;

#[async_trait]
impl StatusPublisher for LogStatusPublisher {
    async fn publish(&self, status: &WorkloadStatus) {
        tracing::info!(
            state = status.state.as_str(),
            status_message = status.message.as_str(),
            "workload status published"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelationDataSink;

#[async_trait]
impl RelationDataSink for LogRelationDataSink {
    async fn publish_local(
        &self,
        relation: &str,
        source: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ApplyError> {
        for (key, value) in data {
            relation_event!(
                info,
                "workload_operator::surface",
                "relation_data_published",
                relation = relation,
                source = source,
                key = key,
                value = value
            );
        }
        Ok(())
    }
}
