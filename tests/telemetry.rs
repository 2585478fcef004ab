#[path = "common/mod.rs"]
mod common;
#[path = "support/mod.rs"]
mod support;

use serde_json::json;
use std::sync::{Arc, Mutex};
use support::Harness;
use tracing::subscriber::with_default;
use tracing_subscriber::fmt::MakeWriter;
use workload_operator::dependency::DependencyRegistry;
use workload_operator::domain::relation_data;
use workload_operator::metrics::metrics;
use workload_operator::reconcile::ReconcileEvent;

struct BufferWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for BufferWriter {
    type Writer = BufferGuard;

    fn make_writer(&'a self) -> Self::Writer {
        BufferGuard {
            buffer: self.buffer.clone(),
        }
    }
}

struct BufferGuard {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for BufferGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.buffer.lock().expect("log buffer lock");
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn subscriber(
    buffer: Arc<Mutex<Vec<u8>>>,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_writer(BufferWriter { buffer })
        .with_ansi(false)
        .without_time()
        .with_target(true)
        .with_max_level(tracing::Level::DEBUG)
        .finish()
}

fn rendered(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    let contents = buffer.lock().expect("log buffer lock");
    String::from_utf8(contents.clone()).expect("utf8 logs")
}

fn capture_logs<F>(action: F) -> String
where
    F: FnOnce(),
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    with_default(subscriber(buffer.clone()), action);
    rendered(&buffer)
}

mod tests {
    use super::*;

    #[test]
    fn rejected_relation_data_is_logged_and_counted() {
        let config = common::load_declarations();
        let mut registry = DependencyRegistry::new(config.relations.clone());

        let output = capture_logs(|| {
            let _ = registry.upsert(
                "gitlab",
                "gitlab/7",
                relation_data([("client_id", json!("engine")), ("port", json!("https"))]),
            );
        });

        assert!(
            output.contains("event=\"relation_data_rejected\""),
            "logs: {output}"
        );
        assert!(output.contains("relation=\"gitlab\""), "logs: {output}");
        assert!(output.contains("source=\"gitlab/7\""), "logs: {output}");
        assert!(output.contains("client_secret: missing required value"), "logs: {output}");

        let rejections = metrics().snapshot().schema_rejections;
        assert!(rejections
            .iter()
            .any(|entry| entry.relation == "gitlab" && entry.total >= 1));
    }

    #[test]
    fn registry_events_carry_the_revision() {
        let config = common::load_declarations();
        let mut registry = DependencyRegistry::new(config.relations.clone());

        let output = capture_logs(|| {
            registry
                .upsert("database", "mongodb/0", common::database_data())
                .expect("valid database");
            registry
                .upsert("gitlab", "gitlab/0", common::gitlab_data())
                .expect("valid gitlab");
            registry.remove_all("gitlab").expect("declared relation");
        });

        assert!(
            output.contains(
                "event=\"relation_data_recorded\" relation=\"database\" source=\"mongodb/0\" revision=1"
            ),
            "logs: {output}"
        );
        assert!(
            output.contains("event=\"relation_cleared\" relation=\"gitlab\" revision=3 removed=1"),
            "logs: {output}"
        );
    }

    #[tokio::test]
    async fn state_transitions_name_both_states() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let _guard = tracing::subscriber::set_default(subscriber(buffer.clone()));

        let harness = Harness::new();
        let mut reconciler = harness.reconciler(&common::load_declarations());
        reconciler.reconcile().await.expect("blocked pass");
        for (relation, source, data) in [
            ("database", "mongodb/0", common::database_data()),
            ("gitlab", "gitlab/0", common::gitlab_data()),
        ] {
            reconciler
                .absorb(ReconcileEvent::RelationChanged {
                    relation: relation.to_string(),
                    source: source.to_string(),
                    data,
                })
                .await;
        }
        reconciler.reconcile().await.expect("active pass");

        let output = rendered(&buffer);
        assert!(
            output.contains("state_from=\"unknown\" state_to=\"blocked\""),
            "logs: {output}"
        );
        assert!(
            output.contains("state_from=\"blocked\" state_to=\"active\""),
            "logs: {output}"
        );
        assert!(
            output.contains("workload configuration applied"),
            "logs: {output}"
        );
    }
}
