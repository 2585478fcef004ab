use super::event::ReconcileEvent;
use crate::config::declarations::{
    DeclarationsConfig, DependencyDeclaration, ReconcileSettings, WorkloadSettings,
};
use crate::dependency::{DependencyRegistry, RegistryError};
use crate::error::{Error, Result};
use crate::metrics::metrics;
use crate::readiness::{evaluate, InFlight, WorkloadObservation, WorkloadStatus};
use crate::relation_event;
use crate::retry::backoff_delay;
use crate::surface::{ApplyError, RelationDataSink, StatusPublisher, WorkloadControl};
use crate::synthesis::{synthesize, RuntimeConfiguration};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TARGET: &str = "workload_operator::reconcile";

/// Configuration the workload last accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedConfiguration {
    pub hash: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub status: WorkloadStatus,
    /// Whether this pass pushed a new configuration to the workload.
    pub applied: bool,
    /// Whether the status differed from the last one published.
    pub published: bool,
    /// Set when a transient failure asks for another pass.
    pub retry_after: Option<Duration>,
}

/// Owns the registry and workload settings and performs reconcile passes.
///
/// State is mutated only by [`Reconciler::absorb`] and at the end of
/// [`Reconciler::reconcile`], never while a workload call is outstanding.
pub struct Reconciler {
    declarations: Arc<[DependencyDeclaration]>,
    registry: DependencyRegistry,
    settings: WorkloadSettings,
    tuning: ReconcileSettings,
    app_name: String,
    workload: Arc<dyn WorkloadControl>,
    publisher: Arc<dyn StatusPublisher>,
    relation_sink: Arc<dyn RelationDataSink>,
    applied: Option<AppliedConfiguration>,
    last_published: Option<WorkloadStatus>,
    consecutive_failures: u32,
    passes: u64,
}

impl Reconciler {
    pub fn new(
        config: &DeclarationsConfig,
        app_name: impl Into<String>,
        workload: Arc<dyn WorkloadControl>,
        publisher: Arc<dyn StatusPublisher>,
        relation_sink: Arc<dyn RelationDataSink>,
    ) -> Self {
        Self {
            declarations: config.relations.clone().into(),
            registry: DependencyRegistry::new(config.relations.clone()),
            settings: config.workload.clone(),
            tuning: config.reconcile.clone(),
            app_name: app_name.into(),
            workload,
            publisher,
            relation_sink,
            applied: None,
            last_published: None,
            consecutive_failures: 0,
            passes: 0,
        }
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &WorkloadSettings {
        &self.settings
    }

    pub fn applied(&self) -> Option<&AppliedConfiguration> {
        self.applied.as_ref()
    }

    pub fn last_status(&self) -> Option<&WorkloadStatus> {
        self.last_published.as_ref()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn recheck_interval(&self) -> Option<Duration> {
        self.tuning.recheck_interval
    }

    /// Folds an event into the registry or settings and reports whether a
    /// reconcile pass is needed.
    pub async fn absorb(&mut self, event: ReconcileEvent) -> bool {
        let revision = self.registry.revision();
        tracing::debug!(event = event.kind(), "absorbing event");

        match event {
            ReconcileEvent::RelationJoined { relation, source } => {
                self.publish_relation_data(&relation, &source).await;
                false
            }
            ReconcileEvent::RelationChanged {
                relation,
                source,
                data,
            } => {
                match self.registry.upsert(&relation, &source, data) {
                    Ok(_) | Err(RegistryError::Schema(_)) => {}
                    Err(err) => log_registry_error(&relation, &source, &err),
                }
                self.registry.revision() != revision
            }
            ReconcileEvent::RelationDeparted { relation, source } => {
                if let Err(err) = self.registry.remove(&relation, &source) {
                    log_registry_error(&relation, &source, &err);
                }
                self.registry.revision() != revision
            }
            ReconcileEvent::RelationBroken { relation } => {
                if let Err(err) = self.registry.remove_all(&relation) {
                    log_registry_error(&relation, "*", &err);
                }
                self.registry.revision() != revision
            }
            ReconcileEvent::ConfigChanged(patch) => {
                let changed = patch.apply_to(&mut self.settings);
                if changed {
                    tracing::info!(
                        image = self.settings.image.as_str(),
                        deployment_mode = self.settings.deployment_mode.as_str(),
                        "workload settings updated"
                    );
                }
                changed
            }
            ReconcileEvent::WorkloadReady
            | ReconcileEvent::ManualTrigger
            | ReconcileEvent::HealthCheck => true,
            ReconcileEvent::Teardown => false,
        }
    }

    /// Runs one reconcile pass.
    ///
    /// Workload failures are transient and end in `waiting` with a retry delay.
    /// Only synthesis failures are returned as errors.
    pub async fn reconcile(&mut self) -> Result<PassOutcome> {
        self.passes += 1;
        metrics().record_pass();

        let declarations = Arc::clone(&self.declarations);
        let snapshot = self.registry.snapshot();
        let observation =
            WorkloadObservation::settled().with_settings_issue(self.settings.validation_issue());

        let gate = evaluate(&declarations, &snapshot, &observation);
        if !gate.state.allows_action() {
            self.consecutive_failures = 0;
            return Ok(self.finish(gate, false, None).await);
        }

        let config = synthesize(&declarations, &snapshot, &self.settings)
            .and_then(|config| config.content_hash().map(|hash| (config, hash)))
            .map_err(|err| {
                tracing::error!(
                    revision = snapshot.revision(),
                    error = %err,
                    "configuration synthesis failed"
                );
                Error::from(err)
            });
        let (config, hash) = config?;

        let mut applied = false;
        if self.applied.as_ref().map(|current| current.hash.as_str()) == Some(hash.as_str()) {
            metrics().record_apply_skipped();
        } else {
            match self.push(&config).await {
                Ok(()) => {
                    metrics().record_apply();
                    tracing::info!(
                        hash = hash.as_str(),
                        image = config.image(),
                        revision = snapshot.revision(),
                        "workload configuration applied"
                    );
                    self.applied = Some(AppliedConfiguration {
                        hash,
                        image: config.image().to_string(),
                    });
                    applied = true;
                }
                Err(err) => {
                    metrics().record_apply_failure();
                    let (attempt, delay) = self.schedule_retry();
                    tracing::warn!(
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "workload apply failed"
                    );
                    let observation = observation.with_in_flight(Some(InFlight::RetryPending {
                        error: err.to_string(),
                    }));
                    let status = evaluate(&declarations, &snapshot, &observation);
                    return Ok(self.finish(status, false, Some(delay)).await);
                }
            }
        }

        let (in_flight, retry_after) = match self.observe_image().await {
            Err(err) => {
                let (attempt, delay) = self.schedule_retry();
                tracing::warn!(
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "workload image query failed"
                );
                (
                    Some(InFlight::ImageUnconfirmed {
                        reason: err.to_string(),
                    }),
                    Some(delay),
                )
            }
            Ok(current) => {
                self.consecutive_failures = 0;
                match self.applied.as_ref() {
                    Some(expected) if current.as_deref() != Some(expected.image.as_str()) => (
                        Some(InFlight::ImageRollout {
                            expected: expected.image.clone(),
                            observed: current,
                        }),
                        Some(backoff_delay(&self.tuning.retry, 1)),
                    ),
                    _ => (None, None),
                }
            }
        };

        let status = evaluate(
            &declarations,
            &snapshot,
            &observation.with_in_flight(in_flight),
        );
        Ok(self.finish(status, applied, retry_after).await)
    }

    fn schedule_retry(&mut self) -> (u32, Duration) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let attempt = self.consecutive_failures;
        (attempt, backoff_delay(&self.tuning.retry, attempt))
    }

    async fn push(&self, config: &RuntimeConfiguration) -> Result<(), ApplyError> {
        let limit = self.tuning.apply_timeout;
        timeout(limit, self.workload.apply(config))
            .await
            .map_err(|_| ApplyError::Timeout {
                operation: "apply",
                after: limit,
            })??;
        timeout(limit, self.workload.restart())
            .await
            .map_err(|_| ApplyError::Timeout {
                operation: "restart",
                after: limit,
            })??;
        Ok(())
    }

    async fn observe_image(&self) -> Result<Option<String>, ApplyError> {
        let limit = self.tuning.apply_timeout;
        timeout(limit, self.workload.current_image_ref())
            .await
            .map_err(|_| ApplyError::Timeout {
                operation: "image query",
                after: limit,
            })?
    }

    async fn finish(
        &mut self,
        status: WorkloadStatus,
        applied: bool,
        retry_after: Option<Duration>,
    ) -> PassOutcome {
        let published = self.publish_status(&status).await;
        PassOutcome {
            status,
            applied,
            published,
            retry_after,
        }
    }

    async fn publish_status(&mut self, status: &WorkloadStatus) -> bool {
        if self.last_published.as_ref() == Some(status) {
            return false;
        }

        tracing::info!(
            state_from = self
                .last_published
                .as_ref()
                .map(|previous| previous.state.as_str())
                .unwrap_or("unknown"),
            state_to = status.state.as_str(),
            reason = status.message.as_str(),
            "workload state transition"
        );

        self.publisher.publish(status).await;
        self.last_published = Some(status.clone());
        metrics().record_status_publish();
        true
    }

    async fn publish_relation_data(&self, relation: &str, source: &str) {
        let Some(declaration) = self.registry.declaration(relation) else {
            relation_event!(
                warn,
                TARGET,
                "relation_joined_unknown",
                relation = relation,
                source = source
            );
            return;
        };

        let data = self.render_publish_templates(declaration);
        if data.is_empty() {
            return;
        }

        if let Err(err) = self
            .relation_sink
            .publish_local(relation, source, &data)
            .await
        {
            relation_event!(
                warn,
                TARGET,
                "relation_data_publish_failed",
                relation = relation,
                source = source,
                error = err
            );
        }
    }

    fn render_publish_templates(
        &self,
        declaration: &DependencyDeclaration,
    ) -> BTreeMap<String, String> {
        let mut rendered = BTreeMap::new();
        for (key, template) in &declaration.publish {
            let url = match self.settings.advertised_url.as_deref() {
                Some(url) => url,
                None if template.contains("{advertised_url}") => {
                    tracing::debug!(
                        relation = declaration.name.as_str(),
                        key = key.as_str(),
                        "skipping publish key without advertised_url"
                    );
                    continue;
                }
                None => "",
            };
            rendered.insert(
                key.clone(),
                template
                    .replace("{advertised_url}", url)
                    .replace("{app_name}", &self.app_name),
            );
        }
        rendered
    }
}

fn log_registry_error(relation: &str, source: &str, err: &RegistryError) {
    relation_event!(
        warn,
        TARGET,
        "relation_event_ignored",
        relation = relation,
        source = source,
        reason = err
    );
}
