use crate::config::declarations::{normalise_advertised_url, WorkloadSettings};
use crate::domain::RelationData;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Something the platform observed that may change the desired workload state.
///
/// Deserialises from JSON objects tagged by `event`, e.g.
/// `{"event":"relation_changed","relation":"database","source":"mongodb/0","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconcileEvent {
    RelationJoined {
        relation: String,
        source: String,
    },
    RelationChanged {
        relation: String,
        source: String,
        #[serde(default)]
        data: RelationData,
    },
    RelationDeparted {
        relation: String,
        source: String,
    },
    RelationBroken {
        relation: String,
    },
    WorkloadReady,
    ConfigChanged(WorkloadSettingsPatch),
    ManualTrigger,
    HealthCheck,
    Teardown,
}

impl ReconcileEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileEvent::RelationJoined { .. } => "relation_joined",
            ReconcileEvent::RelationChanged { .. } => "relation_changed",
            ReconcileEvent::RelationDeparted { .. } => "relation_departed",
            ReconcileEvent::RelationBroken { .. } => "relation_broken",
            ReconcileEvent::WorkloadReady => "workload_ready",
            ReconcileEvent::ConfigChanged(_) => "config_changed",
            ReconcileEvent::ManualTrigger => "manual_trigger",
            ReconcileEvent::HealthCheck => "health_check",
            ReconcileEvent::Teardown => "teardown",
        }
    }

    pub fn is_teardown(&self) -> bool {
        matches!(self, ReconcileEvent::Teardown)
    }
}

/// Partial update of the workload settings; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkloadSettingsPatch {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub deployment_mode: Option<String>,
    #[serde(default)]
    pub log_levels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub overrides: Option<BTreeMap<String, JsonValue>>,
    #[serde(default)]
    pub advertised_url: Option<String>,
}

impl WorkloadSettingsPatch {
    /// Applies the patch and reports whether anything changed.
    ///
    /// An advertised URL that does not parse is logged and ignored; the previous
    /// value stays. An empty one clears it.
    pub fn apply_to(&self, settings: &mut WorkloadSettings) -> bool {
        let before = settings.clone();

        if let Some(image) = self.image.as_deref().map(str::trim).filter(|image| !image.is_empty()) {
            settings.image = image.to_string();
        }
        if let Some(mode) = self.deployment_mode.as_deref().map(str::trim).filter(|mode| !mode.is_empty()) {
            settings.deployment_mode = mode.to_string();
        }
        if let Some(levels) = self.log_levels.as_ref() {
            for (logger, level) in levels {
                settings
                    .log_levels
                    .insert(logger.trim().to_string(), level.trim().to_string());
            }
        }
        if let Some(overrides) = self.overrides.as_ref() {
            settings.overrides = overrides.clone();
        }
        if let Some(url) = self.advertised_url.as_deref() {
            if url.trim().is_empty() {
                settings.advertised_url = None;
            } else {
                match normalise_advertised_url(url) {
                    Ok(url) => settings.advertised_url = Some(url),
                    Err(err) => tracing::warn!(
                        advertised_url = url.trim(),
                        error = %err,
                        "ignoring invalid advertised URL in settings patch"
                    ),
                }
            }
        }

        *settings != before
    }
}
