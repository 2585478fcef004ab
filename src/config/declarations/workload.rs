use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use url::Url;

/// Log levels the packaged server accepts; anything else blocks the workload.
pub const VALID_LOG_LEVELS: &[&str] = &["INFO", "WARN", "DEBUG", "TRACE", "OFF"];

const DEFAULT_DEPLOYMENT_MODE: &str = "production";
const DEFAULT_LOGGER: &str = "server";
const DEFAULT_LOG_LEVEL: &str = "INFO";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSettings {
    pub image: String,
    pub deployment_mode: String,
    pub log_levels: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, JsonValue>,
    pub advertised_url: Option<String>,
}

impl WorkloadSettings {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            deployment_mode: DEFAULT_DEPLOYMENT_MODE.to_string(),
            log_levels: default_log_levels(),
            overrides: BTreeMap::new(),
            advertised_url: None,
        }
    }

    /// Returns the blocking message for settings the workload cannot start with.
    ///
    /// Log levels are validated here rather than at parse time because they can be
    /// changed at runtime through config-changed events.
    pub fn validation_issue(&self) -> Option<String> {
        let invalid = self
            .log_levels
            .iter()
            .filter(|(_, level)| !VALID_LOG_LEVELS.contains(&level.as_str()))
            .map(|(logger, level)| format!("{logger}={level}"))
            .collect::<Vec<_>>();

        if invalid.is_empty() {
            None
        } else {
            Some(format!(
                "one or more logging config options are improperly formatted: {} (valid levels: {})",
                invalid.join(", "),
                VALID_LOG_LEVELS.join(", ")
            ))
        }
    }
}

/// Parses an advertised URL and strips trailing slashes so templates can
/// append paths.
pub fn normalise_advertised_url(raw: &str) -> Result<String, url::ParseError> {
    let trimmed = raw.trim();
    Url::parse(trimmed)?;
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn default_log_levels() -> BTreeMap<String, String> {
    BTreeMap::from([(DEFAULT_LOGGER.to_string(), DEFAULT_LOG_LEVEL.to_string())])
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawWorkloadSection {
    #[serde(default)]
    pub(crate) image: Option<String>,
    #[serde(default)]
    pub(crate) deployment_mode: Option<String>,
    #[serde(default)]
    pub(crate) log_levels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub(crate) overrides: BTreeMap<String, YamlValue>,
    #[serde(default)]
    pub(crate) advertised_url: Option<String>,
}

pub(crate) fn parse_workload(
    raw: Option<RawWorkloadSection>,
    errors: &mut Vec<String>,
) -> WorkloadSettings {
    let Some(raw) = raw else {
        errors.push("error[workload]: section is required".to_string());
        return WorkloadSettings::new("");
    };

    let image = match raw.image.as_deref().map(str::trim) {
        Some(image) if !image.is_empty() => image.to_string(),
        _ => {
            errors.push("error[workload.image]: must be a non-empty image reference".to_string());
            String::new()
        }
    };

    let mut settings = WorkloadSettings::new(image);

    if let Some(mode) = raw.deployment_mode {
        let trimmed = mode.trim();
        if trimmed.is_empty() {
            errors.push("error[workload.deployment_mode]: must be a non-empty string".to_string());
        } else {
            settings.deployment_mode = trimmed.to_string();
        }
    }

    if let Some(levels) = raw.log_levels {
        settings.log_levels = levels
            .into_iter()
            .map(|(logger, level)| (logger.trim().to_string(), level.trim().to_string()))
            .collect();
    }

    for (key, value) in raw.overrides {
        match serde_json::to_value(value) {
            Ok(json) => {
                settings.overrides.insert(key, json);
            }
            Err(err) => errors.push(format!(
                "error[workload.overrides.{key}]: value cannot be represented as JSON: {err}"
            )),
        }
    }

    if let Some(url) = raw.advertised_url {
        match normalise_advertised_url(&url) {
            Ok(url) => settings.advertised_url = Some(url),
            Err(err) => errors.push(format!(
                "error[workload.advertised_url]: `{}` is not a valid URL: {err}",
                url.trim()
            )),
        }
    }

    settings
}
