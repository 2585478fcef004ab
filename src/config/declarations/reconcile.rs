use super::parse_duration_value;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);
const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    /// Upper bound on a single apply, restart or image query.
    pub apply_timeout: Duration,
    pub retry: RetryPolicy,
    /// Periodic health recheck; `None` disables the timer.
    pub recheck_interval: Option<Duration>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
            retry: RetryPolicy::default(),
            recheck_interval: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: JitterMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_RETRY_BASE,
            max_backoff: DEFAULT_RETRY_MAX,
            jitter: JitterMode::Equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterMode {
    None,
    Equal,
    Full,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawReconcileSection {
    #[serde(default)]
    pub(crate) apply_timeout: Option<String>,
    #[serde(default)]
    pub(crate) recheck_interval: Option<String>,
    #[serde(default)]
    pub(crate) retry: Option<RawRetryPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRetryPolicy {
    #[serde(default)]
    pub(crate) base_backoff: Option<String>,
    #[serde(default)]
    pub(crate) max_backoff: Option<String>,
    #[serde(default)]
    pub(crate) jitter: Option<String>,
}

pub(crate) fn parse_reconcile(
    raw: Option<RawReconcileSection>,
    errors: &mut Vec<String>,
) -> ReconcileSettings {
    let raw = raw.unwrap_or_default();
    let mut settings = ReconcileSettings::default();

    if let Some(timeout) =
        parse_duration_value("reconcile.apply_timeout", raw.apply_timeout, errors)
    {
        settings.apply_timeout = timeout;
    }

    settings.recheck_interval =
        parse_duration_value("reconcile.recheck_interval", raw.recheck_interval, errors);

    if let Some(retry) = raw.retry {
        settings.retry = parse_retry_policy(retry, errors);
    }

    settings
}

fn parse_retry_policy(raw: RawRetryPolicy, errors: &mut Vec<String>) -> RetryPolicy {
    let mut policy = RetryPolicy::default();

    if let Some(base) =
        parse_duration_value("reconcile.retry.base_backoff", raw.base_backoff, errors)
    {
        policy.base_backoff = base;
    }
    if let Some(max) = parse_duration_value("reconcile.retry.max_backoff", raw.max_backoff, errors)
    {
        policy.max_backoff = max;
    }

    if policy.max_backoff < policy.base_backoff {
        errors.push(format!(
            "error[reconcile.retry]: max_backoff ({:?}) must not be shorter than base_backoff ({:?})",
            policy.max_backoff, policy.base_backoff
        ));
    }

    if let Some(jitter_raw) = raw.jitter {
        let trimmed = jitter_raw.trim();
        match parse_jitter_mode(trimmed) {
            Some(mode) => policy.jitter = mode,
            None => errors.push(format!(
                "error[reconcile.retry.jitter]: must be one of `none`, `equal`, or `full` (got `{trimmed}`)"
            )),
        }
    }

    policy
}

fn parse_jitter_mode(value: &str) -> Option<JitterMode> {
    match value.to_ascii_lowercase().as_str() {
        "none" => Some(JitterMode::None),
        "equal" => Some(JitterMode::Equal),
        "full" => Some(JitterMode::Full),
        _ => None,
    }
}
