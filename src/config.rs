pub mod declarations;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use declarations::DeclarationsConfig;

/// Process-level settings; the relation model itself lives in the declarations file.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub declarations_path: Option<String>,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            declarations_path: None,
            output_path: default_output_path(),
            app_name: default_app_name(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_output_path() -> String {
    "workload-config.json".to_string()
}

fn default_app_name() -> String {
    "workload".to_string()
}

const fn default_event_capacity() -> usize {
    64
}

impl OperatorConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("WORKLOAD_OPERATOR").separator("__"))
            .build()?
            .try_deserialize()
    }
}
