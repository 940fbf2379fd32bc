//! Configuration management for ComplyScan binaries.

use complyscan_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Assessment behavior settings.
    #[serde(default)]
    pub assessment: AssessmentConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assessment: AssessmentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_argument(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::invalid_argument(format!("failed to parse config: {}", e)))
    }

    /// Create a configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Merge with environment variables (COMPLYSCAN_ prefix).
    pub fn merge_env(mut self) -> Self {
        if let Ok(val) = std::env::var("COMPLYSCAN_REPORT_FORMAT") {
            self.assessment.report_format = val;
        }
        if let Ok(val) = std::env::var("COMPLYSCAN_SCRIPT_MAX_OPERATIONS") {
            if let Ok(n) = val.parse() {
                self.assessment.script_max_operations = n;
            }
        }
        if let Ok(val) = std::env::var("COMPLYSCAN_ALLOW_REMEDIATION") {
            if let Ok(allowed) = val.parse() {
                self.assessment.allow_remediation = allowed;
            }
        }

        if let Ok(val) = std::env::var("COMPLYSCAN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("COMPLYSCAN_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }
}

/// Assessment behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Report format printed after an assessment
    /// (nested, compact, json, last-non-compliant).
    #[serde(default = "default_report_format")]
    pub report_format: String,

    /// Operation budget for one script evaluation; scripts exceeding it
    /// are aborted.
    #[serde(default = "default_script_max_operations")]
    pub script_max_operations: u64,

    /// Whether remediate invocations are allowed; off until a deployment
    /// opts in.
    #[serde(default)]
    pub allow_remediation: bool,
}

fn default_report_format() -> String {
    String::from("nested")
}

fn default_script_max_operations() -> u64 {
    1_000_000
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            report_format: String::from("nested"),
            script_max_operations: 1_000_000,
            allow_remediation: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("pretty"),
        }
    }
}

/// Builder for constructing Config.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn report_format(mut self, format: impl Into<String>) -> Self {
        self.config.assessment.report_format = format.into();
        self
    }

    pub fn script_max_operations(mut self, budget: u64) -> Self {
        self.config.assessment.script_max_operations = budget;
        self
    }

    pub fn allow_remediation(mut self, allowed: bool) -> Self {
        self.config.assessment.allow_remediation = allowed;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn log_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
