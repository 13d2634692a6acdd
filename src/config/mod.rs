//! # Declarative configuration for the supervisor.
//!
//! A config file is plain YAML that goes through the template expander in
//! [`template`] before parsing, so values can reference environment
//! variables (including ones exported by secret processes between the two
//! render passes).
//!
//! Top-level keys:
//! - `process_manager`: the supervisor's own logging plus debug toggles.
//! - `default_logger_config`: fallback logging engine for processes that do
//!   not configure one.
//! - `processes`: `secret_processes`, `init_processes`, `main_processes`.
//!
//! ## Defaulting rules
//! - Missing default engine → `console`.
//! - A process without a logger inherits the default engine and gets its
//!   own name as `process_name`.
//! - `termination_timeout_seconds <= 0` → 30 for processes, 60 for secrets.

mod example;
pub mod template;

pub use example::example_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_ENGINE: &str = "console";
const DEFAULT_TERM_TIMEOUT_SECS: i64 = 30;
const DEFAULT_SECRET_TIMEOUT_SECS: i64 = 60;

/// The whole config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub process_manager: ProcessManagerConfig,
    #[serde(default)]
    pub processes: ProcessesConfig,
    #[serde(default)]
    pub default_logger_config: DefaultLoggerConfig,
}

/// Configuration for the supervisor itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessManagerConfig {
    #[serde(default)]
    pub logging_config: LoggingConfig,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub debug_options: DebugOptions,
}

/// Debug-only toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugOptions {
    #[serde(default)]
    pub show_generated_config: bool,
}

/// Fallback logger handed to processes without one of their own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultLoggerConfig {
    #[serde(default)]
    pub logging_config: LoggingConfig,
}

/// The three process lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessesConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_processes: Vec<SecretSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_processes: Vec<ProcessSpec>,
    #[serde(default)]
    pub main_processes: Vec<ProcessSpec>,
}

/// One init or main process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub logging_config: LoggingConfig,
    /// When set, stderr lines are forwarded under the stdout tag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub combine_output: bool,
    /// Grace period between INT/TERM relay and SIGKILL. `<= 0` → 30.
    #[serde(default)]
    pub termination_timeout_seconds: i64,
    /// Sleep before the first spawn.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub start_delay_seconds: u64,
    /// Failing-restart budget. `<= 0` disables restarting.
    #[serde(default)]
    pub restart_count: i32,
}

/// One secret-provider process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Hard deadline for the whole run. `<= 0` → 60.
    #[serde(default)]
    pub termination_timeout_seconds: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
}

/// Logging configuration carried by every process and by the supervisor.
///
/// `engine` picks one compiled-in sink and doubles as the queue key in the
/// log manager. The value travels inside every
/// [`LogMessage`](crate::logging::LogMessage) so a message stays routable
/// after its producer is gone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub engine: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process_name: String,
    #[serde(default, skip_serializing_if = "SyslogConfig::is_empty")]
    pub syslog: SyslogConfig,
    #[serde(default, skip_serializing_if = "FileLoggerConfig::is_empty")]
    pub file_logger: FileLoggerConfig,
}

impl LoggingConfig {
    /// A bare console config, used by the bootstrap logger before the full
    /// configuration is materialized.
    pub fn console() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            ..Self::default()
        }
    }
}

/// Settings for the syslog sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyslogConfig {
    #[serde(default)]
    pub program_name: String,
    #[serde(default)]
    pub address: String,
    /// One of `udp`, `tcp`, `tcp+tls`. Empty → `tcp+tls`.
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub cert_bundle_path: String,
    #[serde(default)]
    pub extract_log_level: bool,
    #[serde(default)]
    pub override_hostname: String,
    #[serde(default)]
    pub append_container_name_to_tag: bool,
    #[serde(default)]
    pub append_container_name_to_hostname: bool,
}

impl SyslogConfig {
    fn is_empty(&self) -> bool {
        self.program_name.is_empty() && self.address.is_empty()
    }
}

/// Settings for the rotating file sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileLoggerConfig {
    #[serde(default)]
    pub filepath: String,
    /// Rotation threshold in bytes.
    #[serde(default)]
    pub size_limit: u64,
    /// How many rotated files to keep around.
    #[serde(default)]
    pub historical_files_limit: usize,
}

impl FileLoggerConfig {
    fn is_empty(&self) -> bool {
        self.filepath.is_empty()
    }
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

impl Config {
    /// Reads, template-expands, parses, and normalizes a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&raw)
    }

    /// Parses config text that has already been read from somewhere.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let expanded = template::expand(raw)?;
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Renders the materialized config back to YAML, for the
    /// `show_generated_config` debug option.
    pub fn render(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_else(|e| format!("<unrenderable config: {e}>"))
    }

    fn apply_defaults(&mut self) {
        if self.default_logger_config.logging_config.engine.is_empty() {
            self.default_logger_config.logging_config.engine = DEFAULT_ENGINE.to_string();
        }
        if self.process_manager.logging_config.engine.is_empty() {
            self.process_manager.logging_config.engine = DEFAULT_ENGINE.to_string();
        }

        let default_engine = self.default_logger_config.logging_config.engine.clone();
        for proc in self
            .processes
            .init_processes
            .iter_mut()
            .chain(self.processes.main_processes.iter_mut())
        {
            if proc.logging_config.process_name.is_empty() {
                proc.logging_config.process_name = proc.name.clone();
            }
            if proc.logging_config.engine.is_empty() {
                proc.logging_config.engine = default_engine.clone();
            }
            if proc.termination_timeout_seconds <= 0 {
                proc.termination_timeout_seconds = DEFAULT_TERM_TIMEOUT_SECS;
            }
        }
        for secret in self.processes.secret_processes.iter_mut() {
            if secret.termination_timeout_seconds <= 0 {
                secret.termination_timeout_seconds = DEFAULT_SECRET_TIMEOUT_SECS;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let yaml = r#"
processes:
  init_processes:
    - name: migrate
      command: /bin/migrate
  main_processes:
    - name: web
      command: /bin/web
      termination_timeout_seconds: 0
    - name: worker
      command: /bin/worker
      termination_timeout_seconds: 5
      logging_config:
        engine: devnull
  secret_processes:
    - name: vault
      command: /bin/vault
"#;
        let config = Config::from_str(yaml).unwrap();

        assert_eq!(config.default_logger_config.logging_config.engine, "console");
        assert_eq!(config.process_manager.logging_config.engine, "console");

        let web = &config.processes.main_processes[0];
        assert_eq!(web.logging_config.engine, "console");
        assert_eq!(web.logging_config.process_name, "web");
        assert_eq!(web.termination_timeout_seconds, 30);

        let worker = &config.processes.main_processes[1];
        assert_eq!(worker.logging_config.engine, "devnull");
        assert_eq!(worker.termination_timeout_seconds, 5);

        let migrate = &config.processes.init_processes[0];
        assert_eq!(migrate.logging_config.process_name, "migrate");
        assert_eq!(migrate.termination_timeout_seconds, 30);

        assert_eq!(config.processes.secret_processes[0].termination_timeout_seconds, 60);
    }

    #[test]
    fn configured_default_engine_wins() {
        let yaml = r#"
default_logger_config:
  logging_config:
    engine: devnull
processes:
  main_processes:
    - name: app
      command: /bin/app
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.processes.main_processes[0].logging_config.engine, "devnull");
    }

    #[test]
    fn restart_and_delay_fields_parse() {
        let yaml = r#"
processes:
  main_processes:
    - name: app
      command: /bin/app
      arguments: ["--port", "8080"]
      restart_count: 3
      start_delay_seconds: 2
      combine_output: true
"#;
        let config = Config::from_str(yaml).unwrap();
        let app = &config.processes.main_processes[0];
        assert_eq!(app.arguments, vec!["--port", "8080"]);
        assert_eq!(app.restart_count, 3);
        assert_eq!(app.start_delay_seconds, 2);
        assert!(app.combine_output);
    }

    #[test]
    fn bad_yaml_is_a_parse_error() {
        let err = Config::from_str("processes: [not: a: mapping").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Parse(_)));
    }
}
