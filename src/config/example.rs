//! Example configuration emitter backing the `--example-config` flag.

use crate::error::ConfigError;

use super::{
    Config, DefaultLoggerConfig, LoggingConfig, ProcessManagerConfig, ProcessSpec,
    ProcessesConfig, SecretSpec, SyslogConfig,
};

/// Builds a config that exercises every feature and renders it as YAML.
pub fn example_config() -> Result<String, ConfigError> {
    let init_processes = vec![
        ProcessSpec {
            name: "migrations".to_string(),
            command: "/example/bin1".to_string(),
            arguments: vec!["--arg1".to_string(), "two".to_string()],
            logging_config: LoggingConfig {
                engine: "console".to_string(),
                ..LoggingConfig::default()
            },
            ..ProcessSpec::default()
        },
        ProcessSpec {
            name: "warmup".to_string(),
            command: "/example/bin2".to_string(),
            arguments: vec!["--print".to_string(), "extra".to_string()],
            ..ProcessSpec::default()
        },
    ];

    let main_processes = vec![
        ProcessSpec {
            name: "webserver".to_string(),
            command: "/example/bin1".to_string(),
            arguments: vec![
                "--arg1".to_string(),
                "--arg2".to_string(),
                "--arg3".to_string(),
                "extra".to_string(),
            ],
            termination_timeout_seconds: 30,
            restart_count: 2,
            ..ProcessSpec::default()
        },
        ProcessSpec {
            name: "sidecar".to_string(),
            command: "/example/bin2".to_string(),
            arguments: vec!["--print".to_string(), "extra".to_string()],
            start_delay_seconds: 1,
            ..ProcessSpec::default()
        },
    ];

    let secret_processes = vec![SecretSpec {
        name: "vault".to_string(),
        command: "/example/fetch-secrets".to_string(),
        arguments: vec!["--output".to_string(), "json".to_string()],
        ..SecretSpec::default()
    }];

    let example = Config {
        process_manager: ProcessManagerConfig {
            logging_config: LoggingConfig {
                engine: "syslog".to_string(),
                ..LoggingConfig::default()
            },
            ..ProcessManagerConfig::default()
        },
        processes: ProcessesConfig {
            secret_processes,
            init_processes,
            main_processes,
        },
        default_logger_config: DefaultLoggerConfig {
            logging_config: LoggingConfig {
                engine: "syslog".to_string(),
                syslog: SyslogConfig {
                    program_name: "example_service".to_string(),
                    address: "logs.example.com:16900".to_string(),
                    ..SyslogConfig::default()
                },
                ..LoggingConfig::default()
            },
        },
    };

    serde_yaml::to_string(&example).map_err(ConfigError::from)
}
