//! # Error types used by the supervisor and the logging subsystem.
//!
//! This module defines three error enums:
//!
//! - [`ConfigError`] errors raised while reading, expanding, or parsing the
//!   configuration file.
//! - [`SinkError`] errors raised by logging engines and the log manager.
//! - [`ProcessError`] errors raised while running secret and init processes.
//!
//! Everything in here is fatal at startup except [`SinkError::Shutdown`],
//! which is collected at program exit and reported without changing the
//! exit code.

use thiserror::Error;

/// # Errors produced while loading the configuration file.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("could not read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A template directive failed to expand.
    #[error("failed to expand config template: {reason}")]
    Template {
        /// What the expander objected to.
        reason: String,
    },
    /// The expanded text is not valid YAML for the expected schema.
    #[error("failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// # Errors produced by logging engines and the log manager.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SinkError {
    /// A logging config referenced an engine that was never compiled in.
    #[error("logging engine {name} is not recognized, check your configuration file")]
    UnknownEngine {
        /// The unrecognized engine name.
        name: String,
    },
    /// An engine rejected a logging config during registration.
    #[error("logger {engine} rejected configuration: {reason}")]
    Register { engine: String, reason: String },
    /// An engine failed to start (connect, open files, ...).
    #[error("logger {engine} failed to start: {reason}")]
    Start { engine: String, reason: String },
    /// An engine reported an error while flushing and closing.
    #[error("logger {engine} got an error on shutdown: {reason}")]
    Shutdown { engine: String, reason: String },
}

/// # Errors produced while driving secret and init processes.
///
/// Spawn failures have no variant of their own: a failed spawn is recorded
/// as an exit state with code 1, which becomes [`ProcessError::Init`] for
/// init processes. Main process failures are never errors; they are
/// reported through the aggregated exit-state list instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A secret process exited non-zero, timed out, or printed something
    /// that is not a flat JSON string map.
    #[error("there was an error collecting secrets from {name}: {reason}")]
    Secret { name: String, reason: String },
    /// An init process failed, aborting the whole startup sequence.
    #[error("process {name} failed: {reason}")]
    Init { name: String, reason: String },
}
