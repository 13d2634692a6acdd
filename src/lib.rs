//! # launch
//!
//! **Launch** is a container-oriented process supervisor, built to run as
//! PID 1 (or any parent) inside a container image. Given a declarative YAML
//! configuration it collects secrets, runs an ordered init sequence, keeps
//! a set of main processes running, and forwards their output through a
//! pluggable log-shipping pipeline.
//!
//! ## Features
//!
//! | Area                  | Description                                                        | Key types                                  |
//! |-----------------------|--------------------------------------------------------------------|--------------------------------------------|
//! | **Supervision**       | Ordered init processes, parallel main processes, tumble cascade.   | [`Supervisor`], [`Process`], [`ExitState`] |
//! | **Signals**           | Fan-out of INT/TERM/HUP to every supervised child.                 | [`SignalReplicator`], [`SubscriberId`]     |
//! | **Log forwarding**    | Per-engine bounded queues, drop-on-backpressure, ordered drain.    | [`LogManager`], [`Sink`], [`LogMessage`]   |
//! | **Sinks**             | `console`, `devnull`, `logfile` (rotating), `syslog` (udp/tcp/tls).| [`Sink`]                                   |
//! | **Secrets**           | Helper commands whose JSON output lands in the environment.        | [`collect_secrets`]                        |
//! | **Configuration**     | Templated YAML with per-process logging and restart budgets.       | [`Config`]                                 |
//! | **Errors**            | Typed startup and shutdown errors.                                 | [`ConfigError`], [`SinkError`], [`ProcessError`] |
//!
//! ## Lifecycle
//!
//! ```text
//! config ──► Supervisor ──► secrets ──► config (re-rendered)
//!     ──► init processes (sequential, must exit 0)
//!     ──► main processes (parallel) ──► exit-state report ──► logger drain
//! ```
//!
//! ---

mod config;
mod error;
mod internal;
mod logging;
mod os_signals;
mod process;
mod replicator;
mod secret;
mod supervisor;

// ---- Public re-exports ----

pub use config::{
    example_config, template, Config, DefaultLoggerConfig, FileLoggerConfig, LoggingConfig,
    ProcessManagerConfig, ProcessSpec, ProcessesConfig, SecretSpec, SyslogConfig,
};
pub use error::{ConfigError, ProcessError, SinkError};
pub use internal::InternalLogger;
pub use logging::{builtin_sinks, LogManager, LogMessage, Pipe, Sink};
pub use os_signals::spawn_signal_forwarder;
pub use process::{ExitState, Process, ProcessKind};
pub use replicator::{SignalReplicator, SubscriberId};
pub use secret::{collect_secrets, run_secret};
pub use supervisor::Supervisor;
