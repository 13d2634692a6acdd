//! # Core sink trait and the compiled-in sink registry.
//!
//! A sink is a logging engine: something that accepts [`LogMessage`]s and
//! ships them somewhere. Each active sink is driven by a dedicated forwarder
//! task fed by a bounded queue owned by the
//! [`LogManager`](crate::logging::LogManager).
//!
//! ## Contract
//! - [`register_config`](Sink::register_config) is called once per distinct
//!   logging config that names this engine, before `start`. Re-registration
//!   with an equivalent config must be a no-op.
//! - [`start`](Sink::start) is called exactly once, before the first
//!   `submit`.
//! - [`submit`](Sink::submit) is only ever called from the sink's forwarder
//!   task, so implementations get `&mut self` and may assume a single
//!   producer.
//! - [`shutdown`](Sink::shutdown) completes after all buffered work has
//!   flushed; its error is collected at program exit.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{DefaultLoggerConfig, LoggingConfig};
use crate::error::SinkError;
use crate::logging::message::LogMessage;

/// Contract for logging engines.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Accepts (and validates) one logging config that routes to this
    /// engine. Called before `start`, possibly several times.
    fn register_config(
        &mut self,
        config: &LoggingConfig,
        defaults: &DefaultLoggerConfig,
    ) -> Result<(), SinkError>;

    /// Brings the engine up (connect, open files). Called exactly once.
    async fn start(&mut self) -> Result<(), SinkError>;

    /// Ships one message. Runtime failures are the sink's to swallow;
    /// loggers never terminate service.
    async fn submit(&mut self, msg: LogMessage);

    /// Flushes and closes. Completes only once buffered work is done.
    async fn shutdown(&mut self) -> Result<(), SinkError>;
}

/// Enumerates every compiled-in sink under its engine name.
///
/// This is the only place engine names are bound to implementations; after
/// config resolution all dispatch goes through the trait object.
pub fn builtin_sinks() -> HashMap<String, Box<dyn Sink>> {
    let mut sinks: HashMap<String, Box<dyn Sink>> = HashMap::new();
    sinks.insert(
        crate::logging::console::ENGINE.to_string(),
        Box::new(crate::logging::console::ConsoleSink::new()),
    );
    sinks.insert(
        crate::logging::devnull::ENGINE.to_string(),
        Box::new(crate::logging::devnull::DevNullSink::new()),
    );
    sinks.insert(
        crate::logging::logfile::ENGINE.to_string(),
        Box::new(crate::logging::logfile::FileSink::new()),
    );
    sinks.insert(
        crate::logging::syslog::ENGINE.to_string(),
        Box::new(crate::logging::syslog::SyslogSink::new()),
    );
    sinks
}
