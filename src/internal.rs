//! # The supervisor's own logger.
//!
//! A thin facade over the [`LogManager`] for messages produced by the
//! supervisor itself: std goes out under the stdout tag, err under the
//! stderr tag, and debug is err-tagged but gated behind a runtime toggle.
//! Every message is delivered with exactly one trailing newline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::LoggingConfig;
use crate::logging::{LogManager, LogMessage, Pipe};

/// Source tag stamped on every message the supervisor emits about itself.
const PM_SOURCE: &str = "launch_process_manager";

/// Cloneable handle; clones share the debug toggle.
#[derive(Clone)]
pub struct InternalLogger {
    config: LoggingConfig,
    manager: Arc<LogManager>,
    debug: Arc<AtomicBool>,
}

impl InternalLogger {
    pub fn new(config: LoggingConfig, manager: Arc<LogManager>) -> Self {
        Self {
            config,
            manager,
            debug: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Turns debug logging on or off for every clone of this logger.
    pub fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::SeqCst);
    }

    /// Logs at standard level.
    pub fn std(&self, msg: impl Into<String>) {
        self.submit(Pipe::Out, msg.into());
    }

    /// Logs at error level.
    pub fn err(&self, msg: impl Into<String>) {
        self.submit(Pipe::Err, msg.into());
    }

    /// Logs at error level, but only while the debug toggle is on.
    pub fn debug(&self, msg: impl Into<String>) {
        if self.debug.load(Ordering::SeqCst) {
            self.submit(Pipe::Err, msg.into());
        }
    }

    fn submit(&self, pipe: Pipe, mut message: String) {
        if !message.ends_with('\n') {
            message.push('\n');
        }
        self.manager.submit(LogMessage {
            source: PM_SOURCE.to_string(),
            pipe,
            config: self.config.clone(),
            message,
        });
    }
}
