//! The unit of work handed to the logging subsystem.

use crate::config::LoggingConfig;

/// Which pipe of the producing process a message came out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipe {
    /// stdout
    Out,
    /// stderr
    Err,
}

/// One line of output on its way to a sink.
///
/// The logging config is carried **by value** so the message stays fully
/// routable (engine, syslog fields, file path) after the producing process
/// has exited and its config is gone.
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// Name of whatever produced the line.
    pub source: String,
    pub pipe: Pipe,
    pub config: LoggingConfig,
    /// The line itself, newline-terminated.
    pub message: String,
}
