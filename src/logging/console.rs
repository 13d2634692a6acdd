//! Console sink: prints to the supervisor's own stdout and stderr.
//! Intended for development and as the bootstrap engine while the full
//! configuration is still being materialized.

use std::io::Write;

use async_trait::async_trait;

use crate::config::{DefaultLoggerConfig, LoggingConfig};
use crate::error::SinkError;
use crate::logging::message::{LogMessage, Pipe};
use crate::logging::sink::Sink;

pub const ENGINE: &str = "console";

pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn register_config(
        &mut self,
        _config: &LoggingConfig,
        _defaults: &DefaultLoggerConfig,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn submit(&mut self, msg: LogMessage) {
        let line = format!("{}: {}", msg.source, msg.message);
        match msg.pipe {
            Pipe::Out => {
                let _ = std::io::stdout().write_all(line.as_bytes());
            }
            Pipe::Err => {
                let _ = std::io::stderr().write_all(line.as_bytes());
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        Ok(())
    }
}
