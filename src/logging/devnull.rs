//! Black-hole sink. Implements the full contract and discards everything.
//! Useful for processes whose output is pure noise.

use async_trait::async_trait;

use crate::config::{DefaultLoggerConfig, LoggingConfig};
use crate::error::SinkError;
use crate::logging::message::LogMessage;
use crate::logging::sink::Sink;

pub const ENGINE: &str = "devnull";

pub struct DevNullSink;

impl DevNullSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DevNullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for DevNullSink {
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

    async fn submit(&mut self, _msg: LogMessage) {}

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
