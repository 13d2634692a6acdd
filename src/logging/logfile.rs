//! # Rotating file sink.
//!
//! Writes messages to the file named by each registered config and rotates
//! on a size threshold: the current file is renamed to
//! `<path>.<RFC3339 timestamp>` and a fresh one is opened. Only the
//! `historical_files_limit` most recent rotated files are kept.
//!
//! ## Rules
//! - One writer per distinct `filepath`; registering the same path twice is
//!   a no-op.
//! - Size is tracked by counting written bytes, so the hot path never
//!   touches `stat`.
//! - Runtime IO failures are reported on the supervisor's stderr and never
//!   terminate service.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::config::{DefaultLoggerConfig, FileLoggerConfig, LoggingConfig};
use crate::error::SinkError;
use crate::logging::message::LogMessage;
use crate::logging::sink::Sink;

pub const ENGINE: &str = "logfile";

/// File sink: tracks one rotating writer per configured path.
pub struct FileSink {
    writers: HashMap<String, RotateWriter>,
}

impl FileSink {
    pub fn new() -> Self {
        Self {
            writers: HashMap::new(),
        }
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for FileSink {
    fn register_config(
        &mut self,
        config: &LoggingConfig,
        _defaults: &DefaultLoggerConfig,
    ) -> Result<(), SinkError> {
        let file_config = &config.file_logger;
        if file_config.filepath.is_empty() {
            return Err(SinkError::Register {
                engine: ENGINE.to_string(),
                reason: "file_logger.filepath is required".to_string(),
            });
        }
        if self.writers.contains_key(&file_config.filepath) {
            return Ok(());
        }

        let writer = RotateWriter::create(file_config.clone()).map_err(|e| SinkError::Register {
            engine: ENGINE.to_string(),
            reason: format!("cannot open {}: {e}", file_config.filepath),
        })?;
        self.writers.insert(file_config.filepath.clone(), writer);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn submit(&mut self, msg: LogMessage) {
        let Some(writer) = self.writers.get_mut(&msg.config.file_logger.filepath) else {
            eprintln!(
                "no log file registered for {}, dropping a line from {}",
                msg.config.file_logger.filepath, msg.source
            );
            return;
        };
        writer.write(msg.message.as_bytes());
    }

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for (path, writer) in self.writers.iter_mut() {
            if let Err(e) = writer.close() {
                failures.push(format!("{path}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Shutdown {
                engine: ENGINE.to_string(),
                reason: failures.join(" | "),
            })
        }
    }
}

/// A single log file plus its rotation state.
struct RotateWriter {
    config: FileLoggerConfig,
    file: Option<File>,
    current_size: u64,
    /// Rotated file paths, newest first.
    history: Vec<PathBuf>,
}

impl RotateWriter {
    /// Opens the first file; rotation gives us a clean slate even when a
    /// stale file is already present at the path. The retention limit
    /// applies to that stale file too.
    fn create(config: FileLoggerConfig) -> std::io::Result<Self> {
        let mut writer = Self {
            config,
            file: None,
            current_size: 0,
            history: Vec::new(),
        };
        writer.rotate()?;
        writer.delete_old();
        Ok(writer)
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Some(file) = self.file.as_mut() {
            match file.write_all(bytes) {
                Ok(()) => self.current_size += bytes.len() as u64,
                Err(e) => eprintln!("failed to write to {}: {e}", self.config.filepath),
            }
        }
        if self.current_size > self.config.size_limit {
            if let Err(e) = self.rotate() {
                eprintln!("failed to rotate {}: {e}", self.config.filepath);
            }
            self.delete_old();
        }
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.take() {
            drop(file);
        }

        // A file may already exist at the path, either ours or a stale one
        // from a previous container life. Either way it becomes history.
        if std::fs::metadata(&self.config.filepath).is_ok() {
            let rotated = format!(
                "{}.{}",
                self.config.filepath,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
            );
            std::fs::rename(&self.config.filepath, &rotated)?;
            self.history.insert(0, PathBuf::from(rotated));
        }

        self.file = Some(File::create(&self.config.filepath)?);
        self.current_size = 0;
        Ok(())
    }

    fn delete_old(&mut self) {
        if self.history.len() <= self.config.historical_files_limit {
            return;
        }
        for stale in self.history.split_off(self.config.historical_files_limit) {
            match std::fs::remove_file(&stale) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => eprintln!("failed to delete old log file {}: {e}", stale.display()),
            }
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::message::Pipe;

    fn file_config(path: &str, size_limit: u64, history: usize) -> LoggingConfig {
        LoggingConfig {
            engine: ENGINE.to_string(),
            file_logger: FileLoggerConfig {
                filepath: path.to_string(),
                size_limit,
                historical_files_limit: history,
            },
            ..LoggingConfig::default()
        }
    }

    fn message(config: &LoggingConfig, body: &str) -> LogMessage {
        LogMessage {
            source: "test".to_string(),
            pipe: Pipe::Out,
            config: config.clone(),
            message: body.to_string(),
        }
    }

    fn count_with_prefix(dir: &std::path::Path, prefix: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .count()
    }

    #[tokio::test]
    async fn rotation_bounds_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = file_config(path.to_str().unwrap(), 100, 2);

        let mut sink = FileSink::new();
        sink.register_config(&config, &DefaultLoggerConfig::default())
            .unwrap();
        sink.start().await.unwrap();

        // 1000 bytes in 10-byte chunks against a 100-byte limit.
        for _ in 0..100 {
            sink.submit(message(&config, "123456789\n")).await;
        }
        sink.shutdown().await.unwrap();

        // One active file plus at most two rotated ones.
        let total = count_with_prefix(dir.path(), "app.log");
        assert!(total <= 3, "expected at most 3 files, found {total}");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn register_is_idempotent_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("same.log");
        let config = file_config(path.to_str().unwrap(), 1024, 1);

        let mut sink = FileSink::new();
        sink.register_config(&config, &DefaultLoggerConfig::default())
            .unwrap();
        sink.register_config(&config, &DefaultLoggerConfig::default())
            .unwrap();
        assert_eq!(sink.writers.len(), 1);
    }

    #[tokio::test]
    async fn missing_filepath_fails_registration() {
        let config = LoggingConfig {
            engine: ENGINE.to_string(),
            ..LoggingConfig::default()
        };
        let mut sink = FileSink::new();
        let err = sink
            .register_config(&config, &DefaultLoggerConfig::default())
            .unwrap_err();
        assert!(matches!(err, SinkError::Register { .. }));
    }

    #[tokio::test]
    async fn written_bytes_land_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.log");
        let config = file_config(path.to_str().unwrap(), 1 << 20, 1);

        let mut sink = FileSink::new();
        sink.register_config(&config, &DefaultLoggerConfig::default())
            .unwrap();
        sink.submit(message(&config, "hello\n")).await;
        sink.submit(message(&config, "world\n")).await;
        sink.shutdown().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "hello\nworld\n");
    }
}
