//! # Per-engine queuing and forwarding of log messages.
//!
//! The [`LogManager`] owns a bounded queue per active engine and one
//! forwarder task per queue. Producers (pipe scanners, the internal logger)
//! call [`submit`](LogManager::submit) and never block: a full queue means
//! the message is dropped and one diagnostic line goes to stderr.
//!
//! ## Architecture
//! ```text
//! submit(msg)
//!     │ try_send, keyed by msg.config.engine
//!     ├──► [queue "console"] ──► forwarder ──► ConsoleSink::submit
//!     │        (cap 100)            └── on close: drain, Sink::shutdown
//!     ├──► [queue "syslog"]  ──► forwarder ──► SyslogSink::submit
//!     └──► [queue "logfile"] ──► forwarder ──► FileSink::submit
//! ```
//!
//! ## Rules
//! - Per-engine FIFO: each queue has a single consumer, so a sink sees its
//!   messages in submission order. No ordering across engines.
//! - A message is enqueued for exactly one sink, or dropped and counted;
//!   never duplicated.
//! - Shutdown sets `terminated` **before** closing the queues, so no
//!   forwarder can observe a closed queue while producers still believe the
//!   manager is live. Anything submitted afterwards is silently dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{DefaultLoggerConfig, LoggingConfig, ProcessesConfig};
use crate::error::SinkError;
use crate::logging::message::LogMessage;
use crate::logging::sink::{builtin_sinks, Sink};

/// How many messages can queue per engine before we start dropping.
const QUEUE_CAPACITY: usize = 100;

/// Routes submitted messages to the sinks their configs name.
pub struct LogManager {
    defaults: DefaultLoggerConfig,
    /// Compiled-in sinks not yet activated. Drained by `start`.
    available: HashMap<String, Box<dyn Sink>>,
    /// Engines that have at least one registered config, activation order.
    active: Vec<String>,
    queues: RwLock<HashMap<String, mpsc::Sender<LogMessage>>>,
    forwarders: Mutex<Vec<(String, JoinHandle<Result<(), SinkError>>)>>,
    terminated: AtomicBool,
}

impl LogManager {
    /// Creates a manager with every compiled-in sink available but nothing
    /// active yet.
    pub fn new(defaults: DefaultLoggerConfig) -> Self {
        Self {
            defaults,
            available: builtin_sinks(),
            active: Vec::new(),
            queues: RwLock::new(HashMap::new()),
            forwarders: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Registers every referenced logging config, then brings the active
    /// sinks up and spawns their forwarders.
    ///
    /// Referenced means: the supervisor's own config plus the config of
    /// every init and main process. Unknown engines and sink registration
    /// or start failures abort the whole startup.
    pub async fn start(
        &mut self,
        processes: &ProcessesConfig,
        pm_config: &LoggingConfig,
    ) -> Result<(), SinkError> {
        // If we can't log for ourselves there is no point carrying on.
        self.register(pm_config)?;
        for proc in processes
            .init_processes
            .iter()
            .chain(processes.main_processes.iter())
        {
            self.register(&proc.logging_config)?;
        }

        for engine in std::mem::take(&mut self.active) {
            let Some(mut sink) = self.available.remove(&engine) else {
                continue;
            };
            sink.start().await?;

            let (tx, mut rx) = mpsc::channel::<LogMessage>(QUEUE_CAPACITY);
            let handle = tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    sink.submit(msg).await;
                }
                // Queue closed and drained; the sink flushes on its way out.
                sink.shutdown().await
            });

            self.queues
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(engine.clone(), tx);
            self.forwarders
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((engine, handle));
        }

        Ok(())
    }

    fn register(&mut self, config: &LoggingConfig) -> Result<(), SinkError> {
        let sink = self
            .available
            .get_mut(&config.engine)
            .ok_or_else(|| SinkError::UnknownEngine {
                name: config.engine.clone(),
            })?;
        sink.register_config(config, &self.defaults)?;
        if !self.active.contains(&config.engine) {
            self.active.push(config.engine.clone());
        }
        Ok(())
    }

    /// Queues a message for its engine. Never blocks: a full queue drops
    /// the message with one stderr diagnostic, and anything submitted after
    /// shutdown is discarded silently.
    pub fn submit(&self, msg: LogMessage) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }

        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        match queues.get(&msg.config.engine) {
            Some(queue) => match queue.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    eprintln!(
                        "can't log to {} because it is overflowing with logs. log is from: {}",
                        msg.config.engine, msg.source
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            },
            None => {
                eprintln!(
                    "no queue for logging engine {}. log is from: {}",
                    msg.config.engine, msg.source
                );
            }
        }
    }

    /// Stops accepting messages, drains every queue, shuts every sink down,
    /// and returns whatever went wrong on the way.
    pub async fn shutdown(&self) -> Vec<SinkError> {
        // Terminated must be visible before any queue closes.
        self.terminated.store(true, Ordering::SeqCst);
        self.queues
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let handles = std::mem::take(
            &mut *self.forwarders.lock().unwrap_or_else(|e| e.into_inner()),
        );
        let (engines, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();

        let mut errors = Vec::new();
        for (engine, joined) in engines.into_iter().zip(futures::future::join_all(joins).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(join_err) => errors.push(SinkError::Shutdown {
                    engine,
                    reason: format!("forwarder task failed: {join_err}"),
                }),
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::message::Pipe;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn devnull_config() -> LoggingConfig {
        LoggingConfig {
            engine: "devnull".to_string(),
            process_name: "test".to_string(),
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

    #[tokio::test]
    async fn unknown_engine_fails_start() {
        let mut manager = LogManager::new(DefaultLoggerConfig::default());
        let config = LoggingConfig {
            engine: "nonexistent".to_string(),
            ..LoggingConfig::default()
        };
        let err = manager
            .start(&ProcessesConfig::default(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::UnknownEngine { name } if name == "nonexistent"));
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_silently_dropped() {
        let mut manager = LogManager::new(DefaultLoggerConfig::default());
        manager
            .start(&ProcessesConfig::default(), &devnull_config())
            .await
            .unwrap();

        let errors = manager.shutdown().await;
        assert!(errors.is_empty());

        // No panic, no effect.
        manager.submit(message(&devnull_config(), "late\n"));
    }

    /// Sink whose submit never completes, for backpressure tests.
    struct StuckSink {
        accepted: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Sink for StuckSink {
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

        async fn submit(&mut self, _msg: LogMessage) {
            self.accepted.fetch_add(1, Ordering::SeqCst);
            // Block forever.
            std::future::pending::<()>().await;
        }

        async fn shutdown(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking_producers() {
        let accepted = Arc::new(AtomicUsize::new(0));
        let mut manager = LogManager::new(DefaultLoggerConfig::default());
        manager.available.insert(
            "stuck".to_string(),
            Box::new(StuckSink {
                accepted: Arc::clone(&accepted),
            }),
        );

        let config = LoggingConfig {
            engine: "stuck".to_string(),
            process_name: "spammer".to_string(),
            ..LoggingConfig::default()
        };
        manager
            .start(&ProcessesConfig::default(), &config)
            .await
            .unwrap();

        // Spam far past the queue capacity; none of these calls may block
        // even though the sink never finishes a single submit.
        let flood = 10_000;
        let started = std::time::Instant::now();
        for i in 0..flood {
            manager.submit(message(&config, &format!("line {i}\n")));
        }
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "producers were throttled by a stuck sink"
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        // At most: one in the sink's hands plus a full queue behind it.
        let queued = manager
            .queues
            .read()
            .unwrap()
            .get("stuck")
            .map(|q| q.max_capacity() - q.capacity())
            .unwrap_or(0);
        assert!(queued <= 100, "queue held {queued} messages");
        assert!(accepted.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn one_queue_per_engine_even_with_many_configs() {
        let mut manager = LogManager::new(DefaultLoggerConfig::default());
        let processes = ProcessesConfig {
            main_processes: vec![
                crate::config::ProcessSpec {
                    name: "a".to_string(),
                    command: "/bin/a".to_string(),
                    logging_config: devnull_config(),
                    ..crate::config::ProcessSpec::default()
                },
                crate::config::ProcessSpec {
                    name: "b".to_string(),
                    command: "/bin/b".to_string(),
                    logging_config: devnull_config(),
                    ..crate::config::ProcessSpec::default()
                },
            ],
            ..ProcessesConfig::default()
        };
        manager
            .start(&processes, &devnull_config())
            .await
            .unwrap();

        assert_eq!(manager.queues.read().unwrap().len(), 1);
        assert_eq!(manager.forwarders.lock().unwrap().len(), 1);
    }
}
