//! # A single supervised child process.
//!
//! [`Process`] owns everything about one config entry: spawning, the pipe
//! scanners that feed the log manager, the signal relay into the child, the
//! forced-termination timer, and the restart bookkeeping.
//!
//! ## Architecture
//! ```text
//! setup() ──► signal inbox registered with the replicator
//! run() ──► spawn child
//!     ├──► scanner(stdout) ──► LogManager::submit
//!     ├──► scanner(stderr) ──► LogManager::submit
//!     ├──► relay: inbox ──► kill(pid, sig)
//!     │        └── INT/TERM: block restarts, arm one-shot SIGKILL timer
//!     └──► child.wait() ──► exited, relay cancelled, pipes closed, ExitState
//! ```
//!
//! ## Rules
//! - `run` may be called again only for a main process, only after a
//!   failing run with restarts still allowed, and only after a fresh
//!   `setup`. Re-arming never overlaps a live child.
//! - The relay is cancelled right after `exited` is published so restarted
//!   processes never leak relay tasks.
//! - The SIGKILL timer is armed at most once per run and fires only if the
//!   child is still running when it expires.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{LoggingConfig, ProcessSpec};
use crate::internal::InternalLogger;
use crate::logging::{LogManager, LogMessage, Pipe};
use crate::replicator::{SignalReplicator, SubscriberId};

/// Whether a process belongs to the init sequence or the main set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    Init,
    Main,
}

/// Terminal record of one supervised run, serialized into the final
/// exit-state report.
#[derive(Debug, Clone, Serialize)]
pub struct ExitState {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProcessKind,
    #[serde(rename = "runtime_error", skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    pub exit_code: i32,
}

/// Mutable per-process state, readers in shared mode.
struct ProcessState {
    exited: bool,
    exit_code: i32,
    /// Count of failing restarts; the first run is not a restart.
    restart_counter: i32,
    /// Latched once INT or TERM was relayed; no restart after that.
    block_restarts: bool,
    /// Run attempts so far; the start delay applies to the first only.
    runs: u32,
    /// A failed `kill` degraded to a warning on the exit state.
    signal_warning: Option<String>,
    inbox: Option<mpsc::Receiver<Signal>>,
    subscriber: Option<SubscriberId>,
}

/// One supervised child process.
pub struct Process {
    spec: ProcessSpec,
    replicator: SignalReplicator,
    manager: Arc<LogManager>,
    pmlogger: InternalLogger,
    state: RwLock<ProcessState>,
}

impl Process {
    pub fn new(
        spec: ProcessSpec,
        replicator: SignalReplicator,
        manager: Arc<LogManager>,
        pmlogger: InternalLogger,
    ) -> Self {
        Self {
            spec,
            replicator,
            manager,
            pmlogger,
            state: RwLock::new(ProcessState {
                exited: false,
                exit_code: 0,
                restart_counter: 0,
                block_restarts: false,
                runs: 0,
                signal_warning: None,
                inbox: None,
                subscriber: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Arms the process for a run: a fresh capacity-1 signal inbox is
    /// registered with the replicator, replacing any previous registration.
    /// Idempotent; must be called between any two `run`s.
    pub async fn setup(&self) {
        let mut state = self.state.write().await;
        if let Some(old) = state.subscriber.take() {
            self.replicator.remove(old);
        }
        let (tx, rx) = mpsc::channel(1);
        state.subscriber = Some(self.replicator.register(tx));
        state.inbox = Some(rx);
        state.exited = false;
        state.signal_warning = None;
    }

    /// Drops the replicator registration. Called exactly once per process,
    /// at terminal exit.
    pub async fn release(&self) {
        let mut state = self.state.write().await;
        if let Some(id) = state.subscriber.take() {
            self.replicator.remove(id);
        }
        state.inbox = None;
    }

    /// Whether the restart policy permits another run after a failure.
    pub async fn restart_allowed(&self) -> bool {
        let state = self.state.read().await;
        !state.block_restarts
            && self.spec.restart_count > 0
            && state.restart_counter < self.spec.restart_count
    }

    /// Records that a restart also failed.
    pub async fn note_failed_restart(&self) {
        self.state.write().await.restart_counter += 1;
    }

    /// Spawns the child and blocks until it is gone, returning its exit
    /// state and whether the run counts as a success.
    pub async fn run(self: Arc<Self>, kind: ProcessKind) -> (ExitState, bool) {
        let first_run = {
            let mut state = self.state.write().await;
            state.runs += 1;
            state.runs == 1
        };
        if first_run && self.spec.start_delay_seconds > 0 {
            self.pmlogger.std(format!(
                "process {} is configured for delayed start of {} seconds",
                self.spec.name, self.spec.start_delay_seconds
            ));
            tokio::time::sleep(Duration::from_secs(self.spec.start_delay_seconds)).await;
        }

        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut state = self.state.write().await;
                state.exited = true;
                state.exit_code = 1;
                return (
                    ExitState {
                        name: self.spec.name.clone(),
                        kind,
                        runtime_error: Some(format!(
                            "failed to spawn {}: {e}",
                            self.spec.command
                        )),
                        exit_code: 1,
                    },
                    false,
                );
            }
        };
        self.pmlogger
            .debug(format!("started {}", self.spec.command));

        let mut scanners = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            scanners.push(tokio::spawn(scan_pipe(
                stdout,
                Pipe::Out,
                self.spec.logging_config.clone(),
                Arc::clone(&self.manager),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            // combine_output folds stderr into the stdout tag.
            let tag = if self.spec.combine_output {
                Pipe::Out
            } else {
                Pipe::Err
            };
            scanners.push(tokio::spawn(scan_pipe(
                stderr,
                tag,
                self.spec.logging_config.clone(),
                Arc::clone(&self.manager),
            )));
        }

        let pid = child.id().map(|raw| Pid::from_raw(raw as i32));
        let relay_token = CancellationToken::new();
        let inbox = self.state.write().await.inbox.take();
        let relay = inbox.map(|inbox| {
            tokio::spawn(Arc::clone(&self).relay_signals(pid, inbox, relay_token.clone()))
        });

        // The waiter: the child is reaped exactly once, right here.
        let wait_result = child.wait().await;

        self.state.write().await.exited = true;
        relay_token.cancel();
        if let Some(relay) = relay {
            let _ = relay.await;
        }
        // Force the pipes closed rather than waiting for EOF: a grandchild
        // that inherited them can keep the write ends open indefinitely.
        for scanner in scanners {
            scanner.abort();
            let _ = scanner.await;
        }

        let (exit_code, mut runtime_error) = translate_wait(&wait_result);
        {
            let mut state = self.state.write().await;
            state.exit_code = exit_code;
            if runtime_error.is_none() {
                runtime_error = state.signal_warning.take();
            }
        }

        let ok = exit_code == 0 && wait_result.is_ok();
        (
            ExitState {
                name: self.spec.name.clone(),
                kind,
                runtime_error,
                exit_code,
            },
            ok,
        )
    }

    /// Relay loop: forwards inbox signals to the child and handles the
    /// termination-timeout escalation.
    async fn relay_signals(
        self: Arc<Self>,
        pid: Option<Pid>,
        mut inbox: mpsc::Receiver<Signal>,
        token: CancellationToken,
    ) {
        let mut kill_timer_armed = false;
        loop {
            let sig = tokio::select! {
                _ = token.cancelled() => break,
                received = inbox.recv() => match received {
                    Some(sig) => sig,
                    None => break,
                },
            };

            self.pmlogger.std(format!(
                "got signal {sig}, forwarding onto {}",
                self.spec.name
            ));
            if let Some(pid) = pid {
                if let Err(e) = signal::kill(pid, sig) {
                    // The child may already be on its way out; record the
                    // failure as a warning on the exit state and move on.
                    let warning = format!(
                        "failed to send signal {sig} to running instance of {}: {e}",
                        self.spec.command
                    );
                    self.pmlogger.err(warning.clone());
                    self.state.write().await.signal_warning = Some(warning);
                }
            }

            if matches!(sig, Signal::SIGINT | Signal::SIGTERM) {
                self.state.write().await.block_restarts = true;
                if !kill_timer_armed {
                    kill_timer_armed = true;
                    Arc::clone(&self).spawn_kill_timer(pid);
                }
            }
        }
    }

    /// One-shot escalation: if the child outlives its termination timeout
    /// after an INT/TERM, it gets a SIGKILL.
    fn spawn_kill_timer(self: Arc<Self>, pid: Option<Pid>) {
        let this = self;
        let timeout = this.spec.termination_timeout_seconds.max(0) as u64;
        this.pmlogger.debug(format!(
            "starting forceful termination timer for {}",
            this.spec.name
        ));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout)).await;
            if this.state.read().await.exited {
                return;
            }
            this.pmlogger.std(format!(
                "forcefully killing process {} because termination timeout has been reached",
                this.spec.name
            ));
            if let Some(pid) = pid {
                let _ = signal::kill(pid, Signal::SIGKILL);
            }
        });
    }
}

/// Turns the OS wait outcome into an exit code plus optional error text.
///
/// A platform exit status is taken as-is with -1 coerced to 1; a child that
/// died on a signal reports the signal number; a clean wait with no status
/// is 0; a failed wait call is 1.
fn translate_wait(
    result: &std::io::Result<std::process::ExitStatus>,
) -> (i32, Option<String>) {
    use std::os::unix::process::ExitStatusExt;

    match result {
        Ok(status) => {
            if let Some(code) = status.code() {
                let code = if code == -1 { 1 } else { code };
                if code == 0 {
                    (0, None)
                } else {
                    (code, Some(format!("exit status {code}")))
                }
            } else if let Some(sig) = status.signal() {
                (sig, Some(format!("terminated by signal {sig}")))
            } else {
                (1, Some("could not determine exit status".to_string()))
            }
        }
        Err(e) => (1, Some(format!("wait failed: {e}"))),
    }
}

/// Reads one pipe line by line and hands each line to the log manager
/// under the process's logging config. Runs until EOF or until the waiter
/// aborts it after reaping the child.
async fn scan_pipe<R>(pipe: R, tag: Pipe, config: LoggingConfig, manager: Arc<LogManager>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                manager.submit(LogMessage {
                    source: config.process_name.clone(),
                    pipe: tag,
                    config: config.clone(),
                    message: format!("{line}\n"),
                });
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_from_raw(raw: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(raw)
    }

    #[test]
    fn clean_exit_translates_to_zero() {
        let (code, err) = translate_wait(&Ok(status_from_raw(0)));
        assert_eq!(code, 0);
        assert!(err.is_none());
    }

    #[test]
    fn nonzero_exit_carries_code_and_error() {
        // Raw wait status: exit code lives in the high byte.
        let (code, err) = translate_wait(&Ok(status_from_raw(3 << 8)));
        assert_eq!(code, 3);
        assert_eq!(err.as_deref(), Some("exit status 3"));
    }

    #[test]
    fn signal_death_reports_signal_number() {
        // Raw wait status: termination signal lives in the low bits.
        let (code, err) = translate_wait(&Ok(status_from_raw(9)));
        assert_eq!(code, 9);
        assert!(err.unwrap().contains("signal 9"));
    }

    #[test]
    fn wait_error_is_exit_code_one() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let (code, err) = translate_wait(&Err(io_err));
        assert_eq!(code, 1);
        assert!(err.unwrap().contains("boom"));
    }

    #[test]
    fn exit_state_serializes_with_expected_keys() {
        let state = ExitState {
            name: "web".to_string(),
            kind: ProcessKind::Main,
            runtime_error: None,
            exit_code: 0,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"name":"web","type":"main","exit_code":0}"#);

        let failed = ExitState {
            name: "mig".to_string(),
            kind: ProcessKind::Init,
            runtime_error: Some("exit status 2".to_string()),
            exit_code: 2,
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains(r#""type":"init""#));
        assert!(json.contains(r#""runtime_error":"exit status 2""#));
    }
}
