//! # Supervisor: drives init and main processes and the tumble cascade.
//!
//! The supervisor owns the process lists and the shared exit-state record.
//! Init processes run strictly one after another and must each exit 0;
//! main processes are spawned in list order but run concurrently.
//!
//! ## Architecture
//! ```text
//! run_inits() ──► Process(init 1) ──► Process(init 2) ──► ...
//!                                   (each must exit 0)
//! run_mains() ──► supervising task per main
//!                     ├──► run ──► restart loop ──► terminal ExitState
//!                     └──► tumble ──► terminator ──► replicator.send(TERM)
//! ```
//!
//! ## Rules
//! - Any main exiting — exit code 0 included — tumbles the stack: the
//!   remaining mains receive SIGTERM. Siblings are never left running.
//! - Tumble signals during an ongoing shutdown are coalesced.
//! - `exit_states` is append-only behind a mutex and only ever exposed as
//!   a snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use crate::config::ProcessesConfig;
use crate::error::ProcessError;
use crate::internal::InternalLogger;
use crate::logging::LogManager;
use crate::process::{ExitState, Process, ProcessKind};
use crate::replicator::SignalReplicator;

pub struct Supervisor {
    processes: ProcessesConfig,
    manager: Arc<LogManager>,
    pmlogger: InternalLogger,
    replicator: SignalReplicator,
    exit_states: Arc<Mutex<Vec<ExitState>>>,
    tumble: mpsc::Sender<()>,
    mains_started: Arc<AtomicBool>,
}

impl Supervisor {
    /// Creates the supervisor and spawns its terminator task.
    pub fn new(
        processes: ProcessesConfig,
        manager: Arc<LogManager>,
        pmlogger: InternalLogger,
        replicator: SignalReplicator,
    ) -> Self {
        let (tumble_tx, mut tumble_rx) = mpsc::channel::<()>(1);
        let mains_started = Arc::new(AtomicBool::new(false));

        // The terminator: the first tumble starts the shutdown cascade,
        // later ones are the expected noise of processes turning off.
        pmlogger.debug("starting terminator task for when tumble signals arrive");
        {
            let replicator = replicator.clone();
            let mains_started = Arc::clone(&mains_started);
            tokio::spawn(async move {
                let mut shutting_down = false;
                while tumble_rx.recv().await.is_some() {
                    if shutting_down {
                        continue;
                    }
                    shutting_down = true;
                    if mains_started.load(Ordering::SeqCst) {
                        replicator.send(Signal::SIGTERM);
                    }
                }
            });
        }

        Self {
            processes,
            manager,
            pmlogger,
            replicator,
            exit_states: Arc::new(Mutex::new(Vec::new())),
            tumble: tumble_tx,
            mains_started,
        }
    }

    /// Runs the init processes strictly in order. Each must exit 0 before
    /// the next spawns; the first failure tumbles the stack and aborts.
    pub async fn run_inits(&self) -> Result<(), ProcessError> {
        self.pmlogger.std("starting init processes");
        for spec in &self.processes.init_processes {
            let name = spec.name.clone();
            self.pmlogger
                .debug(format!("attempting to run {}", spec.command));

            let process = Arc::new(Process::new(
                spec.clone(),
                self.replicator.clone(),
                Arc::clone(&self.manager),
                self.pmlogger.clone(),
            ));
            process.setup().await;
            let (state, ok) = Arc::clone(&process).run(ProcessKind::Init).await;
            process.release().await;
            self.pmlogger
                .debug(format!("finished running {}", spec.command));

            let reason = state
                .runtime_error
                .clone()
                .unwrap_or_else(|| format!("exit status {}", state.exit_code));
            self.push_exit_state(state);

            if !ok {
                self.pmlogger
                    .debug("the last init command failed, stack will now tumble");
                let _ = self.tumble.try_send(());
                return Err(ProcessError::Init { name, reason });
            }
        }
        Ok(())
    }

    /// Spawns every main process in list order and supervises them
    /// concurrently. The returned channel delivers one JSON report of all
    /// exit states once the last supervising task finishes, then closes.
    pub async fn run_mains(&self) -> mpsc::Receiver<String> {
        self.pmlogger.std("starting main processes");

        let mut supervising = Vec::new();
        for spec in &self.processes.main_processes {
            self.pmlogger
                .debug(format!("adding {} to the list of main processes", spec.command));
            let process = Arc::new(Process::new(
                spec.clone(),
                self.replicator.clone(),
                Arc::clone(&self.manager),
                self.pmlogger.clone(),
            ));
            process.setup().await;
            self.mains_started.store(true, Ordering::SeqCst);

            let exit_states = Arc::clone(&self.exit_states);
            let tumble = self.tumble.clone();
            let pmlogger = self.pmlogger.clone();
            supervising.push(tokio::spawn(async move {
                let (mut state, mut ok) = Arc::clone(&process).run(ProcessKind::Main).await;
                while !ok && process.restart_allowed().await {
                    pmlogger.std(format!("restarting failed process {}", process.name()));
                    process.setup().await;
                    let (next_state, next_ok) = Arc::clone(&process).run(ProcessKind::Main).await;
                    state = next_state;
                    ok = next_ok;
                    if !ok {
                        process.note_failed_restart().await;
                    }
                }

                process.release().await;
                pmlogger.debug(format!("{} has terminated", process.name()));
                exit_states
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(state);
                let _ = tumble.try_send(());
            }));
        }

        let (report_tx, report_rx) = mpsc::channel(1);
        let exit_states = Arc::clone(&self.exit_states);
        let pmlogger = self.pmlogger.clone();
        tokio::spawn(async move {
            for task in supervising {
                let _ = task.await;
            }
            pmlogger.debug("all main supervising tasks are done");
            let snapshot = exit_states
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            let report = match serde_json::to_string(&snapshot) {
                Ok(json) => json,
                Err(e) => {
                    pmlogger.debug(format!("error generating end state: {e}"));
                    String::new()
                }
            };
            let _ = report_tx.send(report).await;
        });

        report_rx
    }

    /// A snapshot of the exit states recorded so far, in recording order.
    pub fn exit_states(&self) -> Vec<ExitState> {
        self.exit_states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The snapshot rendered the same way as the final report.
    pub fn exit_states_json(&self) -> String {
        serde_json::to_string(&self.exit_states()).unwrap_or_default()
    }

    fn push_exit_state(&self, state: ExitState) {
        self.exit_states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
    }
}
