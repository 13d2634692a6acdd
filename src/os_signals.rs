//! OS signal capture for the supervisor.
//!
//! This module provides a single helper [`spawn_signal_forwarder`] that
//! subscribes to the signal set the supervisor cares about and pushes every
//! received signal into the [`SignalReplicator`] for fan-out.
//!
//! The handled set is:
//! - **SIGINT** (Ctrl-C in terminal)
//! - **SIGTERM** (default kill signal, used by container runtimes)
//! - **SIGHUP** (often sent on controlling-terminal loss)
//!
//! Signals can come from outside (the daemon running the container) or from
//! inside (the supervisor's own tumble cascade re-injects SIGTERM directly
//! into the replicator, bypassing this loop).

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::replicator::SignalReplicator;

/// Spawns the task that forwards received OS signals into the replicator.
///
/// The task runs for the life of the program. Errors are only possible while
/// installing the handlers, which happens before the task is spawned.
pub fn spawn_signal_forwarder(replicator: SignalReplicator) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                _ = sigint.recv() => Signal::SIGINT,
                _ = sigterm.recv() => Signal::SIGTERM,
                _ = sighup.recv() => Signal::SIGHUP,
            };
            replicator.send(sig);
        }
    });

    Ok(())
}
