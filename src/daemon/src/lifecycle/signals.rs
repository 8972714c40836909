use std::sync::Arc;

use anyhow::{Context, Result};
use nix::sys::signal::{self as nix_signal, SigHandler, SigSet, Signal};
use proclog_common::config_manager::FaultSignal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lifecycle::state::DaemonState;

fn fault_signal(fault: FaultSignal) -> Signal {
    match fault {
        FaultSignal::IllegalInstruction => Signal::SIGILL,
        FaultSignal::FloatingPoint => Signal::SIGFPE,
        FaultSignal::SegmentationViolation => Signal::SIGSEGV,
    }
}

/// Sets the listed fault signals to be ignored. Anything not listed keeps
/// the default, fatal disposition.
pub fn ignore_fault_signals(faults: &[FaultSignal]) -> Result<()> {
    for &fault in faults {
        let sig = fault_signal(fault);
        // SAFETY: SigIgn installs no handler code in this process.
        unsafe { nix_signal::signal(sig, SigHandler::SigIgn) }
            .with_context(|| format!("Failed to ignore {}", sig))?;
        warn!("{} will be ignored", sig);
    }
    Ok(())
}

fn stop_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set
}

/// Keeps SIGINT and SIGTERM pending on the calling thread until
/// [`release_stop_signals`]. Covers the window between taking the pid file
/// and [`SignalListener::install`], where the default disposition would
/// kill the process and leave the pid file behind.
pub fn hold_stop_signals() -> Result<()> {
    stop_signals()
        .thread_block()
        .context("Failed to block SIGINT and SIGTERM")
}

/// Delivers any stop signal held back by [`hold_stop_signals`].
pub fn release_stop_signals() -> Result<()> {
    stop_signals()
        .thread_unblock()
        .context("Failed to unblock SIGINT and SIGTERM")
}

fn restore_default(sig: Signal) {
    // SAFETY: SigDfl hands the signal back to the kernel's default action.
    if let Err(e) = unsafe { nix_signal::signal(sig, SigHandler::SigDfl) } {
        warn!("Failed to restore default disposition of {}: {}", sig, e);
    }
}

/// Signal streams the daemon reacts to. Registration needs a running tokio
/// runtime; the streams are then drained by [`SignalListener::spawn`].
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    child: tokio::signal::unix::Signal,
}

impl SignalListener {
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to watch SIGINT")?,
            terminate: signal(SignalKind::terminate()).context("Failed to watch SIGTERM")?,
            hangup: signal(SignalKind::hangup()).context("Failed to watch SIGHUP")?,
            child: signal(SignalKind::child()).context("Failed to watch SIGCHLD")?,
        })
    }

    pub fn spawn(self, state: Arc<DaemonState>) -> JoinHandle<()> {
        tokio::spawn(self.listen(state))
    }

    /// SIGINT and SIGTERM stop the daemon: the delivered signal gets its
    /// default disposition back (a second one kills immediately), the pid file
    /// is released and the state flips to stopped. SIGHUP and SIGCHLD are
    /// only logged.
    async fn listen(mut self, state: Arc<DaemonState>) {
        let token = state.cancellation_token();
        loop {
            let stop_signal = tokio::select! {
                _ = token.cancelled() => return,
                Some(()) = self.interrupt.recv() => Signal::SIGINT,
                Some(()) = self.terminate.recv() => Signal::SIGTERM,
                Some(()) = self.hangup.recv() => {
                    debug!("Received SIGHUP, nothing to reload");
                    continue;
                }
                Some(()) = self.child.recv() => {
                    debug!("Received SIGCHLD");
                    continue;
                }
            };

            info!("Received {}, stopping daemon", stop_signal);
            restore_default(stop_signal);
            state.stop().await;
            return;
        }
    }
}
