use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::lifecycle::state::DaemonState;
use crate::log_store::LogStore;
use crate::process_table::ProcessTable;
use crate::reconciler::Reconciler;

/// One poll cycle: open the store for appending, reconcile a fresh snapshot,
/// close the store. The handle is closed even when reconciliation fails.
pub fn run_cycle<P: ProcessTable>(
    reconciler: &mut Reconciler,
    table: &mut P,
    store: &LogStore,
) -> Result<usize> {
    let mut appender = store.open_appender()?;
    let reconciled = table
        .snapshot()
        .context("Failed to read the process table")
        .and_then(|snapshot| Ok(reconciler.reconcile(&snapshot, &mut appender)?));
    let closed = appender.close();

    let recorded = reconciled?;
    closed?;
    Ok(recorded)
}

/// Runs poll cycles until the state is stopped.
///
/// Stopping takes effect between cycles: a cycle in progress always
/// finishes, the sleep that follows is cut short.
pub async fn monitor<P: ProcessTable>(
    state: &DaemonState,
    reconciler: &mut Reconciler,
    table: &mut P,
    store: &LogStore,
    interval: Duration,
) -> Result<()> {
    let cancellation_token = state.cancellation_token();
    let mut cycles: u64 = 0;

    while state.is_running() {
        let recorded = run_cycle(reconciler, table, store)?;
        cycles += 1;
        if recorded > 0 {
            debug!(
                "Cycle {}: recorded {} new processes ({} known)",
                cycles,
                recorded,
                reconciler.identities().len()
            );
        }

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("Poll loop cancelled");
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(
        "Poll loop stopped after {} cycles, {} identities known",
        cycles,
        reconciler.identities().len()
    );
    Ok(())
}
