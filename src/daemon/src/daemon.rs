use std::sync::Arc;

use anyhow::Result;
use proclog_common::config_manager::Config;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle::signals::{ignore_fault_signals, release_stop_signals, SignalListener};
use crate::lifecycle::{DaemonState, PidFileLock};
use crate::log_store::LogStore;
use crate::poll_loop::monitor;
use crate::process_table::{ProcessTable, SysinfoProcessTable};
use crate::reconciler::Reconciler;

/// Runs the daemon on the host process table until SIGINT or SIGTERM.
///
/// The pid file, if any, is released on every way out, including errors.
#[tokio::main(flavor = "current_thread")]
pub async fn run(config: Config, pid_lock: Option<PidFileLock>) -> Result<()> {
    let state = Arc::new(DaemonState::new(pid_lock));
    serve(state, &config, SysinfoProcessTable::new()).await
}

pub async fn serve<P: ProcessTable>(
    state: Arc<DaemonState>,
    config: &Config,
    mut table: P,
) -> Result<()> {
    let installed = SignalListener::install().and_then(|listener| {
        release_stop_signals()?;
        Ok(listener)
    });
    let result = match installed {
        Ok(listener) => {
            let listener = listener.spawn(state.clone());
            let result = record_processes(&state, config, &mut table).await;
            state.cancellation_token().cancel();
            join_listener(listener).await;
            result
        }
        Err(e) => Err(e),
    };

    state.release_pid_lock().await;
    result
}

async fn join_listener(listener: JoinHandle<()>) {
    if let Err(e) = listener.await {
        warn!("Signal listener ended abnormally: {}", e);
    }
}

async fn record_processes<P: ProcessTable>(
    state: &DaemonState,
    config: &Config,
    table: &mut P,
) -> Result<()> {
    ignore_fault_signals(&config.ignored_fault_signals)?;

    let store = LogStore::new(&config.log_store_path);
    store.ensure_exists()?;
    let (mut reconciler, _) =
        Reconciler::bootstrap(&store, config.identity_capacity, config.field_limits())?;

    info!(
        "Recording new processes to {} every {:?}",
        store.path().display(),
        config.poll_interval()
    );
    monitor(
        state,
        &mut reconciler,
        table,
        &store,
        config.poll_interval(),
    )
    .await
}
