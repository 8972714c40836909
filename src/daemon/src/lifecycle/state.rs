use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::pid_lock::PidFileLock;

/// State shared between the poll loop and the signal listener.
///
/// The loop only reads the running flag; stopping is requested from the
/// outside through [`DaemonState::stop`].
pub struct DaemonState {
    cancellation_token: CancellationToken,
    pid_lock: Mutex<Option<PidFileLock>>,
}

impl DaemonState {
    pub fn new(pid_lock: Option<PidFileLock>) -> Self {
        Self {
            cancellation_token: CancellationToken::new(),
            pid_lock: Mutex::new(pid_lock),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Releases the pid file, then flips the state to stopped.
    pub async fn stop(&self) {
        self.release_pid_lock().await;
        self.cancellation_token.cancel();
    }

    /// Unlocks and deletes the pid file if it is still held. Safe to call
    /// more than once.
    pub async fn release_pid_lock(&self) {
        let Some(lock) = self.pid_lock.lock().await.take() else {
            return;
        };
        let path = lock.path().to_path_buf();
        match lock.release() {
            Ok(()) => info!("Removed pid file {}", path.display()),
            Err(e) => warn!("{:#}", e),
        }
    }

    pub async fn holds_pid_lock(&self) -> bool {
        self.pid_lock.lock().await.is_some()
    }
}
