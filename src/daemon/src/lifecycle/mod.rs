//! Startup and teardown around the poll loop: detaching from the terminal,
//! the single-instance pid file, signal dispositions and the shared
//! [`DaemonState`].

pub mod detach;
pub mod pid_lock;
pub mod signals;
pub mod state;

pub use detach::{detach, Detached};
pub use pid_lock::PidFileLock;
pub use state::DaemonState;
