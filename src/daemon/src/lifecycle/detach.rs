use anyhow::{anyhow, Result};
use daemonize::{Daemonize, Outcome};

pub const WORKING_DIR: &str = "/";
const UMASK: u32 = 0o022;

/// Which side of the detachment the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The invoking process; it should exit successfully right away.
    Parent,
    /// The detached grandchild that carries on as the daemon.
    Daemon,
}

/// Double-forks into the background: new session, working directory `/`,
/// stdin, stdout and stderr pointed at `/dev/null`.
///
/// Must run before any async runtime or thread is started.
pub fn detach() -> Result<Detached> {
    let daemon = Daemonize::new()
        .working_directory(WORKING_DIR)
        .umask(UMASK);

    match daemon.execute() {
        Outcome::Parent(Ok(_)) => Ok(Detached::Parent),
        Outcome::Parent(Err(e)) => Err(anyhow!("Failed to detach from the terminal: {}", e)),
        Outcome::Child(Ok(_)) => Ok(Detached::Daemon),
        Outcome::Child(Err(e)) => Err(anyhow!("Failed to set up the detached process: {}", e)),
    }
}
