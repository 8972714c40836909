use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

const PID_FILE_MODE: u32 = 0o640;

/// Exclusive advisory lock on the pid file, held for the life of the daemon.
///
/// The lock rather than the file's existence decides whether another instance
/// is running, so a file left behind by a crash does not block a restart.
pub struct PidFileLock {
    path: PathBuf,
    file: Flock<File>,
}

impl fmt::Debug for PidFileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidFileLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PidFileLock {
    /// Creates and locks `path`, then writes the current pid into it.
    ///
    /// The file is only truncated once the lock is held, so a losing
    /// instance leaves the running daemon's pid untouched.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(PID_FILE_MODE)
            .open(path)
            .with_context(|| format!("Failed to open pid file {}", path.display()))?;

        let mut file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => file,
            Err((_, Errno::EWOULDBLOCK)) => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                return Err(anyhow!(
                    "Pid file {} is locked by another running instance (pid {})",
                    path.display(),
                    holder.trim()
                ));
            }
            Err((_, errno)) => {
                return Err(anyhow!(errno))
                    .with_context(|| format!("Failed to lock pid file {}", path.display()));
            }
        };

        file.set_len(0)
            .and_then(|_| file.write_all(format!("{}\n", std::process::id()).as_bytes()))
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;

        debug!("Locked pid file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlocks the pid file, then deletes it.
    pub fn release(self) -> Result<()> {
        let Self { path, file } = self;
        let file = file
            .unlock()
            .map_err(|(_, errno)| anyhow!(errno))
            .with_context(|| format!("Failed to unlock pid file {}", path.display()))?;
        drop(file);

        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove pid file {}", path.display()))?;
        debug!("Released pid file {}", path.display());
        Ok(())
    }
}
