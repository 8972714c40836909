use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use proclog_common::types::identity::Identity;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("cannot create or open log store {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read log store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write log store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Identities read back from the store, in file order.
#[derive(Debug, Default)]
pub struct StoredIdentities {
    pub identities: Vec<Identity>,
    /// Lines that did not parse; each one was reported and skipped.
    pub malformed: usize,
}

/// Append-only ledger of every identity ever recorded, one per line:
/// `<pid>:<command>\t\t<user>`.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the store (and its directory) if it is not there yet.
    pub fn ensure_exists(&self) -> Result<(), LogStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.open_error(source))?;
        }
        self.open_for_append().map(drop)
    }

    /// Reads every line of the store. Malformed lines are skipped with a warning.
    pub fn bootstrap(&self) -> Result<StoredIdentities, LogStoreError> {
        let file = File::open(&self.path).map_err(|source| self.open_error(source))?;
        let reader = BufReader::new(file);
        let mut stored = StoredIdentities::default();

        for (index, line) in reader.split(b'\n').enumerate() {
            let line = line.map_err(|source| self.read_error(source))?;
            let line_number = index + 1;
            if line.is_empty() {
                continue;
            }

            let parsed = std::str::from_utf8(&line)
                .map_err(|e| e.to_string())
                .and_then(|line| line.parse::<Identity>().map_err(|e| e.to_string()));
            match parsed {
                Ok(identity) => stored.identities.push(identity),
                Err(reason) => {
                    warn!(
                        "Skipping malformed line {} of {}: {}",
                        line_number,
                        self.path.display(),
                        reason
                    );
                    stored.malformed += 1;
                }
            }
        }

        debug!(
            "Read {} identities from {} ({} malformed)",
            stored.identities.len(),
            self.path.display(),
            stored.malformed
        );
        Ok(stored)
    }

    /// Opens the store for appending. The handle is meant to live for one
    /// poll cycle and be closed with [`LogAppender::close`].
    ///
    /// A last line left without its newline (an interrupted write) is
    /// terminated first, so new lines never get glued onto it.
    pub fn open_appender(&self) -> Result<LogAppender, LogStoreError> {
        let mut file = self.open_for_append()?;
        if !ends_with_newline(&mut file).map_err(|source| self.read_error(source))? {
            warn!("{} ends with an unterminated line", self.path.display());
            file.write_all(b"\n")
                .map_err(|source| LogStoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok(LogAppender {
            writer: BufWriter::new(file),
            path: self.path.clone(),
            written: 0,
        })
    }

    /// Truncates the store to zero entries, creating it when missing.
    pub fn wipe(&self) -> Result<(), LogStoreError> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map(drop)
            .map_err(|source| self.open_error(source))
    }

    fn open_for_append(&self) -> Result<File, LogStoreError> {
        OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.open_error(source))
    }

    fn read_error(&self, source: io::Error) -> LogStoreError {
        LogStoreError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn open_error(&self, source: io::Error) -> LogStoreError {
        LogStoreError::Open {
            path: self.path.clone(),
            source,
        }
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Destination of newly discovered identities.
pub trait IdentitySink {
    fn append(&mut self, identity: &Identity) -> Result<(), LogStoreError>;
}

/// Buffered append handle on the store, scoped to one poll cycle.
pub struct LogAppender {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl LogAppender {
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes buffered lines and syncs them to disk. Returns how many lines
    /// were appended through this handle.
    pub fn close(mut self) -> Result<usize, LogStoreError> {
        self.writer
            .flush()
            .and_then(|_| self.writer.get_ref().sync_data())
            .map_err(|source| LogStoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(self.written)
    }
}

impl IdentitySink for LogAppender {
    fn append(&mut self, identity: &Identity) -> Result<(), LogStoreError> {
        writeln!(self.writer, "{identity}").map_err(|source| LogStoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proclog_common::types::identity::FieldLimits;
    use rstest::rstest;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LogStore {
        LogStore::new(dir.path().join("proclog").join("processes-log"))
    }

    fn identity(pid: u32, command: &str, user: &str) -> Identity {
        Identity::new(pid, command, user, FieldLimits::default())
    }

    #[test]
    fn test_ensure_exists_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.ensure_exists().unwrap();

        assert!(store.path().is_file());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "");
    }

    #[test]
    fn test_ensure_exists_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "1:sh\t\talice\n").unwrap();

        store.ensure_exists().unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "1:sh\t\talice\n");
    }

    #[test]
    fn test_ensure_exists_fails_on_unusable_path() {
        let dir = TempDir::new().unwrap();
        // a directory where the file should be
        let store = LogStore::new(dir.path());

        assert!(matches!(
            store.ensure_exists(),
            Err(LogStoreError::Open { .. })
        ));
    }

    #[test]
    fn test_appended_lines_use_log_format() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();

        let mut appender = store.open_appender().unwrap();
        appender.append(&identity(1, "sh", "alice")).unwrap();
        appender.append(&identity(2, "bash", "root")).unwrap();
        assert_eq!(appender.written(), 2);
        assert_eq!(appender.close().unwrap(), 2);

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "1:sh\t\talice\n2:bash\t\troot\n"
        );
    }

    #[test]
    fn test_bootstrap_reads_identities_in_file_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        let expected: Vec<_> = (1..=5)
            .rev()
            .map(|pid| identity(pid, &format!("cmd{pid}"), "user"))
            .collect();

        let mut appender = store.open_appender().unwrap();
        for identity in &expected {
            appender.append(identity).unwrap();
        }
        appender.close().unwrap();

        let stored = store.bootstrap().unwrap();
        assert_eq!(stored.identities, expected);
        assert_eq!(stored.malformed, 0);
    }

    #[test]
    fn test_bootstrap_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        let mut content = b"1:sh\t\talice\nnot a record\nx:sh\t\tbob\n".to_vec();
        content.extend_from_slice(b"3:\xff\xfe\t\tcarol\n\n4:init\t\troot\n");
        fs::write(store.path(), content).unwrap();

        let stored = store.bootstrap().unwrap();

        let pids: Vec<_> = stored.identities.iter().map(|i| i.pid).collect();
        assert_eq!(pids, vec![1, 4]);
        assert_eq!(stored.malformed, 3);
    }

    #[test]
    fn test_bootstrap_accepts_missing_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "1:sh\t\talice\n2:sh\t\tbob").unwrap();

        assert_eq!(store.bootstrap().unwrap().identities.len(), 2);
    }

    #[rstest]
    #[case::no_pid_separator(b"sh\t\talice".as_slice())]
    #[case::pid_not_numeric(b"x:sh\t\tbob".as_slice())]
    #[case::no_user_separator(b"2:sh alice".as_slice())]
    #[case::empty_command(b"2:\t\talice".as_slice())]
    #[case::invalid_utf8(b"3:\xff\xfe\t\tcarol".as_slice())]
    fn test_bootstrap_skips_each_kind_of_malformed_line(#[case] bad_line: &[u8]) {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        let mut content = b"1:sh\t\talice\n".to_vec();
        content.extend_from_slice(bad_line);
        content.extend_from_slice(b"\n4:init\t\troot\n");
        fs::write(store.path(), content).unwrap();

        let stored = store.bootstrap().unwrap();

        let pids: Vec<_> = stored.identities.iter().map(|i| i.pid).collect();
        assert_eq!(pids, vec![1, 4]);
        assert_eq!(stored.malformed, 1);
    }

    #[test]
    fn test_append_after_unterminated_line_starts_a_new_line() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "1:sh\t\talice").unwrap();

        let mut appender = store.open_appender().unwrap();
        appender.append(&identity(2, "bash", "bob")).unwrap();
        appender.close().unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "1:sh\t\talice\n2:bash\t\tbob\n"
        );
        let stored = store.bootstrap().unwrap();
        assert_eq!(stored.identities[1], identity(2, "bash", "bob"));
        assert_eq!(stored.identities[0].user, "alice");
    }

    #[test]
    fn test_open_appender_leaves_terminated_store_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();

        store.open_appender().unwrap().close().unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "");

        fs::write(store.path(), "1:sh\t\talice\n").unwrap();
        store.open_appender().unwrap().close().unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "1:sh\t\talice\n");
    }

    #[test]
    fn test_bootstrap_of_missing_store_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(matches!(store.bootstrap(), Err(LogStoreError::Open { .. })));
    }

    #[test]
    fn test_wipe_truncates_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_exists().unwrap();
        fs::write(store.path(), "1:sh\t\talice\n").unwrap();

        store.wipe().unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "");
    }
}
