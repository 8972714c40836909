use proclog_common::types::identity::{FieldLimits, Identity};
use proclog_common::types::process_record::ProcessRecord;
use thiserror::Error;
use tracing::{debug, info};

use crate::identity_set::{IdentitySet, IdentitySetError};
use crate::log_store::{IdentitySink, LogStore, LogStoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Capacity(#[from] IdentitySetError),
    #[error(transparent)]
    Store(#[from] LogStoreError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub loaded: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

/// Diffs process-table snapshots against the identities already recorded and
/// appends the unseen ones.
#[derive(Debug)]
pub struct Reconciler {
    identities: IdentitySet,
    limits: FieldLimits,
}

impl Reconciler {
    pub fn new(identities: IdentitySet, limits: FieldLimits) -> Self {
        Self { identities, limits }
    }

    /// Builds the identity set from everything already in `store`.
    pub fn bootstrap(
        store: &LogStore,
        capacity: usize,
        limits: FieldLimits,
    ) -> Result<(Self, BootstrapReport), ReconcileError> {
        let stored = store.bootstrap()?;
        let mut identities = IdentitySet::new(capacity);
        let mut report = BootstrapReport {
            malformed: stored.malformed,
            ..Default::default()
        };

        for identity in stored.identities {
            if identities.insert(identity)? {
                report.loaded += 1;
            } else {
                report.duplicates += 1;
            }
        }

        info!(
            "Bootstrapped {} identities from {} ({} duplicates, {} malformed lines skipped)",
            report.loaded,
            store.path().display(),
            report.duplicates,
            report.malformed
        );
        Ok((Self::new(identities, limits), report))
    }

    pub fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    /// Records every process of `snapshot` whose pid has not been seen before,
    /// in snapshot order. Returns the number of new identities.
    ///
    /// Room in the set is checked before anything is appended, so a capacity
    /// failure never leaves a line in the store that the set does not hold.
    pub fn reconcile<S: IdentitySink>(
        &mut self,
        snapshot: &[ProcessRecord],
        sink: &mut S,
    ) -> Result<usize, ReconcileError> {
        let mut recorded = 0;

        for record in snapshot {
            if self.identities.contains(record.pid) {
                continue;
            }

            let identity = Identity::from_record(record, self.limits);
            self.identities.ensure_room()?;
            sink.append(&identity)?;
            debug!(
                "New process pid={} cmd={} user={}",
                identity.pid, identity.command, identity.user
            );
            self.identities.insert(identity)?;
            recorded += 1;
        }

        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemorySink(Vec<Identity>);

    impl IdentitySink for MemorySink {
        fn append(&mut self, identity: &Identity) -> Result<(), LogStoreError> {
            self.0.push(identity.clone());
            Ok(())
        }
    }

    fn reconciler(capacity: usize) -> Reconciler {
        Reconciler::new(IdentitySet::new(capacity), FieldLimits::default())
    }

    fn empty_store(dir: &TempDir) -> LogStore {
        let store = LogStore::new(dir.path().join("processes-log"));
        store.ensure_exists().unwrap();
        store
    }

    #[test]
    fn test_single_cycle_against_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        let (mut reconciler, report) =
            Reconciler::bootstrap(&store, 100, FieldLimits::default()).unwrap();
        assert_eq!(report, BootstrapReport::default());

        let mut appender = store.open_appender().unwrap();
        let recorded = reconciler
            .reconcile(&[ProcessRecord::new(1, "sh", "alice")], &mut appender)
            .unwrap();
        appender.close().unwrap();

        assert_eq!(recorded, 1);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "1:sh\t\talice\n");
        assert!(reconciler.identities().contains(1));
        assert!(!reconciler.identities().contains(2));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let snapshot = vec![
            ProcessRecord::new(10, "init", "root"),
            ProcessRecord::new(20, "sshd", "root"),
            ProcessRecord::new(30, "vim", "alice"),
        ];
        let mut reconciler = reconciler(100);
        let mut sink = MemorySink::default();

        assert_eq!(reconciler.reconcile(&snapshot, &mut sink).unwrap(), 3);
        assert_eq!(reconciler.reconcile(&snapshot, &mut sink).unwrap(), 0);

        assert_eq!(sink.0.len(), 3);
        assert_eq!(reconciler.identities().len(), 3);
    }

    #[test]
    fn test_known_pid_with_other_command_is_not_logged_again() {
        let mut reconciler = reconciler(100);
        let mut sink = MemorySink::default();
        reconciler
            .reconcile(&[ProcessRecord::new(5, "a", "u1")], &mut sink)
            .unwrap();

        let recorded = reconciler
            .reconcile(&[ProcessRecord::new(5, "b", "u2")], &mut sink)
            .unwrap();

        assert_eq!(recorded, 0);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(reconciler.identities().get(5).unwrap().command, "a");
    }

    #[test]
    fn test_append_order_follows_snapshot_order() {
        let mut reconciler = reconciler(100);
        let mut sink = MemorySink::default();
        let snapshot = vec![
            ProcessRecord::new(300, "c", "u"),
            ProcessRecord::new(100, "a", "u"),
            ProcessRecord::new(200, "b", "u"),
        ];

        reconciler.reconcile(&snapshot, &mut sink).unwrap();

        let pids: Vec<_> = sink.0.iter().map(|i| i.pid).collect();
        assert_eq!(pids, vec![300, 100, 200]);
    }

    #[test]
    fn test_long_fields_are_stored_truncated() {
        let mut reconciler = Reconciler::new(
            IdentitySet::new(10),
            FieldLimits {
                command: 4,
                user: 3,
            },
        );
        let mut sink = MemorySink::default();

        reconciler
            .reconcile(&[ProcessRecord::new(1, "postgres", "postgres")], &mut sink)
            .unwrap();

        assert_eq!(sink.0[0].to_string(), "1:post\t\tpos");
    }

    #[test]
    fn test_capacity_exhaustion_stops_before_append() {
        let mut reconciler = reconciler(2);
        let mut sink = MemorySink::default();
        let snapshot = vec![
            ProcessRecord::new(1, "a", "u"),
            ProcessRecord::new(2, "b", "u"),
            ProcessRecord::new(3, "c", "u"),
        ];

        let err = reconciler.reconcile(&snapshot, &mut sink).unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Capacity(IdentitySetError::CapacityExhausted { capacity: 2 })
        ));
        assert_eq!(sink.0.len(), 2);
        assert!(!reconciler.identities().contains(3));
    }

    #[test]
    fn test_bootstrap_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        let snapshot: Vec<_> = (1..=50)
            .map(|pid| ProcessRecord::new(pid * 7, format!("cmd{pid}"), "user"))
            .collect();

        let mut first = reconciler(100);
        let mut appender = store.open_appender().unwrap();
        first.reconcile(&snapshot, &mut appender).unwrap();
        appender.close().unwrap();

        let (second, report) = Reconciler::bootstrap(&store, 100, FieldLimits::default()).unwrap();

        assert_eq!(report.loaded, 50);
        assert_eq!(second.identities().len(), 50);
        assert!(snapshot
            .iter()
            .all(|record| second.identities().contains(record.pid)));
    }

    #[test]
    fn test_new_pid_survives_unterminated_store() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        fs::write(store.path(), "1:sh\t\talice").unwrap();
        let (mut first, _) = Reconciler::bootstrap(&store, 10, FieldLimits::default()).unwrap();

        let mut appender = store.open_appender().unwrap();
        first
            .reconcile(&[ProcessRecord::new(2, "bash", "bob")], &mut appender)
            .unwrap();
        appender.close().unwrap();

        let (second, report) = Reconciler::bootstrap(&store, 10, FieldLimits::default()).unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.malformed, 0);
        assert!(second.identities().contains(2));
        assert_eq!(second.identities().get(1).unwrap().user, "alice");
    }

    #[test]
    fn test_empty_command_is_logged_once_across_restarts() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        let snapshot = [ProcessRecord::new(7, "", "root")];

        for _ in 0..3 {
            let (mut reconciler, report) =
                Reconciler::bootstrap(&store, 10, FieldLimits::default()).unwrap();
            assert_eq!(report.malformed, 0);
            let mut appender = store.open_appender().unwrap();
            reconciler.reconcile(&snapshot, &mut appender).unwrap();
            appender.close().unwrap();
        }

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "7:?\t\troot\n");
    }

    #[test]
    fn test_bootstrap_counts_duplicate_lines() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        fs::write(
            store.path(),
            "1:sh\t\talice\n1:bash\t\tbob\n2:init\t\troot\nbroken\n",
        )
        .unwrap();

        let (reconciler, report) =
            Reconciler::bootstrap(&store, 10, FieldLimits::default()).unwrap();

        assert_eq!(
            report,
            BootstrapReport {
                loaded: 2,
                duplicates: 1,
                malformed: 1
            }
        );
        assert_eq!(reconciler.identities().get(1).unwrap().command, "sh");
    }

    #[test]
    fn test_bootstrap_over_capacity_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = empty_store(&dir);
        fs::write(store.path(), "1:a\t\tu\n2:b\t\tu\n3:c\t\tu\n").unwrap();

        let result = Reconciler::bootstrap(&store, 2, FieldLimits::default());

        assert!(matches!(result, Err(ReconcileError::Capacity(_))));
    }
}
