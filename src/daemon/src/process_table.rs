use std::collections::HashSet;

use anyhow::Result;
use proclog_common::constants::EMPTY_FIELD;
use proclog_common::types::process_record::ProcessRecord;
use sysinfo::{
    Process, ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind, UpdateKind, Users,
};
use tracing::debug;

/// Source of live process-table snapshots.
pub trait ProcessTable {
    /// Every process running at the time of the call. No ordering is promised.
    fn snapshot(&mut self) -> Result<Vec<ProcessRecord>>;
}

/// Reads the host process table through sysinfo.
pub struct SysinfoProcessTable {
    system: System,
    users: Users,
    unresolved: UnresolvedUids,
}

/// Uids that had no account when they were first seen. Accounts are only
/// re-read when a uid shows up that is not in here yet.
#[derive(Debug, Default)]
struct UnresolvedUids(HashSet<u32>);

impl UnresolvedUids {
    /// Remembers every uid of `missing`; true if any of them is new.
    fn any_new(&mut self, missing: impl IntoIterator<Item = u32>) -> bool {
        missing
            .into_iter()
            .fold(false, |fresh, uid| self.0.insert(uid) || fresh)
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
            unresolved: UnresolvedUids::default(),
        }
    }

    fn user_of(&self, process: &Process) -> Option<String> {
        let uid = process.effective_user_id().or_else(|| process.user_id())?;
        Some(
            self.users
                .get_user_by_id(uid)
                .map(|user| user.name().to_string())
                .unwrap_or_else(|| (**uid).to_string()),
        )
    }

    fn missing_uids(&self) -> Vec<u32> {
        self.system
            .processes()
            .values()
            .filter_map(|process| process.effective_user_id().or_else(|| process.user_id()))
            .filter(|uid| self.users.get_user_by_id(uid).is_none())
            .map(|uid| **uid)
            .collect()
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&mut self) -> Result<Vec<ProcessRecord>> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_user(UpdateKind::OnlyIfNotSet),
        );

        // accounts created since startup
        let missing = self.missing_uids();
        if self.unresolved.any_new(missing) {
            self.users = Users::new_with_refreshed_list();
        }

        let mut records: Vec<ProcessRecord> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| !matches!(process.thread_kind(), Some(ThreadKind::Userland)))
            .map(|(pid, process)| ProcessRecord {
                pid: pid.as_u32(),
                command: process.name().to_string_lossy().into_owned(),
                user: self.user_of(process).unwrap_or_else(|| EMPTY_FIELD.to_string()),
            })
            .collect();
        records.sort_by_key(|record| record.pid);

        debug!("Captured {} processes", records.len());
        Ok(records)
    }
}
