use serde::{Deserialize, Serialize};

/// One row of a process-table snapshot, as handed over by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command: String,
    pub user: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, command: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            pid,
            command: command.into(),
            user: user.into(),
        }
    }
}
