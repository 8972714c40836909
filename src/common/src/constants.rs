pub const APP_NAME: &str = "proclog";

pub const LOG_STORE_FILE: &str = "/var/log/proclog-daemon/processes-log";

pub const ENV_PREFIX: &str = "PROCLOG";

pub const POLL_INTERVAL_MS: u64 = 1000;
pub const IDENTITY_CAPACITY: usize = 24_000;

// field widths of the persisted record, in bytes
pub const MAX_COMMAND_LEN: usize = 63;
pub const MAX_USER_LEN: usize = 32;
// stands in for an empty command or user, which would not read back
pub const EMPTY_FIELD: &str = "?";

pub const DEFAULT_VIEWER: &str = "vim -R";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Separators of one Log Store line: `<pid>:<command>\t\t<user>\n`.
pub const PID_SEPARATOR: char = ':';
pub const USER_SEPARATOR: &str = "\t\t";
