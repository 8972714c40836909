use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    EMPTY_FIELD, MAX_COMMAND_LEN, MAX_USER_LEN, PID_SEPARATOR, USER_SEPARATOR,
};
use crate::types::process_record::ProcessRecord;

/// Maximum byte widths of the command and user fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLimits {
    pub command: usize,
    pub user: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            command: MAX_COMMAND_LEN,
            user: MAX_USER_LEN,
        }
    }
}

/// A process identity as recorded in the Log Store.
///
/// Deduplication happens on `pid` alone; `command` and `user` are carried
/// along but two identities with the same pid are considered the same
/// process even if the other fields differ. PIDs get recycled by the kernel,
/// so an unrelated process that reuses a logged pid is never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub pid: u32,
    pub command: String,
    pub user: String,
}

impl Identity {
    /// Builds an identity, silently truncating `command` and `user` to `limits`.
    /// An empty field is recorded as `?`.
    pub fn new(pid: u32, command: &str, user: &str, limits: FieldLimits) -> Self {
        Self {
            pid,
            command: bounded_field(command, limits.command),
            user: bounded_field(user, limits.user),
        }
    }

    pub fn from_record(record: &ProcessRecord, limits: FieldLimits) -> Self {
        Self::new(record.pid, &record.command, &record.user, limits)
    }
}

/// Serializes to the Log Store line format, without the trailing newline.
///
/// Commands or users containing `:` or a double tab produce lines that do
/// not read back; no escaping is performed.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.pid, PID_SEPARATOR, self.command, USER_SEPARATOR, self.user
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdentityError {
    #[error("missing ':' after the process id")]
    MissingPidSeparator,
    #[error("invalid process id {0:?}")]
    InvalidPid(String),
    #[error("missing tab separator before the user")]
    MissingUserSeparator,
    #[error("empty command field")]
    EmptyCommand,
    #[error("empty user field")]
    EmptyUser,
}

impl FromStr for Identity {
    type Err = ParseIdentityError;

    /// Parses one Log Store line. A trailing `\n` (or `\r\n`) is tolerated.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\n', '\r']);

        let (pid, rest) = line
            .split_once(PID_SEPARATOR)
            .ok_or(ParseIdentityError::MissingPidSeparator)?;
        let pid = pid
            .trim()
            .parse::<u32>()
            .map_err(|_| ParseIdentityError::InvalidPid(pid.to_string()))?;

        let (command, user) = rest
            .split_once(USER_SEPARATOR)
            .ok_or(ParseIdentityError::MissingUserSeparator)?;
        if command.is_empty() {
            return Err(ParseIdentityError::EmptyCommand);
        }
        if user.is_empty() {
            return Err(ParseIdentityError::EmptyUser);
        }

        Ok(Self {
            pid,
            command: command.to_string(),
            user: user.to_string(),
        })
    }
}

fn bounded_field(value: &str, max_len: usize) -> String {
    match truncate_field(value, max_len) {
        "" => EMPTY_FIELD.to_string(),
        field => field.to_string(),
    }
}

/// Cuts `value` to at most `max_len` bytes without splitting a UTF-8 character.
pub fn truncate_field(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
