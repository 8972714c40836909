//! System event log (syslog) records for daemon start, stop and setup errors.

use std::ffi::CString;

use crate::constants::APP_NAME;

pub struct EventLog {
    // openlog keeps the pointer, so the identifier must outlive the connection
    ident: CString,
}

impl EventLog {
    /// Opens the connection with `LOG_PID | LOG_CONS` on the daemon facility.
    pub fn open(ident: &str) -> Self {
        let ident = to_c_string(ident)
            .filter(|ident| !ident.as_bytes().is_empty())
            .unwrap_or_else(|| to_c_string(APP_NAME).unwrap_or_default());

        // SAFETY: `ident` is a valid NUL-terminated string owned by `self`
        // for as long as the connection stays open.
        unsafe {
            libc::openlog(
                ident.as_ptr(),
                libc::LOG_PID | libc::LOG_CONS,
                libc::LOG_DAEMON,
            );
        }
        Self { ident }
    }

    pub fn ident(&self) -> &str {
        self.ident.to_str().unwrap_or(APP_NAME)
    }

    pub fn info(&self, message: &str) {
        self.write(libc::LOG_INFO, message);
    }

    pub fn error(&self, message: &str) {
        self.write(libc::LOG_ERR, message);
    }

    fn write(&self, priority: libc::c_int, message: &str) {
        let Some(message) = to_c_string(message) else {
            return;
        };
        // SAFETY: the format string is a literal "%s" and `message` is a
        // valid NUL-terminated string, so syslog reads exactly one argument.
        unsafe {
            libc::syslog(
                priority,
                b"%s\0".as_ptr() as *const libc::c_char,
                message.as_ptr(),
            );
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        // SAFETY: closelog takes no arguments and is fine to call once per openlog.
        unsafe { libc::closelog() };
    }
}

fn to_c_string(value: &str) -> Option<CString> {
    CString::new(value.replace('\0', "")).ok()
}
