pub mod export;
pub mod import;
pub mod init;
pub mod log;
pub mod ls;
pub mod mount;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix epoch seconds, used to stamp log entries
/// and snapshots and to anchor relative date-specs passed on the CLI.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
