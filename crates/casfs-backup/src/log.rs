//! `casbak.log`: append-only plain-text activity log. One line per event,
//! timestamp-prefixed; never truncated or rewritten.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::BackupError;

pub struct BackupLog {
    path: PathBuf,
}

impl BackupLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        BackupLog { path: path.into() }
    }

    pub fn append(&self, timestamp: &str, message: &str) -> Result<(), BackupError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}\t{}", timestamp, message)?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<String, BackupError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_all_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let log = BackupLog::open(dir.path().join("casbak.log"));
        log.append("2020-01-01T00:00:00Z", "import started").unwrap();
        log.append("2020-01-01T00:05:00Z", "import finished").unwrap();

        let text = log.read_all().unwrap();
        assert_eq!(
            text,
            "2020-01-01T00:00:00Z\timport started\n2020-01-01T00:05:00Z\timport finished\n"
        );
    }

    #[test]
    fn reading_missing_log_returns_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let log = BackupLog::open(dir.path().join("casbak.log"));
        assert_eq!(log.read_all().unwrap(), "");
    }

    #[test]
    fn append_never_truncates_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.log");
        let log = BackupLog::open(&path);
        log.append("t1", "a").unwrap();
        drop(log);

        let log2 = BackupLog::open(&path);
        log2.append("t2", "b").unwrap();
        assert_eq!(log2.read_all().unwrap(), "t1\ta\nt2\tb\n");
    }
}
