//! # casfs-backup
//!
//! The on-disk layout of a backup directory: `casbak.conf.json` (component
//! registry), `casbak.log` (append-only activity log), `casbak.snapshots`
//! (tab-separated snapshot index), and the date-spec grammar used by `log`
//! and `export` to resolve `--since`/`--at`-style arguments to a concrete
//! snapshot.

pub mod conf;
pub mod date;
pub mod log;
pub mod snapshots;

pub use conf::{BackupConfig, ComponentSpec};
pub use date::{parse_date_spec, DateError};
pub use log::BackupLog;
pub use snapshots::{SnapshotIndex, SnapshotRecord};

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt backup store: {0}")]
    CorruptStore(String),
    #[error("missing component in casbak.conf.json: {0}")]
    MissingComponent(String),
    #[error("snapshot timestamp {attempted} precedes last recorded timestamp {previous}")]
    NonMonotonicTimestamp { previous: String, attempted: String },
    #[error(transparent)]
    Date(#[from] DateError),
}

pub const CONF_FILE: &str = "casbak.conf.json";
pub const LOG_FILE: &str = "casbak.log";
pub const SNAPSHOTS_FILE: &str = "casbak.snapshots";

/// A backup directory: the three on-disk artifacts plus the CAS root they
/// describe, opened or initialized as a unit.
pub struct BackupDir {
    root: PathBuf,
    config: BackupConfig,
    log: BackupLog,
    snapshots: SnapshotIndex,
}

impl BackupDir {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotIndex {
        &self.snapshots
    }

    pub fn cas_path(&self) -> Result<PathBuf, BackupError> {
        self.config.cas_path(&self.root)
    }

    /// Create a new backup directory with the default component config. The
    /// directory itself must already exist (or be creatable) but must not
    /// already contain a `casbak.conf.json`.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let conf_path = root.join(CONF_FILE);
        if conf_path.exists() {
            return Err(BackupError::CorruptStore(format!(
                "{} already exists",
                conf_path.display()
            )));
        }

        let config = BackupConfig::for_new_backup();
        config.save(&conf_path)?;

        let log = BackupLog::open(root.join(LOG_FILE));
        let snapshots = SnapshotIndex::new();

        Ok(BackupDir {
            root,
            config,
            log,
            snapshots,
        })
    }

    /// Open an existing backup directory, loading config and snapshot index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let root = root.into();
        let config = BackupConfig::load(&root.join(CONF_FILE))?;
        let log = BackupLog::open(root.join(LOG_FILE));
        let snapshots = SnapshotIndex::load(&root.join(SNAPSHOTS_FILE))?;

        Ok(BackupDir {
            root,
            config,
            log,
            snapshots,
        })
    }

    pub fn log_event(&self, timestamp: &str, message: &str) -> Result<(), BackupError> {
        self.log.append(timestamp, message)
    }

    pub fn record_snapshot(
        &mut self,
        timestamp: String,
        hash: String,
        comment: String,
    ) -> Result<(), BackupError> {
        let path = self.root.join(SNAPSHOTS_FILE);
        self.snapshots.append(&path, timestamp, hash, comment)
    }

    /// Resolve a date-spec (ISO prefix, epoch, or `<n>[DWMY]` relative) to
    /// the most recent snapshot at or before that point in time.
    pub fn snapshot_at(&self, spec: &str, now_epoch: i64) -> Result<Option<&SnapshotRecord>, BackupError> {
        let target = parse_date_spec(spec, now_epoch)?;
        Ok(self
            .snapshots
            .records()
            .iter()
            .filter(|r| r.timestamp <= target)
            .last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backup_root = dir.path().join("backup");
        let backup = BackupDir::init(&backup_root).unwrap();
        assert_eq!(
            backup.cas_path().unwrap(),
            backup_root.join("cas")
        );

        let reopened = BackupDir::open(&backup_root).unwrap();
        assert_eq!(reopened.cas_path().unwrap(), backup_root.join("cas"));
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        BackupDir::init(dir.path()).unwrap();
        assert!(BackupDir::init(dir.path()).is_err());
    }

    #[test]
    fn record_and_log_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut backup = BackupDir::init(dir.path()).unwrap();
        backup.log_event("2020-01-01T00:00:00Z", "init").unwrap();
        backup
            .record_snapshot("2020-01-01T00:00:00Z".into(), "abc123".into(), "first".into())
            .unwrap();
        assert_eq!(backup.snapshots().records().len(), 1);

        let reopened = BackupDir::open(dir.path()).unwrap();
        assert_eq!(reopened.snapshots().records().len(), 1);
        assert_eq!(reopened.snapshots().records()[0].hash, "abc123");
    }

    #[test]
    fn snapshot_at_picks_most_recent_before_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut backup = BackupDir::init(dir.path()).unwrap();
        backup
            .record_snapshot("2020-01-01T00:00:00Z".into(), "a".into(), "".into())
            .unwrap();
        backup
            .record_snapshot("2020-02-01T00:00:00Z".into(), "b".into(), "".into())
            .unwrap();

        let found = backup.snapshot_at("2020-01-15", 0).unwrap().unwrap();
        assert_eq!(found.hash, "a");
    }

    #[test]
    fn snapshot_at_returns_none_before_any_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut backup = BackupDir::init(dir.path()).unwrap();
        backup
            .record_snapshot("2020-02-01T00:00:00Z".into(), "b".into(), "".into())
            .unwrap();

        assert!(backup.snapshot_at("2019-01-01", 0).unwrap().is_none());
    }
}
