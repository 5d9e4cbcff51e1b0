//! `casbak.snapshots`: tab-separated snapshot index. The canonical header is
//! `"Timestamp\tHash\tComment\n"`; any other first line means the file
//! predates this layout or was hand-edited, and is treated as corrupt rather
//! than guessed at. Timestamps must be non-decreasing on append — snapshots
//! are taken in wall-clock order, and an out-of-order append almost always
//! means the caller passed the wrong clock.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::BackupError;

pub const HEADER: &str = "Timestamp\tHash\tComment\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub timestamp: String,
    pub hash: String,
    pub comment: String,
}

#[derive(Debug, Default)]
pub struct SnapshotIndex {
    records: Vec<SnapshotRecord>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&SnapshotRecord> {
        self.records.last()
    }

    /// Load an existing index, or treat a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = text.split_inclusive('\n');
        match lines.next() {
            Some(HEADER) => {}
            Some(other) => {
                return Err(BackupError::CorruptStore(format!(
                    "unexpected snapshot index header: {:?}",
                    other
                )))
            }
            None => {
                return Err(BackupError::CorruptStore(
                    "snapshot index is empty, missing header".to_string(),
                ))
            }
        }

        let mut records = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\n');
            if line.is_empty() {
                continue;
            }
            let mut fields = line.splitn(3, '\t');
            let (timestamp, hash, comment) = match (fields.next(), fields.next(), fields.next()) {
                (Some(t), Some(h), Some(c)) => (t, h, c),
                _ => {
                    return Err(BackupError::CorruptStore(format!(
                        "malformed snapshot index row: {:?}",
                        line
                    )))
                }
            };
            records.push(SnapshotRecord {
                timestamp: timestamp.to_string(),
                hash: hash.to_string(),
                comment: comment.to_string(),
            });
        }

        Ok(Self { records })
    }

    /// Append a snapshot, creating the file with the canonical header if it
    /// doesn't exist yet. Rejects timestamps earlier than the last entry.
    pub fn append(
        &mut self,
        path: &Path,
        timestamp: String,
        hash: String,
        comment: String,
    ) -> Result<(), BackupError> {
        if let Some(last) = self.last() {
            if timestamp < last.timestamp {
                return Err(BackupError::NonMonotonicTimestamp {
                    previous: last.timestamp.clone(),
                    attempted: timestamp,
                });
            }
        }

        let needs_header = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if needs_header {
            file.write_all(HEADER.as_bytes())?;
        }
        file.write_all(format!("{}\t{}\t{}\n", timestamp, hash, comment).as_bytes())?;

        self.records.push(SnapshotRecord {
            timestamp,
            hash,
            comment,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SnapshotIndex::load(&dir.path().join("casbak.snapshots")).unwrap();
        assert!(idx.records().is_empty());
    }

    #[test]
    fn append_creates_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.snapshots");
        let mut idx = SnapshotIndex::new();
        idx.append(
            &path,
            "2020-01-01T00:00:00Z".to_string(),
            "deadbeef".to_string(),
            "first".to_string(),
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Timestamp\tHash\tComment\n2020-01-01T00:00:00Z\tdeadbeef\tfirst\n"
        );
    }

    #[test]
    fn reloaded_index_matches_appended_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.snapshots");
        let mut idx = SnapshotIndex::new();
        idx.append(&path, "2020-01-01T00:00:00Z".into(), "aaa".into(), "one".into())
            .unwrap();
        idx.append(&path, "2020-01-02T00:00:00Z".into(), "bbb".into(), "two".into())
            .unwrap();

        let reloaded = SnapshotIndex::load(&path).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        assert_eq!(reloaded.records()[1].hash, "bbb");
    }

    #[test]
    fn rejects_out_of_order_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.snapshots");
        let mut idx = SnapshotIndex::new();
        idx.append(&path, "2020-01-02T00:00:00Z".into(), "aaa".into(), "".into())
            .unwrap();
        let err = idx
            .append(&path, "2020-01-01T00:00:00Z".into(), "bbb".into(), "".into())
            .unwrap_err();
        assert!(matches!(err, BackupError::NonMonotonicTimestamp { .. }));
    }

    #[test]
    fn rejects_wrong_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.snapshots");
        std::fs::write(&path, "Time\tDigest\tNote\n").unwrap();
        let err = SnapshotIndex::load(&path).unwrap_err();
        assert!(matches!(err, BackupError::CorruptStore(_)));
    }

    #[test]
    fn comment_may_contain_tabs_after_second_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.snapshots");
        let mut idx = SnapshotIndex::new();
        idx.append(
            &path,
            "2020-01-01T00:00:00Z".into(),
            "aaa".into(),
            "note\twith tab".into(),
        )
        .unwrap();
        let reloaded = SnapshotIndex::load(&path).unwrap();
        assert_eq!(reloaded.records()[0].comment, "note\twith tab");
    }
}
