//! Scanner interface (§4.6, external collaborator): feeds the core records
//! describing real filesystem entries so they can be imported.

use std::ffi::OsStr;
use std::path::Path;

use casfs_cas::CasStore;
use casfs_codec::{DirEnt, Directory, EntryKind, RawName};

use crate::error::Result;

/// One scanned filesystem entry, in the scanner's own shape — a subset of
/// [`DirEnt`] fields, never codec-specific.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub name: RawName,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub reference: Option<RawName>,
    pub mtime: Option<i64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

impl From<ScanRecord> for DirEnt {
    fn from(record: ScanRecord) -> Self {
        let mut entry = DirEnt::bare(record.name, record.kind, record.reference);
        entry.size = record.size;
        entry.modify_ts = record.mtime;
        entry.uid = record.uid;
        entry.gid = record.gid;
        entry.mode = record.mode;
        entry
    }
}

/// Produces scan records for one directory level. Implementations may
/// reuse a *hint directory* — the previously backed-up version — to skip
/// re-hashing files whose `(size, modify_ts)` are unchanged.
pub trait Scanner {
    fn scan(&mut self, dir_path: &Path, hint_dir: Option<&Directory>) -> Result<Vec<ScanRecord>>;
}

/// Reference scanner walking one real directory level with `std::fs`,
/// hashing new/changed files into the backing store as it goes.
pub struct WalkdirScanner<'a> {
    store: &'a CasStore,
}

impl<'a> WalkdirScanner<'a> {
    pub fn new(store: &'a CasStore) -> Self {
        WalkdirScanner { store }
    }
}

impl<'a> Scanner for WalkdirScanner<'a> {
    fn scan(&mut self, dir_path: &Path, hint_dir: Option<&Directory>) -> Result<Vec<ScanRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(dir_path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = RawName::from_bytes(name_bytes(&entry.file_name()));
            let metadata = entry.metadata()?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);

            if file_type.is_dir() {
                records.push(ScanRecord {
                    name,
                    kind: EntryKind::Dir,
                    size: None,
                    reference: None,
                    mtime,
                    uid: None,
                    gid: None,
                    mode: None,
                });
                continue;
            }

            if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())?;
                records.push(ScanRecord {
                    name,
                    kind: EntryKind::Symlink,
                    size: None,
                    reference: Some(RawName::from_str(&target.to_string_lossy())),
                    mtime,
                    uid: None,
                    gid: None,
                    mode: None,
                });
                continue;
            }

            if !file_type.is_file() {
                // Device nodes, FIFOs, sockets: left to a platform-specific
                // scanner able to read their major/minor via stat(2).
                continue;
            }

            let size = Some(metadata.len());
            let reused = hint_dir
                .and_then(|d| d.find(&name))
                .filter(|e| e.size == size && e.modify_ts == mtime)
                .and_then(|e| e.reference.clone());
            let reference = match reused {
                Some(r) => Some(r),
                None => {
                    let digest = self.store.put_file(entry.path())?;
                    Some(RawName::from_str(&digest.to_hex()))
                }
            };

            records.push(ScanRecord {
                name,
                kind: EntryKind::File,
                size,
                reference,
                mtime,
                uid: None,
                gid: None,
                mode: None,
            });
        }
        Ok(records)
    }
}

#[cfg(unix)]
fn name_bytes(os: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    os.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(os: &OsStr) -> Vec<u8> {
    os.to_string_lossy().into_owned().into_bytes()
}
