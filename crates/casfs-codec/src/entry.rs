//! Directory entries (§4 "DirEnt"): an immutable tagged record describing
//! one filesystem entry.

use std::collections::BTreeMap;

use crate::name::RawName;

/// The type tag carried by every entry. `ref_len == 0` (unix/minimal
/// codecs) or a missing `ref` key (universal codec) both mean "no ref",
/// regardless of type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    BlockDev,
    CharDev,
    Pipe,
    Socket,
}

impl EntryKind {
    /// Single ASCII letter used by the unix/minimal binary codecs.
    pub fn type_code(&self) -> u8 {
        match self {
            EntryKind::File => b'f',
            EntryKind::Dir => b'd',
            EntryKind::Symlink => b'l',
            EntryKind::CharDev => b'c',
            EntryKind::BlockDev => b'b',
            EntryKind::Pipe => b'p',
            EntryKind::Socket => b's',
        }
    }

    pub fn from_type_code(code: u8) -> Option<Self> {
        match code {
            b'f' => Some(EntryKind::File),
            b'd' => Some(EntryKind::Dir),
            b'l' => Some(EntryKind::Symlink),
            b'c' => Some(EntryKind::CharDev),
            b'b' => Some(EntryKind::BlockDev),
            b'p' => Some(EntryKind::Pipe),
            b's' => Some(EntryKind::Socket),
            _ => None,
        }
    }

    /// Name used in the universal codec's `"type"` field and in fabricated
    /// placeholder entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
            EntryKind::Symlink => "symlink",
            EntryKind::BlockDev => "blockdev",
            EntryKind::CharDev => "chardev",
            EntryKind::Pipe => "pipe",
            EntryKind::Socket => "socket",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(EntryKind::File),
            "dir" => Some(EntryKind::Dir),
            "symlink" => Some(EntryKind::Symlink),
            "blockdev" => Some(EntryKind::BlockDev),
            "chardev" => Some(EntryKind::CharDev),
            "pipe" => Some(EntryKind::Pipe),
            "socket" => Some(EntryKind::Socket),
            _ => None,
        }
    }
}

/// One directory entry. Immutable: callers that need to change a field
/// clone and override (see [`DirEnt::with_ref`] and friends).
#[derive(Debug, Clone)]
pub struct DirEnt {
    pub name: RawName,
    pub kind: EntryKind,
    pub reference: Option<RawName>,
    pub size: Option<u64>,
    pub create_ts: Option<i64>,
    pub modify_ts: Option<i64>,
    pub access_ts: Option<i64>,
    pub metadata_ts: Option<i64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
    pub dev: Option<u64>,
    pub inode: Option<u64>,
    pub nlink: Option<u64>,
    pub blocksize: Option<u64>,
    pub blockcount: Option<u64>,
    /// Codec-unknown fields, preserved by the universal codec only.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DirEnt {
    /// A bare entry with only name, kind, and ref set — the minimal
    /// codec's field set, useful for fabricated placeholders.
    pub fn bare(name: RawName, kind: EntryKind, reference: Option<RawName>) -> Self {
        DirEnt {
            name,
            kind,
            reference,
            size: None,
            create_ts: None,
            modify_ts: None,
            access_ts: None,
            metadata_ts: None,
            uid: None,
            gid: None,
            user: None,
            group: None,
            mode: None,
            dev: None,
            inode: None,
            nlink: None,
            blocksize: None,
            blockcount: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_reference(&self, reference: Option<RawName>) -> Self {
        let mut clone = self.clone();
        clone.reference = reference;
        clone
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Dir)
    }
}

/// The logical contents of a directory blob: ordered, name-unique entries
/// plus a free-form metadata map.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub entries: Vec<DirEnt>,
}

impl Directory {
    pub fn new(metadata: BTreeMap<String, serde_json::Value>, mut entries: Vec<DirEnt>) -> Self {
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        Directory { metadata, entries }
    }

    pub fn find(&self, name: &RawName) -> Option<&DirEnt> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }
}
