//! The mutation overlay tree (§4.4.2): in-memory edits layered over a
//! backing CAS directory, rooted at [`crate::CasFs::overrides`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use casfs_codec::DirEnt;

pub type OverrideRef = Rc<RefCell<OverrideNode>>;

/// One node of the overlay tree: a live entry plus any recorded children.
#[derive(Debug, Clone)]
pub struct OverrideNode {
    pub entry: DirEnt,
    pub subtree: HashMap<String, OverrideSlot>,
}

impl OverrideNode {
    pub fn leaf(entry: DirEnt) -> Self {
        OverrideNode {
            entry,
            subtree: HashMap::new(),
        }
    }
}

/// A subtree slot: either a live override or a tombstone recording that the
/// name was explicitly unlinked (distinct from "never touched").
#[derive(Debug, Clone)]
pub enum OverrideSlot {
    Present(OverrideRef),
    Unlinked,
}

/// A sparse set of field edits applied on top of an existing [`DirEnt`] by
/// `update_path`. Each field is `None` (leave as-is) or `Some(new value)`
/// (including `Some(None)` to clear an optional field).
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub reference: Option<Option<casfs_codec::RawName>>,
    pub size: Option<Option<u64>>,
    pub create_ts: Option<Option<i64>>,
    pub modify_ts: Option<Option<i64>>,
    pub access_ts: Option<Option<i64>>,
    pub metadata_ts: Option<Option<i64>>,
    pub uid: Option<Option<u32>>,
    pub gid: Option<Option<u32>>,
    pub mode: Option<Option<u32>>,
}

impl EntryChanges {
    pub fn touch(modify_ts: i64) -> Self {
        EntryChanges {
            modify_ts: Some(Some(modify_ts)),
            ..Default::default()
        }
    }

    pub fn apply(&self, base: &DirEnt) -> DirEnt {
        let mut out = base.clone();
        if let Some(v) = &self.reference {
            out.reference = v.clone();
        }
        if let Some(v) = self.size {
            out.size = v;
        }
        if let Some(v) = self.create_ts {
            out.create_ts = v;
        }
        if let Some(v) = self.modify_ts {
            out.modify_ts = v;
        }
        if let Some(v) = self.access_ts {
            out.access_ts = v;
        }
        if let Some(v) = self.metadata_ts {
            out.metadata_ts = v;
        }
        if let Some(v) = self.uid {
            out.uid = v;
        }
        if let Some(v) = self.gid {
            out.gid = v;
        }
        if let Some(v) = self.mode {
            out.mode = v;
        }
        out
    }
}
