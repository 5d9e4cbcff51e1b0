//! The CAS-FS core (§4.4): path resolution over a backing CAS directory
//! tree, an in-memory mutation overlay, and commit back into the store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use casfs_cache::DirectoryCache;
use casfs_cas::{CasStore, PutOptions};
use casfs_codec::{CodecRegistry, DirEnt, Directory, EntryKind, RawName};
use tracing::{debug, instrument};

use crate::error::{CasFsError, Result};
use crate::overlay::{EntryChanges, OverrideNode, OverrideRef, OverrideSlot};
use crate::pathutil::split_path;

const SYMLINK_HOP_LIMIT: usize = 40;
const DEFAULT_CODEC: &str = "universal";

/// Controls how [`CasFs::resolve`] treats symlinks, missing components, and
/// non-directory tails encountered mid-path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveFlags {
    pub follow_symlinks: bool,
    /// Fabricate a placeholder entry for a missing component instead of
    /// failing, without otherwise coercing existing entries.
    pub partial: bool,
    /// 0: off. 1: same as `partial`. >1: additionally coerce a non-directory
    /// entry found mid-path into an empty directory placeholder.
    pub mkdir: u8,
}

impl ResolveFlags {
    pub fn lookup() -> Self {
        ResolveFlags { follow_symlinks: true, partial: false, mkdir: 0 }
    }

    pub fn mutating() -> Self {
        ResolveFlags { follow_symlinks: true, partial: true, mkdir: 2 }
    }
}

#[derive(Clone)]
struct Cursor {
    entry: DirEnt,
    override_node: Option<OverrideRef>,
}

enum MutationOp {
    Replace(DirEnt),
    Update(EntryChanges),
    Unlink,
}

/// A CAS-backed virtual filesystem rooted at a single directory entry.
/// Mutations accumulate in an in-memory overlay (§4.4.2) until [`CasFs::commit`]
/// folds them back into the backing store.
pub struct CasFs {
    store: CasStore,
    codecs: CodecRegistry,
    root_entry: DirEnt,
    case_insensitive: bool,
    dir_cache: DirectoryCache<String>,
    format_cache: HashMap<String, String>,
    overrides: Option<OverrideRef>,
}

impl CasFs {
    pub fn new(store: CasStore, root_entry: DirEnt) -> Self {
        CasFs {
            store,
            codecs: CodecRegistry::with_defaults(),
            root_entry,
            case_insensitive: false,
            dir_cache: DirectoryCache::new(),
            format_cache: HashMap::new(),
            overrides: None,
        }
    }

    /// Open an existing store and root the filesystem at `root_ref`, a hex
    /// digest naming the root directory's blob.
    pub fn open(store: CasStore, root_ref: &str) -> Self {
        let root_entry = DirEnt::bare(
            RawName::from_str(""),
            EntryKind::Dir,
            Some(RawName::from_str(root_ref)),
        );
        Self::new(store, root_entry)
    }

    pub fn with_case_insensitive(mut self, flag: bool) -> Self {
        self.case_insensitive = flag;
        self
    }

    pub fn store(&self) -> &CasStore {
        &self.store
    }

    pub fn root_entry(&self) -> &DirEnt {
        &self.root_entry
    }

    pub fn has_pending_changes(&self) -> bool {
        self.overrides.is_some()
    }

    fn fold_key(&self, name: &RawName) -> String {
        let s = name.to_string_lossy();
        if self.case_insensitive {
            s.to_lowercase()
        } else {
            s
        }
    }

    /// Fetch and decode a directory by its hex-digest ref, through the
    /// weak/strong cache, tracking which codec produced it.
    #[instrument(skip(self), level = "debug")]
    pub fn get_dir(&mut self, reference: &RawName) -> Result<(Arc<Directory>, String)> {
        let hex = reference.to_string_lossy();
        if let Some(dir) = self.dir_cache.get(&hex) {
            let format_name = self.format_cache.get(&hex).cloned().unwrap_or_default();
            return Ok((dir, format_name));
        }

        let digest = self
            .store
            .hex_to_digest(&hex)
            .ok_or_else(|| CasFsError::MissingBlob(hex.clone()))?;
        let bytes = match self.store.get_bytes(&digest) {
            Ok(b) => b,
            Err(casfs_cas::CasError::NotFound(_)) => return Err(CasFsError::MissingBlob(hex)),
            Err(e) => return Err(e.into()),
        };

        let format_name = casfs_codec::peek_format_name(&bytes)?.to_string();
        let dir = self.codecs.load(&bytes)?;
        debug!(hex = %hex, format_name = %format_name, "decoded directory blob");
        self.format_cache.insert(hex.clone(), format_name.clone());
        let arc = self.dir_cache.put(hex, dir);
        Ok((arc, format_name))
    }

    fn start_cursor(&self) -> Cursor {
        match &self.overrides {
            Some(root) => Cursor {
                entry: root.borrow().entry.clone(),
                override_node: Some(root.clone()),
            },
            None => Cursor { entry: self.root_entry.clone(), override_node: None },
        }
    }

    fn lookup_backing(&mut self, tail: &Cursor, component: &RawName) -> Result<Option<Cursor>> {
        let reference = match &tail.entry.reference {
            Some(r) => r.clone(),
            None => return Ok(None),
        };
        let (dir, _format) = self.get_dir(&reference)?;
        let found = if self.case_insensitive {
            let key = self.fold_key(component);
            dir.entries.iter().find(|e| self.fold_key(&e.name) == key)
        } else {
            dir.find(component)
        };
        Ok(found.map(|e| Cursor { entry: e.clone(), override_node: None }))
    }

    /// The path-resolution algorithm (§4.4.1). Returns one [`DirEnt`] per
    /// component, the root included at index 0, walking symlinks and `..`
    /// with kernel-style semantics.
    pub fn resolve(&mut self, components: &[RawName], flags: ResolveFlags) -> Result<Vec<DirEnt>> {
        let mut nodes = vec![self.start_cursor()];
        let mut queue: VecDeque<RawName> = components.iter().cloned().collect();
        let mut hops = 0usize;

        while let Some(component) = queue.front().cloned() {
            let tail = nodes.last().unwrap().clone();

            if tail.entry.kind == EntryKind::Symlink && flags.follow_symlinks {
                nodes.pop();
                hops += 1;
                if hops > SYMLINK_HOP_LIMIT {
                    return Err(CasFsError::InvalidSymlink(format!(
                        "exceeded {} hops resolving symlink chain",
                        SYMLINK_HOP_LIMIT
                    )));
                }
                let target = match tail.entry.reference.as_ref().map(|r| r.to_string_lossy()) {
                    Some(t) if !t.is_empty() => t,
                    _ => {
                        return Err(CasFsError::InvalidSymlink(format!(
                            "symlink {:?} has an empty or missing target",
                            tail.entry.name.to_string_lossy()
                        )))
                    }
                };
                let absolute = target.starts_with('/');
                let target_tail = target.strip_prefix('/').unwrap_or(&target);
                let target_components: Vec<RawName> = if target_tail.is_empty() {
                    Vec::new()
                } else {
                    target_tail.split('/').map(RawName::from_str).collect()
                };
                if absolute {
                    nodes.clear();
                    nodes.push(self.start_cursor());
                }
                for c in target_components.into_iter().rev() {
                    queue.push_front(c);
                }
                continue;
            }

            if tail.entry.kind != EntryKind::Dir {
                if flags.mkdir > 1 {
                    let mut coerced = tail.entry.clone();
                    coerced.kind = EntryKind::Dir;
                    coerced.reference = None;
                    nodes.pop();
                    nodes.push(Cursor { entry: coerced, override_node: tail.override_node.clone() });
                } else {
                    return Err(CasFsError::NotADirectory(tail.entry.name.to_string_lossy()));
                }
            }

            let component = queue.pop_front().unwrap();
            let name_str = component.to_string_lossy();
            match name_str.as_str() {
                "" | "." => {}
                ".." => {
                    if nodes.len() > 1 {
                        nodes.pop();
                    }
                }
                _ => {
                    let tail = nodes.last().unwrap().clone();
                    let key = self.fold_key(&component);

                    let looked_up = match &tail.override_node {
                        Some(node) => {
                            let slot = node.borrow().subtree.get(&key).cloned();
                            match slot {
                                Some(OverrideSlot::Present(child)) => {
                                    let entry = child.borrow().entry.clone();
                                    Some(Cursor { entry, override_node: Some(child) })
                                }
                                Some(OverrideSlot::Unlinked) => None,
                                None => self.lookup_backing(&tail, &component)?,
                            }
                        }
                        None => self.lookup_backing(&tail, &component)?,
                    };

                    match looked_up {
                        Some(cursor) => nodes.push(cursor),
                        None => {
                            if flags.partial || flags.mkdir > 0 {
                                let kind = if queue.is_empty() { EntryKind::File } else { EntryKind::Dir };
                                nodes.push(Cursor {
                                    entry: DirEnt::bare(component.clone(), kind, None),
                                    override_node: None,
                                });
                            } else {
                                return Err(CasFsError::NoSuchEntry(name_str));
                            }
                        }
                    }
                }
            }
        }

        Ok(nodes.into_iter().map(|c| c.entry).collect())
    }

    /// Resolve a `/`-separated string path.
    pub fn resolve_path(&mut self, path: &str, flags: ResolveFlags) -> Result<Vec<DirEnt>> {
        self.resolve(&split_path(path), flags)
    }

    fn mutate_path(&mut self, components: &[RawName], op: MutationOp) -> Result<()> {
        if components.is_empty() {
            return Err(CasFsError::RootMutation);
        }
        let nodes = self.resolve(components, ResolveFlags::mutating())?;

        if self.overrides.is_none() {
            self.overrides = Some(Rc::new(RefCell::new(OverrideNode::leaf(self.root_entry.clone()))));
        }
        let mut current = self.overrides.clone().unwrap();

        for (i, component) in components.iter().enumerate() {
            let key = self.fold_key(component);
            let is_last = i + 1 == components.len();

            if is_last {
                let preserved_subtree = match current.borrow().subtree.get(&key) {
                    Some(OverrideSlot::Present(existing)) => existing.borrow().subtree.clone(),
                    _ => HashMap::new(),
                };
                let new_slot = match &op {
                    MutationOp::Unlink => OverrideSlot::Unlinked,
                    MutationOp::Replace(new_entry) => OverrideSlot::Present(Rc::new(RefCell::new(
                        OverrideNode { entry: new_entry.clone(), subtree: preserved_subtree },
                    ))),
                    MutationOp::Update(changes) => {
                        let base = nodes[i + 1].clone();
                        let merged = changes.apply(&base);
                        OverrideSlot::Present(Rc::new(RefCell::new(OverrideNode {
                            entry: merged,
                            subtree: preserved_subtree,
                        })))
                    }
                };
                current.borrow_mut().subtree.insert(key, new_slot);
            } else {
                let existing = current.borrow().subtree.get(&key).cloned();
                let next = match existing {
                    Some(OverrideSlot::Present(child)) => child,
                    _ => {
                        let entry = nodes[i + 1].clone();
                        let fresh = Rc::new(RefCell::new(OverrideNode::leaf(entry)));
                        current.borrow_mut().subtree.insert(key, OverrideSlot::Present(fresh.clone()));
                        fresh
                    }
                };
                current = next;
            }
        }
        Ok(())
    }

    /// Replace the entry at `path` entirely, preserving any already-recorded
    /// overrides beneath it.
    pub fn set_path(&mut self, path: &str, mut entry: DirEnt) -> Result<()> {
        let components = split_path(path);
        let last = components.last().cloned().ok_or(CasFsError::RootMutation)?;
        entry.name = last;
        self.mutate_path(&components, MutationOp::Replace(entry))
    }

    /// Apply a sparse set of field edits to the entry at `path`.
    pub fn update_path(&mut self, path: &str, changes: EntryChanges) -> Result<()> {
        let components = split_path(path);
        self.mutate_path(&components, MutationOp::Update(changes))
    }

    /// Remove the entry at `path`, masking any backing entry of the same
    /// name even if one exists.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let components = split_path(path);
        self.mutate_path(&components, MutationOp::Unlink)
    }

    /// Discard all uncommitted overrides.
    pub fn rollback(&mut self) {
        self.overrides = None;
    }

    fn hash_of_empty_dir(&mut self, codec_name: &str) -> Result<String> {
        let empty = Directory::new(Default::default(), Vec::new());
        let blob = self.codecs.encode(codec_name, &empty)?;
        let digest = self.store.put(&blob, &PutOptions::default())?;
        Ok(digest.to_hex())
    }

    /// Create an empty directory at `path`, including any missing ancestors.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let hash = self.hash_of_empty_dir(DEFAULT_CODEC)?;
        let entry = DirEnt::bare(RawName::from_str(""), EntryKind::Dir, Some(RawName::from_str(&hash)));
        self.set_path(path, entry)
    }

    /// Update `modify_ts`, creating the file (with no content) if missing.
    pub fn touch(&mut self, path: &str, now: i64) -> Result<()> {
        self.update_path(path, EntryChanges::touch(now))
    }

    /// Fold the overlay tree back into the backing store, bottom-up.
    /// Subtrees untouched since the last commit are carried forward by
    /// reference, never re-encoded.
    pub fn commit(&mut self) -> Result<()> {
        let Some(root) = self.overrides.take() else {
            return Ok(());
        };
        let new_ref = self.commit_node(&root)?;
        let mut new_root = self.root_entry.clone();
        new_root.reference = Some(new_ref);
        self.root_entry = new_root;
        Ok(())
    }

    fn commit_node(&mut self, node: &OverrideRef) -> Result<RawName> {
        let (entry_kind, backing_ref, subtree) = {
            let n = node.borrow();
            (n.entry.kind, n.entry.reference.clone(), n.subtree.clone())
        };

        if entry_kind != EntryKind::Dir {
            return backing_ref.ok_or_else(|| {
                CasFsError::MissingBlob("non-directory entry committed without content".to_string())
            });
        }

        let mut entries = Vec::new();
        let mut codec_name = None;

        if let Some(backing) = &backing_ref {
            if let Ok((dir, format_name)) = self.get_dir(backing) {
                codec_name = Some(format_name);
                for e in dir.entries.iter() {
                    let key = self.fold_key(&e.name);
                    if !subtree.contains_key(&key) {
                        entries.push(e.clone());
                    }
                }
            }
        }

        for slot in subtree.values() {
            let child = match slot {
                OverrideSlot::Unlinked => continue,
                OverrideSlot::Present(child) => child,
            };
            let (child_kind, has_subtree) = {
                let c = child.borrow();
                (c.entry.kind, !c.subtree.is_empty())
            };
            let mut child_entry = child.borrow().entry.clone();
            if child_kind == EntryKind::Dir && (has_subtree || child_entry.reference.is_none()) {
                let new_ref = self.commit_node(child)?;
                child_entry.reference = Some(new_ref);
            }
            entries.push(child_entry);
        }

        let mut seen = HashSet::new();
        for e in &entries {
            if !seen.insert(e.name.as_bytes().to_vec()) {
                return Err(CasFsError::NameConflict(e.name.to_string_lossy()));
            }
        }

        let codec = codec_name.unwrap_or_else(|| DEFAULT_CODEC.to_string());

        if entries.is_empty() {
            let hex = self.hash_of_empty_dir(&codec)?;
            return Ok(RawName::from_str(&hex));
        }

        let directory = Directory::new(Default::default(), entries);
        let blob = self.codecs.encode(&codec, &directory)?;
        let digest = self.store.put(&blob, &PutOptions::default())?;
        Ok(RawName::from_str(&digest.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfs_cas::{DigestAlgorithm, Fanout};
    use tempfile::TempDir;

    fn new_store(temp: &TempDir) -> CasStore {
        CasStore::create(temp.path(), DigestAlgorithm::Sha256, Fanout::default_pattern()).unwrap()
    }

    fn put_dir(fs: &mut CasFs, entries: Vec<DirEnt>) -> RawName {
        let directory = Directory::new(Default::default(), entries);
        let blob = fs.codecs.encode(DEFAULT_CODEC, &directory).unwrap();
        let digest = fs.store.put(&blob, &PutOptions::default()).unwrap();
        RawName::from_str(&digest.to_hex())
    }

    fn file_entry(name: &str, contents: &[u8], store: &CasStore) -> DirEnt {
        let digest = store.put(contents, &PutOptions::default()).unwrap();
        DirEnt::bare(RawName::from_str(name), EntryKind::File, Some(RawName::from_str(&digest.to_hex())))
    }

    fn open_fs(temp: &TempDir, root_ref: &RawName) -> CasFs {
        let store = new_store(temp);
        CasFs::open(store, &root_ref.to_string_lossy())
    }

    #[test]
    fn resolve_ascending_past_root_clamps_to_root() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let root_ref = put_dir(&mut fs, Vec::new());
        let mut fs = open_fs(&temp, &root_ref);

        let nodes = fs.resolve_path("/../../..", ResolveFlags::lookup()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].reference.as_ref().unwrap(), &root_ref);
    }

    #[test]
    fn resolve_symlink_with_empty_target_is_invalid() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let link = DirEnt::bare(RawName::from_str("broken"), EntryKind::Symlink, None);
        let root_ref = put_dir(&mut fs, vec![link]);
        let mut fs = open_fs(&temp, &root_ref);

        let err = fs.resolve_path("/broken/", ResolveFlags::lookup()).unwrap_err();
        assert!(matches!(err, CasFsError::InvalidSymlink(_)), "expected InvalidSymlink, got {err:?}");
    }

    #[test]
    fn resolve_symlink_without_trailing_slash_yields_the_link_itself() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let target = file_entry("real.txt", b"hello", &store);
        let link = DirEnt::bare(RawName::from_str("alias"), EntryKind::Symlink, Some(RawName::from_str("real.txt")));
        let root_ref = put_dir(&mut fs, vec![target, link]);
        let mut fs = open_fs(&temp, &root_ref);

        let nodes = fs.resolve_path("/alias", ResolveFlags::lookup()).unwrap();
        let last = nodes.last().unwrap();
        assert_eq!(last.name.as_str(), Some("alias"));
        assert_eq!(last.kind, EntryKind::Symlink);
    }

    #[test]
    fn resolve_symlink_with_trailing_slash_follows_to_target() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let target = file_entry("real.txt", b"hello", &store);
        let link = DirEnt::bare(RawName::from_str("alias"), EntryKind::Symlink, Some(RawName::from_str("real.txt")));
        let root_ref = put_dir(&mut fs, vec![target, link]);
        let mut fs = open_fs(&temp, &root_ref);

        let nodes = fs.resolve_path("/alias/", ResolveFlags::lookup()).unwrap();
        let last = nodes.last().unwrap();
        assert_eq!(last.name.as_str(), Some("real.txt"));
        assert_eq!(last.kind, EntryKind::File);
    }

    #[test]
    fn set_path_then_commit_materializes_new_entry() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store, DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let root_ref = put_dir(&mut fs, Vec::new());
        let mut fs = open_fs(&temp, &root_ref);

        let new_file = DirEnt::bare(RawName::from_str("new.txt"), EntryKind::File, None);
        fs.set_path("/new.txt", new_file).unwrap();
        assert!(fs.has_pending_changes());
        fs.commit().unwrap();
        assert!(!fs.has_pending_changes());

        let nodes = fs.resolve_path("/new.txt", ResolveFlags::lookup()).unwrap();
        assert_eq!(nodes.last().unwrap().name.as_str(), Some("new.txt"));
    }

    #[test]
    fn unlink_masks_backing_entry() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));
        let file = file_entry("doomed.txt", b"bye", &store);
        let root_ref = put_dir(&mut fs, vec![file]);
        let mut fs = open_fs(&temp, &root_ref);

        fs.unlink("/doomed.txt").unwrap();
        let err = fs.resolve_path("/doomed.txt", ResolveFlags::lookup()).unwrap_err();
        assert!(matches!(err, CasFsError::NoSuchEntry(_)));

        fs.commit().unwrap();
        let err = fs.resolve_path("/doomed.txt", ResolveFlags::lookup()).unwrap_err();
        assert!(matches!(err, CasFsError::NoSuchEntry(_)));
    }

    #[test]
    fn commit_shares_untouched_sibling_subtree() {
        let temp = TempDir::new().unwrap();
        let store = new_store(&temp);
        let mut fs = CasFs::new(store.clone(), DirEnt::bare(RawName::from_str(""), EntryKind::Dir, None));

        let untouched_file = file_entry("stable.txt", b"unchanged", &store);
        let untouched_ref = put_dir(&mut fs, vec![untouched_file]);
        let untouched_dir = DirEnt::bare(RawName::from_str("untouched"), EntryKind::Dir, Some(untouched_ref.clone()));

        let touched_file = file_entry("before.txt", b"before", &store);
        let touched_ref = put_dir(&mut fs, vec![touched_file]);
        let touched_dir = DirEnt::bare(RawName::from_str("touched"), EntryKind::Dir, Some(touched_ref));

        let root_ref = put_dir(&mut fs, vec![untouched_dir, touched_dir]);
        let mut fs = open_fs(&temp, &root_ref);

        let new_file = DirEnt::bare(RawName::from_str("after.txt"), EntryKind::File, None);
        fs.set_path("/touched/after.txt", new_file).unwrap();
        fs.commit().unwrap();

        let nodes = fs.resolve_path("/untouched", ResolveFlags::lookup()).unwrap();
        let committed_untouched_ref = nodes.last().unwrap().reference.clone().unwrap();
        assert_eq!(committed_untouched_ref, untouched_ref, "untouched subtree must be carried forward unchanged");
    }
}
