//! The `Path` convenience wrapper (§4.5): a component sequence bound to a
//! filesystem, resolved lazily and cached on first use.

use casfs_cas::FileHandle;
use casfs_codec::{DirEnt, EntryKind, RawName};

use crate::error::{CasFsError, Result};
use crate::fs::{CasFs, ResolveFlags};
use crate::pathutil::split_path;

pub struct FsPath<'fs> {
    fs: &'fs mut CasFs,
    components: Vec<RawName>,
    cached: Option<Vec<DirEnt>>,
}

impl<'fs> FsPath<'fs> {
    pub fn new(fs: &'fs mut CasFs, path: &str) -> Self {
        FsPath { fs, components: split_path(path), cached: None }
    }

    pub fn names(&self) -> &[RawName] {
        &self.components
    }

    /// Resolve (once, then cached) the full chain of entries from root to
    /// this path's tail, following symlinks along the way.
    pub fn entries(&mut self) -> Result<&[DirEnt]> {
        if self.cached.is_none() {
            let nodes = self.fs.resolve(&self.components, ResolveFlags::lookup())?;
            self.cached = Some(nodes);
        }
        Ok(self.cached.as_ref().unwrap())
    }

    pub fn final_entry(&mut self) -> Result<&DirEnt> {
        let nodes = self.entries()?;
        Ok(nodes.last().unwrap())
    }

    pub fn kind(&mut self) -> Result<EntryKind> {
        Ok(self.final_entry()?.kind)
    }

    /// Consume this path and build a new one with `extra` appended,
    /// reusing the same filesystem borrow.
    pub fn subpath(self, extra: &str) -> FsPath<'fs> {
        let mut combined = self.components;
        combined.extend(split_path(extra));
        FsPath { fs: self.fs, components: combined, cached: None }
    }

    /// The content ref of a file entry, or an error if the tail isn't a file.
    pub fn file(&mut self) -> Result<RawName> {
        let entry = self.final_entry()?;
        if entry.kind != EntryKind::File {
            return Err(CasFsError::NotADirectory(entry.name.to_string_lossy()));
        }
        entry
            .reference
            .clone()
            .ok_or_else(|| CasFsError::MissingBlob(entry.name.to_string_lossy()))
    }

    /// Open the backing blob of a file entry for reading.
    pub fn open(&mut self) -> Result<FileHandle> {
        let reference = self.file()?;
        let hex = reference.to_string_lossy();
        let digest = self
            .fs
            .store()
            .hex_to_digest(&hex)
            .ok_or_else(|| CasFsError::MissingBlob(hex.clone()))?;
        self.fs
            .store()
            .get(&digest)?
            .ok_or(CasFsError::MissingBlob(hex))
    }
}
