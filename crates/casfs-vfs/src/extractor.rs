//! Extractor interface (§4.7, external collaborator): materializes entries
//! from the store onto a real filesystem.

use std::path::Path;

use casfs_codec::{DirEnt, EntryKind, RawName};
use tracing::warn;

use crate::error::{CasFsError, Result};
use crate::fs::CasFs;

/// Materializes one entry (recursively, for directories) at `dest`.
pub trait Extractor {
    fn extract(&mut self, entry: &DirEnt, dest: &Path) -> Result<()>;
}

/// Reference extractor writing real files, directories, symlinks, and
/// (on unix) device/FIFO nodes via `std::fs` and `nix::sys::stat`.
pub struct FsExtractor<'fs> {
    fs: &'fs mut CasFs,
}

impl<'fs> FsExtractor<'fs> {
    pub fn new(fs: &'fs mut CasFs) -> Self {
        FsExtractor { fs }
    }

    fn extract_file(&mut self, entry: &DirEnt, dest: &Path) -> Result<()> {
        let reference = entry
            .reference
            .as_ref()
            .ok_or_else(|| CasFsError::MissingBlob(entry.name.to_string_lossy()))?;
        let hex = reference.to_string_lossy();
        let digest = self
            .fs
            .store()
            .hex_to_digest(&hex)
            .ok_or_else(|| CasFsError::MissingBlob(hex.clone()))?;
        let bytes = self.fs.store().get_bytes(&digest)?;
        std::fs::write(dest, bytes)?;
        #[cfg(unix)]
        if let Some(mode) = entry.mode {
            set_mode(dest, mode)?;
        }
        Ok(())
    }

    fn extract_dir(&mut self, entry: &DirEnt, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        if let Some(reference) = entry.reference.clone() {
            let (dir, _) = self.fs.get_dir(&reference)?;
            let children: Vec<_> = dir.entries.clone();
            for child in &children {
                let child_path = dest.join(os_name(&child.name));
                self.extract(child, &child_path)?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn extract_symlink(&mut self, entry: &DirEnt, dest: &Path) -> Result<()> {
        let target = entry.reference.as_ref().map(|r| r.to_string_lossy()).unwrap_or_default();
        std::os::unix::fs::symlink(target, dest)?;
        Ok(())
    }

    #[cfg(unix)]
    fn extract_device(&mut self, entry: &DirEnt, dest: &Path, kind: EntryKind) -> Result<()> {
        use nix::sys::stat::{mknod, Mode, SFlag};
        let (major, minor) = parse_major_minor(entry)?;
        let sflag = if kind == EntryKind::BlockDev { SFlag::S_IFBLK } else { SFlag::S_IFCHR };
        let mode = Mode::from_bits_truncate(entry.mode.unwrap_or(0o600));
        let dev = nix::sys::stat::makedev(major.into(), minor.into());
        mknod(dest, sflag, mode, dev).map_err(|e| CasFsError::Io(std::io::Error::from(e)))?;
        Ok(())
    }

    #[cfg(unix)]
    fn extract_pipe(&mut self, entry: &DirEnt, dest: &Path) -> Result<()> {
        use nix::sys::stat::Mode;
        use nix::unistd::mkfifo;
        let mode = Mode::from_bits_truncate(entry.mode.unwrap_or(0o644));
        mkfifo(dest, mode).map_err(|e| CasFsError::Io(std::io::Error::from(e)))?;
        Ok(())
    }
}

impl<'fs> Extractor for FsExtractor<'fs> {
    fn extract(&mut self, entry: &DirEnt, dest: &Path) -> Result<()> {
        match entry.kind {
            EntryKind::File => self.extract_file(entry, dest),
            EntryKind::Dir => self.extract_dir(entry, dest),
            #[cfg(unix)]
            EntryKind::Symlink => self.extract_symlink(entry, dest),
            #[cfg(not(unix))]
            EntryKind::Symlink => {
                warn!(path = %dest.display(), "symlink extraction unsupported on this platform");
                Ok(())
            }
            #[cfg(unix)]
            EntryKind::BlockDev | EntryKind::CharDev => self.extract_device(entry, dest, entry.kind),
            #[cfg(not(unix))]
            EntryKind::BlockDev | EntryKind::CharDev => {
                warn!(path = %dest.display(), "device node extraction unsupported on this platform");
                Ok(())
            }
            #[cfg(unix)]
            EntryKind::Pipe => self.extract_pipe(entry, dest),
            #[cfg(not(unix))]
            EntryKind::Pipe => {
                warn!(path = %dest.display(), "fifo extraction unsupported on this platform");
                Ok(())
            }
            EntryKind::Socket => {
                warn!(path = %dest.display(), "skipping socket entry during extraction");
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(unix)]
fn parse_major_minor(entry: &DirEnt) -> Result<(u32, u32)> {
    if let Some(dev) = entry.dev {
        return Ok(((dev >> 8) as u32, (dev & 0xff) as u32));
    }
    let raw = entry.reference.as_ref().map(|r| r.to_string_lossy()).unwrap_or_default();
    let mut parts = raw.splitn(2, ',');
    let major = parts.next().and_then(|s| s.parse().ok());
    let minor = parts.next().and_then(|s| s.parse().ok());
    match (major, minor) {
        (Some(maj), Some(min)) => Ok((maj, min)),
        _ => Err(CasFsError::MissingBlob(format!(
            "device entry {:?} has no major,minor ref",
            entry.name.to_string_lossy()
        ))),
    }
}

#[cfg(unix)]
fn os_name(name: &RawName) -> std::ffi::OsString {
    use std::os::unix::ffi::OsStringExt;
    std::ffi::OsString::from_vec(name.as_bytes().to_vec())
}

#[cfg(not(unix))]
fn os_name(name: &RawName) -> std::ffi::OsString {
    std::ffi::OsString::from(name.to_string_lossy())
}
