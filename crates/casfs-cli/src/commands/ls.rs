use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;
use casfs_cas::CasStore;
use casfs_codec::EntryKind;
use casfs_vfs::{CasFs, FsPath};

use super::now_epoch;

/// `casbak ls [path] [--at SPEC]`: list the entries of a directory (or show
/// a single file's stat line) as of the selected snapshot.
pub fn run(casbak_dir: &Path, path: &str, at: Option<&str>) -> Result<()> {
    let backup = BackupDir::open(casbak_dir)
        .with_context(|| format!("opening backup directory at {}", casbak_dir.display()))?;

    let snapshot = match at {
        Some(spec) => backup
            .snapshot_at(spec, now_epoch())?
            .ok_or_else(|| anyhow::anyhow!("no snapshot at or before {:?}", spec))?,
        None => backup
            .snapshots()
            .last()
            .ok_or_else(|| anyhow::anyhow!("backup directory has no snapshots yet"))?,
    };

    let cas_path = backup.cas_path()?;
    let store = CasStore::open(&cas_path)?;
    let mut fs = CasFs::open(store, &snapshot.hash);

    let kind = FsPath::new(&mut fs, path).kind()?;
    if kind != EntryKind::Dir {
        println!("{}", path);
        return Ok(());
    }

    let reference = FsPath::new(&mut fs, path)
        .final_entry()?
        .reference
        .clone()
        .ok_or_else(|| anyhow::anyhow!("directory {:?} has no content", path))?;
    let (dir, _format) = fs.get_dir(&reference)?;
    for entry in dir.entries.iter() {
        let suffix = if entry.kind == EntryKind::Dir { "/" } else { "" };
        println!("{}{}", entry.name.to_string_lossy(), suffix);
    }
    Ok(())
}
