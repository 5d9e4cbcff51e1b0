use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;
use casfs_cas::CasStore;
use casfs_codec::{DirEnt, EntryKind, RawName};
use casfs_vfs::{CasFs, Extractor, FsExtractor};

use super::now_epoch;

/// `casbak export <dest> [--at SPEC]`: materialize the snapshot selected by
/// `at` (or the most recent one) onto the real filesystem at `dest`.
pub fn run(casbak_dir: &Path, dest: &Path, at: Option<&str>) -> Result<()> {
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

    std::fs::create_dir_all(dest)?;
    let root = DirEnt::bare(RawName::from_str(""), EntryKind::Dir, Some(RawName::from_str(&snapshot.hash)));
    FsExtractor::new(&mut fs)
        .extract(&root, dest)
        .with_context(|| format!("extracting snapshot {} to {}", snapshot.hash, dest.display()))?;

    println!("exported {} to {}", snapshot.hash, dest.display());
    Ok(())
}
