use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;

/// `casbak mount <mountpoint> [--at SPEC]`: mount the selected snapshot
/// read-only via FUSE. Requires the `fuse` feature on Linux.
pub fn run(casbak_dir: &Path, mountpoint: &Path, at: Option<&str>) -> Result<()> {
    let backup = BackupDir::open(casbak_dir)
        .with_context(|| format!("opening backup directory at {}", casbak_dir.display()))?;

    let snapshot = match at {
        Some(spec) => backup
            .snapshot_at(spec, super::now_epoch())?
            .ok_or_else(|| anyhow::anyhow!("no snapshot at or before {:?}", spec))?,
        None => backup
            .snapshots()
            .last()
            .ok_or_else(|| anyhow::anyhow!("backup directory has no snapshots yet"))?,
    };

    mount_impl(&backup, &snapshot.hash, mountpoint)
}

#[cfg(feature = "fuse")]
fn mount_impl(backup: &BackupDir, root_hash: &str, mountpoint: &Path) -> Result<()> {
    use casfs_cas::CasStore;
    use casfs_fuse::CasFsFuse;
    use casfs_vfs::CasFs;

    let cas_path = backup.cas_path()?;
    let store = CasStore::open(&cas_path)?;
    let fs = CasFs::open(store, root_hash);
    CasFsFuse::new(fs)?.mount(mountpoint)
}

#[cfg(not(feature = "fuse"))]
fn mount_impl(_backup: &BackupDir, _root_hash: &str, _mountpoint: &Path) -> Result<()> {
    anyhow::bail!("this build was compiled without the `fuse` feature")
}
