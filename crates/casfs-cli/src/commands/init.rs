use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;
use casfs_cas::{CasStore, DigestAlgorithm, Fanout};

use super::now_epoch;

/// `casbak init`: lay out `casbak.conf.json`/`casbak.log`/`casbak.snapshots`
/// and bootstrap the CAS root they point at.
pub fn run(casbak_dir: &Path) -> Result<()> {
    let backup = BackupDir::init(casbak_dir)
        .with_context(|| format!("initializing backup directory at {}", casbak_dir.display()))?;

    let cas_path = backup.cas_path()?;
    CasStore::create(&cas_path, DigestAlgorithm::Sha256, Fanout::default_pattern())
        .with_context(|| format!("creating CAS store at {}", cas_path.display()))?;

    backup.log_event(
        &casfs_backup::date::epoch_to_canonical(now_epoch()),
        &format!("init {}", casbak_dir.display()),
    )?;

    println!("initialized backup directory at {}", casbak_dir.display());
    Ok(())
}
