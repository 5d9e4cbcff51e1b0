use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;

/// `casbak log`: print the snapshot index, most recent first.
pub fn run(casbak_dir: &Path) -> Result<()> {
    let backup = BackupDir::open(casbak_dir)
        .with_context(|| format!("opening backup directory at {}", casbak_dir.display()))?;

    for record in backup.snapshots().records().iter().rev() {
        println!("{}\t{}\t{}", record.timestamp, record.hash, record.comment);
    }
    Ok(())
}
