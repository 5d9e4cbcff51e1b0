use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use casfs_backup::BackupDir;
use casfs_cas::{CasStore, PutOptions};
use casfs_codec::{CodecRegistry, DirEnt, Directory, EntryKind, RawName};
use casfs_vfs::{Scanner, WalkdirScanner};

use super::now_epoch;

/// `casbak import <source>`: recursively scan `source` into the backup's
/// CAS, reusing unchanged subtrees from the previous snapshot via the
/// scanner's `(size, modify_ts)` hint, and record a new snapshot.
pub fn run(casbak_dir: &Path, source: &Path, comment: Option<String>) -> Result<()> {
    let mut backup = BackupDir::open(casbak_dir)
        .with_context(|| format!("opening backup directory at {}", casbak_dir.display()))?;
    let cas_path = backup.cas_path()?;
    let store = CasStore::open(&cas_path)
        .with_context(|| format!("opening CAS store at {}", cas_path.display()))?;
    let codecs = CodecRegistry::with_defaults();

    let hint_root = backup
        .snapshots()
        .last()
        .map(|s| s.hash.clone())
        .and_then(|hex| load_dir(&store, &codecs, &hex).ok());

    let root_hash = import_tree(&store, &codecs, source, hint_root.as_ref())
        .with_context(|| format!("importing {}", source.display()))?;

    let timestamp = casfs_backup::date::epoch_to_canonical(now_epoch());
    backup.log_event(&timestamp, &format!("import {} -> {}", source.display(), root_hash))?;
    backup.record_snapshot(timestamp.clone(), root_hash.clone(), comment.unwrap_or_default())?;

    println!("{}\t{}", timestamp, root_hash);
    Ok(())
}

fn load_dir(store: &CasStore, codecs: &CodecRegistry, hex: &str) -> anyhow::Result<Directory> {
    let digest = store
        .hex_to_digest(hex)
        .ok_or_else(|| anyhow::anyhow!("malformed digest {:?}", hex))?;
    let bytes = store.get_bytes(&digest)?;
    Ok(codecs.load(&bytes)?)
}

fn import_tree(
    store: &CasStore,
    codecs: &CodecRegistry,
    dir_path: &Path,
    hint_dir: Option<&Directory>,
) -> Result<String> {
    let records = WalkdirScanner::new(store).scan(dir_path, hint_dir)?;

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        if record.kind == EntryKind::Dir {
            let child_path = dir_path.join(os_name(&record.name));
            let child_hint = hint_dir
                .and_then(|d| d.find(&record.name))
                .and_then(|e| e.reference.clone())
                .and_then(|r| load_dir(store, codecs, &r.to_string_lossy()).ok());

            let child_hash = import_tree(store, codecs, &child_path, child_hint.as_ref())?;
            let mut entry: DirEnt = record.into();
            entry.reference = Some(RawName::from_str(&child_hash));
            entries.push(entry);
        } else {
            entries.push(record.into());
        }
    }

    let directory = Directory::new(Default::default(), entries);
    let blob = codecs.encode("universal", &directory)?;
    let digest = store.put(&blob, &PutOptions::default())?;
    Ok(digest.to_hex())
}

#[cfg(unix)]
fn os_name(name: &RawName) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(name.as_bytes().to_vec())
}

#[cfg(not(unix))]
fn os_name(name: &RawName) -> OsString {
    OsString::from(name.to_string_lossy())
}
