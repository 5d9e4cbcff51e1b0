//! # casfs-cas
//!
//! Content-addressable blob store: maps `digest -> bytes` with
//! deduplication, atomic insertion, optional cross-store hard-linking, and
//! self-validation.
//!
//! ## Directory layout
//!
//! ```text
//! <root>/
//! ├── conf/
//! │   ├── VERSION   # "casfs-cas <version>\n"
//! │   ├── digest     # chosen algorithm name, e.g. "sha256"
//! │   └── fanout     # e.g. "1 2"
//! └── <fanout-split hex digest>
//! ```
//!
//! The store is deliberately a simple, single-backend implementation: no
//! compression, no delta encoding, no network protocol.

mod digest;
mod fanout;

pub use digest::DigestAlgorithm;
pub use fanout::Fanout;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

const PACKAGE_NAME: &str = "casfs-cas";
const PACKAGE_VERSION: &str = "1";

const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// A raw digest value, rendered as lowercase hex for display and comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        digest::to_hex(&self.0)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Errors raised by blob store operations.
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt store at {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("digest algorithm mismatch: store uses {expected}, caller requested {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Outcome of [`CasStore::validate`]. Any read or decode failure is reported
/// as `Invalid` rather than propagated, so a validation sweep never aborts
/// partway through a large store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid,
    Missing,
}

/// Out-parameter accumulating counters for a batch of `put` calls.
#[derive(Debug, Default, Clone)]
pub struct PutStats {
    pub new_file_count: u64,
    pub new_files: Vec<String>,
}

/// Flags controlling [`CasStore::put`].
#[derive(Debug, Default, Clone)]
pub struct PutOptions {
    /// Compute the digest but do not persist anything.
    pub dry_run: bool,
    /// Caller asserts this is the digest of the data; skip hashing unless
    /// `verify_hash` is also set.
    pub known_hash: Option<Digest>,
    /// Re-verify `known_hash` against the data even though it was supplied.
    pub verify_hash: bool,
    /// Local filesystem path whose inode may be reused via `link(2)` instead
    /// of copying bytes.
    pub hardlink_source: Option<PathBuf>,
}

/// A reader bound to a stored blob, supporting sequential and random access.
pub struct FileHandle {
    file: File,
    len: u64,
}

impl FileHandle {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(FileHandle { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Memory-map the blob for zero-copy reads of large files.
    pub fn mmap(&self) -> Result<memmap2::Mmap> {
        // Content at a digest-named path is never rewritten in place once it
        // exists, so the mapping stays valid for the handle's lifetime.
        unsafe { memmap2::Mmap::map(&self.file) }.map_err(CasError::Io)
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Content-addressable blob store.
#[derive(Debug, Clone)]
pub struct CasStore {
    root: PathBuf,
    algorithm: DigestAlgorithm,
    fanout: Fanout,
    hash_of_null: Digest,
}

impl CasStore {
    /// Create a new store at `root`, or validate an existing one matches
    /// `algorithm`/`fanout`.
    pub fn create<P: AsRef<Path>>(
        root: P,
        algorithm: DigestAlgorithm,
        fanout: Fanout,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let conf_dir = root.join("conf");
        fs::create_dir_all(&conf_dir)?;

        let version_path = conf_dir.join("VERSION");
        let digest_path = conf_dir.join("digest");
        let fanout_path = conf_dir.join("fanout");

        if digest_path.exists() {
            return Self::open_checked(root, Some(algorithm), Some(&fanout));
        }

        fs::write(&version_path, format!("{} {}\n", PACKAGE_NAME, PACKAGE_VERSION))?;
        fs::write(&digest_path, algorithm.name())?;
        fs::write(&fanout_path, fanout.to_config_string())?;

        let hash_of_null = Digest::from_bytes(algorithm.hash(b""));
        Ok(CasStore {
            root,
            algorithm,
            fanout,
            hash_of_null,
        })
    }

    /// Open an existing store, trusting `conf/*` as the authoritative source
    /// of its digest algorithm and fanout pattern.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_checked(root.as_ref().to_path_buf(), None, None)
    }

    fn open_checked(
        root: PathBuf,
        expect_algorithm: Option<DigestAlgorithm>,
        expect_fanout: Option<&Fanout>,
    ) -> Result<Self> {
        let conf_dir = root.join("conf");
        let digest_path = conf_dir.join("digest");
        let fanout_path = conf_dir.join("fanout");
        let version_path = conf_dir.join("VERSION");

        for (label, path) in [
            ("VERSION", &version_path),
            ("digest", &digest_path),
            ("fanout", &fanout_path),
        ] {
            if !path.exists() {
                return Err(CasError::CorruptStore {
                    path: root.clone(),
                    reason: format!("missing conf/{}", label),
                });
            }
        }

        let algo_name = fs::read_to_string(&digest_path)?.trim().to_string();
        let algorithm = DigestAlgorithm::from_name(&algo_name).ok_or_else(|| CasError::CorruptStore {
            path: root.clone(),
            reason: format!("unknown digest algorithm {:?}", algo_name),
        })?;

        if let Some(expected) = expect_algorithm {
            if expected != algorithm {
                return Err(CasError::ConfigMismatch {
                    expected: algorithm.name().to_string(),
                    actual: expected.name().to_string(),
                });
            }
        }

        let fanout_str = fs::read_to_string(&fanout_path)?;
        let fanout = Fanout::parse_config_string(fanout_str.trim()).ok_or_else(|| CasError::CorruptStore {
            path: root.clone(),
            reason: format!("invalid fanout pattern {:?}", fanout_str),
        })?;

        if let Some(expected) = expect_fanout {
            if expected != &fanout {
                debug!("fanout pattern differs from requested; existing store wins");
            }
        }

        let hash_of_null = Digest::from_bytes(algorithm.hash(b""));
        Ok(CasStore {
            root,
            algorithm,
            fanout,
            hash_of_null,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hash_of_null(&self) -> &Digest {
        &self.hash_of_null
    }

    pub fn compute_digest(&self, data: &[u8]) -> Digest {
        Digest::from_bytes(self.algorithm.hash(data))
    }

    pub fn hex_to_digest(&self, hex_str: &str) -> Option<Digest> {
        digest::from_hex(hex_str, self.algorithm.len_bytes()).map(Digest::from_bytes)
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        let (dirs, filename) = self.fanout.split(&hex);
        let mut path = self.root.clone();
        for d in dirs {
            path.push(d);
        }
        path.push(filename);
        path
    }

    /// Store bytes, returning the content digest: optimistic hard-link fast
    /// path first, then temp-file + rename.
    #[instrument(skip(self, data, opts), level = "debug")]
    pub fn put(&self, data: &[u8], opts: &PutOptions) -> Result<Digest> {
        self.put_with_stats(data, opts, None)
    }

    pub fn put_with_stats(
        &self,
        data: &[u8],
        opts: &PutOptions,
        mut stats: Option<&mut PutStats>,
    ) -> Result<Digest> {
        if let Some(known) = &opts.known_hash {
            if !opts.verify_hash {
                let dest = self.blob_path(known);
                if dest.exists() {
                    return Ok(known.clone());
                }
                if let Some(source) = &opts.hardlink_source {
                    if opts.dry_run {
                        return Ok(known.clone());
                    }
                    if self.try_hardlink(source, &dest)? {
                        if let Some(stats) = stats.as_deref_mut() {
                            stats.new_file_count += 1;
                            stats.new_files.push(known.to_hex());
                        }
                        return Ok(known.clone());
                    }
                }
            }
        }

        let digest = match &opts.known_hash {
            Some(known) if !opts.verify_hash => known.clone(),
            _ => self.compute_digest(data),
        };

        if let (Some(known), true) = (&opts.known_hash, opts.verify_hash) {
            if known != &digest {
                return Err(CasError::HashMismatch {
                    expected: known.to_hex(),
                    actual: digest.to_hex(),
                });
            }
        }

        if opts.dry_run {
            return Ok(digest);
        }

        let dest = self.blob_path(&digest);
        if dest.exists() {
            return Ok(digest);
        }

        self.write_via_temp(&dest, data, opts.hardlink_source.as_deref())?;

        if let Some(stats) = stats {
            stats.new_file_count += 1;
            stats.new_files.push(digest.to_hex());
        }
        Ok(digest)
    }

    /// Store the contents of a real file, using it as the hardlink source by
    /// default so identical content dedupes at the inode level.
    pub fn put_file<P: AsRef<Path>>(&self, path: P) -> Result<Digest> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let opts = PutOptions {
            hardlink_source: Some(path.to_path_buf()),
            ..Default::default()
        };
        self.put(&data, &opts)
    }

    fn try_hardlink(&self, source: &Path, dest: &Path) -> Result<bool> {
        if fs::hard_link(source, dest).is_ok() {
            return Ok(true);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::hard_link(source, dest) {
            Ok(()) => Ok(true),
            Err(e) if dest.exists() => {
                debug!(?e, "hardlink raced with concurrent insert; deduplicated");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn write_via_temp(&self, dest: &Path, data: &[u8], hardlink_source: Option<&Path>) -> Result<()> {
        let parent = dest.parent().expect("blob path always has a parent");
        fs::create_dir_all(parent)?;

        let temp_name = format!(
            ".{}.{}.tmp",
            dest.file_name().unwrap().to_string_lossy(),
            std::process::id()
        );
        let temp_path = parent.join(temp_name);

        if let Some(source) = hardlink_source {
            if fs::hard_link(source, &temp_path).is_ok() {
                return self.rename_into_place(&temp_path, dest);
            }
        }

        {
            let mut file = File::create(&temp_path)?;
            for chunk in data.chunks(COPY_CHUNK_SIZE) {
                file.write_all(chunk)?;
            }
            file.sync_all()?;
        }
        self.rename_into_place(&temp_path, dest)
    }

    fn rename_into_place(&self, temp_path: &Path, dest: &Path) -> Result<()> {
        match fs::rename(temp_path, dest) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(temp_path);
                if dest.exists() {
                    // Another inserter won the race; content is identical by
                    // construction since both derive the same digest path.
                    Ok(())
                } else if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                    fs::rename(temp_path, dest).map_err(CasError::Io)
                } else {
                    Err(CasError::Io(e))
                }
            }
        }
    }

    /// Retrieve a reader bound to the blob, or `None` if absent.
    #[instrument(skip(self), level = "debug")]
    pub fn get(&self, digest: &Digest) -> Result<Option<FileHandle>> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(FileHandle::open(&path)?))
    }

    /// Read the full contents of a blob.
    pub fn get_bytes(&self, digest: &Digest) -> Result<Vec<u8>> {
        match self.get(digest)? {
            Some(mut handle) => handle.read_all(),
            None => Err(CasError::NotFound(digest.to_hex())),
        }
    }

    pub fn exists(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Re-hash stored bytes and compare against the claimed digest. Any I/O
    /// failure is reported as `Invalid`, never propagated, so a scan over
    /// many blobs never aborts on the first bad one.
    #[instrument(skip(self), level = "debug")]
    pub fn validate(&self, digest: &Digest) -> Validation {
        let path = self.blob_path(digest);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Validation::Missing,
            Err(e) => {
                warn!(?e, digest = %digest, "validate: read failed, reporting Invalid");
                return Validation::Invalid;
            }
        };
        let actual = self.compute_digest(&data);
        if &actual == digest {
            Validation::Valid
        } else {
            Validation::Invalid
        }
    }

    /// Delete a blob. Not reference-counted and not safe to run concurrently
    /// with any other store operation.
    pub fn delete(&self, digest: &Digest) -> Result<()> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Err(CasError::NotFound(digest.to_hex()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Lazily iterate over all stored digests. Each call starts a fresh,
    /// independent traversal.
    pub fn iterate(&self) -> Result<BlobIterator> {
        BlobIterator::new(&self.root, self.fanout.widths().len())
    }

    /// Open a log file under the store for append-only diagnostics.
    pub fn open_append_log(&self, name: &str) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(name))
            .map_err(CasError::Io)
    }
}

/// Iterator over every blob digest in the store, walking the fan-out tree
/// depth-first.
pub struct BlobIterator {
    stack: Vec<fs::ReadDir>,
    depth_remaining: Vec<usize>,
    prefix: Vec<String>,
}

impl BlobIterator {
    fn new(root: &Path, fanout_depth: usize) -> Result<Self> {
        let top = fs::read_dir(root)?;
        Ok(BlobIterator {
            stack: vec![top],
            depth_remaining: vec![fanout_depth],
            prefix: Vec::new(),
        })
    }
}

impl Iterator for BlobIterator {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(Ok(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name == "conf" || name.ends_with(".tmp") || name.starts_with('.') {
                        continue;
                    }
                    let depth = *self.depth_remaining.last().unwrap();
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    if depth > 0 && is_dir {
                        match fs::read_dir(entry.path()) {
                            Ok(rd) => {
                                self.stack.push(rd);
                                self.depth_remaining.push(depth - 1);
                                self.prefix.push(name);
                            }
                            Err(e) => return Some(Err(CasError::Io(e))),
                        }
                        continue;
                    }
                    if is_dir {
                        continue;
                    }
                    let digest = self.prefix.iter().cloned().chain(std::iter::once(name)).collect();
                    return Some(Ok(digest));
                }
                Some(Err(e)) => return Some(Err(CasError::Io(e))),
                None => {
                    self.stack.pop();
                    self.depth_remaining.pop();
                    if self.stack.is_empty() {
                        return None;
                    }
                    self.prefix.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> CasStore {
        CasStore::create(temp.path(), DigestAlgorithm::Sha1, Fanout::default_pattern()).unwrap()
    }

    #[test]
    fn empty_store_bootstrap_matches_known_sha1() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        assert_eq!(
            cas.hash_of_null().to_hex(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        let handle = cas.get(cas.hash_of_null()).unwrap();
        assert!(handle.is_none(), "empty blob is not implicitly materialized");
    }

    #[test]
    fn put_then_get_roundtrips() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let data = b"hello cas-fs";
        let digest = cas.put(data, &PutOptions::default()).unwrap();
        assert_eq!(cas.get_bytes(&digest).unwrap(), data);
    }

    #[test]
    fn put_is_idempotent_and_deduplicates() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let data = b"duplicate content";
        let mut stats = PutStats::default();
        let d1 = cas.put_with_stats(data, &PutOptions::default(), Some(&mut stats)).unwrap();
        let d2 = cas.put_with_stats(data, &PutOptions::default(), Some(&mut stats)).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(stats.new_file_count, 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let fake = cas.compute_digest(b"never stored");
        assert!(cas.get(&fake).unwrap().is_none());
    }

    #[test]
    fn validate_reports_valid_invalid_missing() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let digest = cas.put(b"payload", &PutOptions::default()).unwrap();
        assert_eq!(cas.validate(&digest), Validation::Valid);

        let missing = cas.compute_digest(b"absent");
        assert_eq!(cas.validate(&missing), Validation::Missing);

        let path = cas.blob_path(&digest);
        fs::write(&path, b"tampered").unwrap();
        assert_eq!(cas.validate(&digest), Validation::Invalid);
    }

    #[test]
    fn dry_run_does_not_persist() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let opts = PutOptions {
            dry_run: true,
            ..Default::default()
        };
        let digest = cas.put(b"ephemeral", &opts).unwrap();
        assert!(!cas.exists(&digest));
    }

    #[test]
    fn known_hash_skips_rehash_when_destination_exists() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let digest = cas.put(b"content", &PutOptions::default()).unwrap();

        let opts = PutOptions {
            known_hash: Some(digest.clone()),
            ..Default::default()
        };
        let result = cas.put(b"wrong bytes entirely", &opts).unwrap();
        assert_eq!(result, digest);
    }

    #[test]
    fn verify_hash_rejects_mismatch() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let wrong_digest = cas.compute_digest(b"not this");
        let opts = PutOptions {
            known_hash: Some(wrong_digest),
            verify_hash: true,
            ..Default::default()
        };
        let err = cas.put(b"actual content", &opts).unwrap_err();
        assert!(matches!(err, CasError::HashMismatch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn hardlink_source_dedups_by_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let src_dir = TempDir::new().unwrap();
        let data = vec![7u8; 1024 * 1024];
        let p1 = src_dir.path().join("a.bin");
        let p2 = src_dir.path().join("b.bin");
        fs::write(&p1, &data).unwrap();
        fs::write(&p2, &data).unwrap();

        let d1 = cas.put_file(&p1).unwrap();
        let d2 = cas.put_file(&p2).unwrap();
        assert_eq!(d1, d2);

        let blob_path = cas.blob_path(&d1);
        assert_eq!(fs::metadata(&blob_path).unwrap().ino(), fs::metadata(&p2).unwrap().ino());
    }

    #[test]
    fn delete_removes_blob() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let digest = cas.put(b"to be deleted", &PutOptions::default()).unwrap();
        cas.delete(&digest).unwrap();
        assert!(!cas.exists(&digest));
        assert!(matches!(cas.delete(&digest), Err(CasError::NotFound(_))));
    }

    #[test]
    fn iterate_finds_all_stored_blobs() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        let mut expected = std::collections::HashSet::new();
        for i in 0..20u8 {
            let digest = cas.put(&[i; 64], &PutOptions::default()).unwrap();
            expected.insert(digest.to_hex());
        }
        let found: std::collections::HashSet<String> =
            cas.iterate().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn iterate_is_restartable() {
        let temp = TempDir::new().unwrap();
        let cas = store(&temp);
        cas.put(b"one", &PutOptions::default()).unwrap();
        cas.put(b"two", &PutOptions::default()).unwrap();
        let first: Vec<_> = cas.iterate().unwrap().map(|r| r.unwrap()).collect();
        let second: Vec<_> = cas.iterate().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn open_rejects_store_with_different_algorithm() {
        let temp = TempDir::new().unwrap();
        let _ = store(&temp);
        let err = CasStore::create(temp.path(), DigestAlgorithm::Sha256, Fanout::default_pattern())
            .unwrap_err();
        assert!(matches!(err, CasError::ConfigMismatch { .. }));
    }

    #[test]
    fn open_missing_conf_fails_corrupt() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path()).unwrap();
        let err = CasStore::open(temp.path()).unwrap_err();
        assert!(matches!(err, CasError::CorruptStore { .. }));
    }
}
