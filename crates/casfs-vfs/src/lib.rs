//! # casfs-vfs
//!
//! The CAS-backed virtual filesystem (§4.4-§4.7): path resolution over a
//! backing directory tree, an in-memory mutation overlay, commit back into
//! the store, and the `Scanner`/`Extractor` collaborator interfaces that
//! bridge to a real filesystem for import/export.

pub mod error;
pub mod extractor;
pub mod fs;
pub mod overlay;
pub mod path;
pub mod pathutil;
pub mod scanner;

pub use error::{CasFsError, Result};
pub use extractor::{Extractor, FsExtractor};
pub use fs::{CasFs, ResolveFlags};
pub use overlay::EntryChanges;
pub use path::FsPath;
pub use scanner::{ScanRecord, Scanner, WalkdirScanner};
