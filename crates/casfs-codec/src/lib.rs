//! # casfs-codec
//!
//! Pluggable binary encodings for directory listings: a common framing
//! header plus three codecs (`universal`, `unix`, `minimal`) trading off
//! fidelity against size, and a registry that dispatches by format name.

mod entry;
mod error;
mod framing;
mod minimal;
mod name;
mod registry;
mod unix_codec;
mod universal;

pub use entry::{DirEnt, Directory, EntryKind};
pub use error::{CodecError, Result};
pub use name::RawName;
pub use registry::CodecRegistry;

/// Peek a directory blob's framing header without decoding its body.
pub fn peek_format_name(blob: &[u8]) -> Result<&str> {
    framing::read_header(blob).map(|(name, _)| name)
}

/// A directory codec: encodes/decodes a [`Directory`] to/from a framed blob.
pub trait Codec: Send + Sync {
    /// The wire format name written into the framing header by `encode`.
    fn name(&self) -> &'static str;
    fn encode(&self, dir: &Directory) -> Result<Vec<u8>>;
    /// Decode the portion of a blob after the framing header.
    fn decode(&self, body: &[u8]) -> Result<Directory>;
}

pub use minimal::MinimalCodec;
pub use unix_codec::UnixCodec;
pub use universal::UniversalCodec;
