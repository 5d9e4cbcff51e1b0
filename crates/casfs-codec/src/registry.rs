//! A process-wide map from format-name to codec implementation,
//! populated at load time with the three built-in codecs.

use std::collections::HashMap;

use crate::error::{CodecError, Result};
use crate::framing;
use crate::minimal::{MinimalCodec, ALIAS as MINIMAL_ALIAS};
use crate::unix_codec::UnixCodec;
use crate::universal::UniversalCodec;
use crate::{Codec, Directory};
use tracing::debug;

pub struct CodecRegistry {
    codecs: HashMap<String, Box<dyn Codec>>,
}

impl CodecRegistry {
    /// A registry pre-populated with `universal`, `unix`, and `minimal`
    /// (registered both as `"minimal"` and as `""`, its wire name).
    pub fn with_defaults() -> Self {
        let mut registry = CodecRegistry {
            codecs: HashMap::new(),
        };
        registry.register(Box::new(UniversalCodec));
        registry.register(Box::new(UnixCodec));
        let minimal = Box::new(MinimalCodec);
        registry.codecs.insert(MINIMAL_ALIAS.to_string(), minimal);
        registry
            .codecs
            .insert(String::new(), Box::new(MinimalCodec));
        registry
    }

    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    pub fn get(&self, format_name: &str) -> Result<&dyn Codec> {
        self.codecs
            .get(format_name)
            .map(|b| b.as_ref())
            .ok_or_else(|| CodecError::UnknownFormat(format_name.to_string()))
    }

    /// Peek the framing header and dispatch to the matching codec.
    pub fn load(&self, blob: &[u8]) -> Result<Directory> {
        let (format_name, body) = framing::read_header(blob)?;
        debug!(format_name, "dispatching directory blob to codec");
        let codec = self.get(format_name)?;
        codec.decode(body)
    }

    pub fn encode(&self, format_name: &str, dir: &Directory) -> Result<Vec<u8>> {
        self.get(format_name)?.encode(dir)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DirEnt, EntryKind};
    use crate::name::RawName;

    #[test]
    fn dispatches_by_format_name() {
        let registry = CodecRegistry::with_defaults();
        let dir = Directory::new(
            Default::default(),
            vec![DirEnt::bare(RawName::from_str("x"), EntryKind::File, None)],
        );
        for name in ["universal", "unix", "minimal"] {
            let encoded = registry.encode(name, &dir).unwrap();
            let decoded = registry.load(&encoded).unwrap();
            assert_eq!(decoded.entries.len(), 1);
        }
    }

    #[test]
    fn unknown_format_fails() {
        let registry = CodecRegistry::with_defaults();
        match registry.get("exotic") {
            Err(err) => assert!(matches!(err, CodecError::UnknownFormat(_))),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn load_rejects_malformed_blob() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.load(b"garbage").is_err());
    }
}
