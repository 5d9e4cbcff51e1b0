//! Pluggable one-way hash algorithms for the blob store.
//!
//! The store records its chosen algorithm once, in `conf/digest`, at
//! creation time (§4.1). Every subsequent `put`/`get`/`validate` uses that
//! algorithm; opening a store with a different algorithm name fails with
//! [`crate::CasError::ConfigMismatch`].

use sha1::Sha1;
use sha2::Sha256;

/// A digest algorithm identified by name, as persisted in `conf/digest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    /// The name written to `conf/digest` and matched on `open`.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(DigestAlgorithm::Sha1),
            "sha256" => Some(DigestAlgorithm::Sha256),
            "blake3" => Some(DigestAlgorithm::Blake3),
            _ => None,
        }
    }

    /// Digest length in bytes (hex string is twice this).
    pub fn len_bytes(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Blake3 => 32,
        }
    }

    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => {
                use sha1::Digest;
                Sha1::digest(data).to_vec()
            }
            DigestAlgorithm::Sha256 => {
                use sha2::Digest;
                Sha256::digest(data).to_vec()
            }
            DigestAlgorithm::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }

    /// Incremental hasher for streaming input.
    pub fn hasher(&self) -> StreamingHasher {
        match self {
            DigestAlgorithm::Sha1 => StreamingHasher::Sha1(Box::new(<Sha1 as sha1::Digest>::new())),
            DigestAlgorithm::Sha256 => {
                StreamingHasher::Sha256(Box::new(<Sha256 as sha2::Digest>::new()))
            }
            DigestAlgorithm::Blake3 => StreamingHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

pub enum StreamingHasher {
    Sha1(Box<Sha1>),
    Sha256(Box<Sha256>),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamingHasher::Sha1(h) => {
                use sha1::Digest;
                h.update(chunk);
            }
            StreamingHasher::Sha256(h) => {
                use sha2::Digest;
                h.update(chunk);
            }
            StreamingHasher::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHasher::Sha1(h) => {
                use sha1::Digest;
                h.finalize().to_vec()
            }
            StreamingHasher::Sha256(h) => {
                use sha2::Digest;
                h.finalize().to_vec()
            }
            StreamingHasher::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// Render a raw digest as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse a hex string into raw digest bytes of the expected length.
pub fn from_hex(hex_str: &str, expected_len: usize) -> Option<Vec<u8>> {
    if hex_str.len() != expected_len * 2 {
        return None;
    }
    hex::decode(hex_str).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_matches_known_value() {
        let hash = DigestAlgorithm::Sha1.hash(b"");
        assert_eq!(to_hex(&hash), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn streaming_matches_one_shot() {
        for algo in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Blake3,
        ] {
            let data = b"the quick brown fox jumps over the lazy dog";
            let one_shot = algo.hash(data);
            let mut hasher = algo.hasher();
            hasher.update(&data[..10]);
            hasher.update(&data[10..]);
            assert_eq!(hasher.finalize(), one_shot);
        }
    }

    #[test]
    fn name_roundtrip() {
        for algo in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Blake3,
        ] {
            assert_eq!(DigestAlgorithm::from_name(algo.name()), Some(algo));
        }
        assert_eq!(DigestAlgorithm::from_name("md5"), None);
    }
}
