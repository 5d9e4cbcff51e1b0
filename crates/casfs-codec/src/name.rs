//! Filenames and `ref` values that round-trip raw bytes even when they are
//! not valid UTF-8.

use std::fmt;

/// A byte string that is usually (but not provably) UTF-8. Compares and
/// hashes on raw bytes so two names that differ only in how they'd render
/// are still distinct.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawName(Vec<u8>);

impl RawName {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        RawName(bytes)
    }

    pub fn from_str(s: &str) -> Self {
        RawName(s.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_utf8(&self) -> bool {
        std::str::from_utf8(&self.0).is_ok()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawName {
    fn from(s: String) -> Self {
        RawName(s.into_bytes())
    }
}

impl From<&str> for RawName {
    fn from(s: &str) -> Self {
        RawName::from_str(s)
    }
}

impl fmt::Debug for RawName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "RawName({:?})", s),
            None => write!(f, "RawName(<{} non-utf8 bytes>)", self.0.len()),
        }
    }
}
