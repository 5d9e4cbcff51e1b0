//! Common directory-blob header: `"CAS_Dir " <name-len as 2 hex digits> " " <name> "\n"`.

use crate::error::{CodecError, Result};

pub const MAGIC: &[u8] = b"CAS_Dir ";

pub fn write_header(out: &mut Vec<u8>, format_name: &str) -> Result<()> {
    if format_name.len() > 255 {
        return Err(CodecError::EncodingError(format!(
            "format name {:?} exceeds 255 bytes",
            format_name
        )));
    }
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(format!("{:02X}", format_name.len()).as_bytes());
    out.push(b' ');
    out.extend_from_slice(format_name.as_bytes());
    out.push(b'\n');
    Ok(())
}

/// Parse the header, returning `(format_name, rest_of_blob)`.
pub fn read_header(blob: &[u8]) -> Result<(&str, &[u8])> {
    if !blob.starts_with(MAGIC) {
        return Err(CodecError::CorruptStore("missing CAS_Dir magic".into()));
    }
    let rest = &blob[MAGIC.len()..];
    if rest.len() < 3 {
        return Err(CodecError::CorruptStore("truncated header".into()));
    }
    let len_hex = std::str::from_utf8(&rest[0..2])
        .map_err(|_| CodecError::CorruptStore("non-UTF8 format-name length".into()))?;
    let name_len = usize::from_str_radix(len_hex, 16)
        .map_err(|_| CodecError::CorruptStore(format!("invalid format-name length {:?}", len_hex)))?;
    if rest.get(2) != Some(&b' ') {
        return Err(CodecError::CorruptStore("missing separator after length".into()));
    }
    let name_start = 3;
    let name_end = name_start + name_len;
    if rest.len() < name_end + 1 {
        return Err(CodecError::CorruptStore("truncated format name".into()));
    }
    let format_name = std::str::from_utf8(&rest[name_start..name_end])
        .map_err(|_| CodecError::CorruptStore("non-UTF8 format name".into()))?;
    if rest[name_end] != b'\n' {
        return Err(CodecError::CorruptStore("missing newline after header".into()));
    }
    Ok((format_name, &rest[name_end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut buf = Vec::new();
        write_header(&mut buf, "universal").unwrap();
        assert_eq!(&buf, b"CAS_Dir 09 universal\n");
        let (name, rest) = read_header(&buf).unwrap();
        assert_eq!(name, "universal");
        assert!(rest.is_empty());
    }

    #[test]
    fn minimal_header_is_empty_name() {
        let mut buf = Vec::new();
        write_header(&mut buf, "").unwrap();
        assert_eq!(&buf, b"CAS_Dir 00 \n");
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(read_header(b"not a cas dir blob").is_err());
    }
}
