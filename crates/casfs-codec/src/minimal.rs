//! Minimal codec: smallest possible encoding, preserving only
//! `{type, name, ref}`. Registered under the empty string on the wire
//! (`"CAS_Dir 00 \n..."`), with `"minimal"` as a lookup alias.

use serde_json::Value;

use crate::entry::{Directory, DirEnt, EntryKind};
use crate::error::{CodecError, Result};
use crate::framing;
use crate::name::RawName;
use crate::Codec;

/// The on-wire format name (empty string, per the framing header).
pub const FORMAT_NAME: &str = "";
/// Alternate name accepted by the codec registry when looking the codec up.
pub const ALIAS: &str = "minimal";

pub struct MinimalCodec;

impl Codec for MinimalCodec {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn encode(&self, dir: &Directory) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        framing::write_header(&mut out, FORMAT_NAME)?;

        if dir.metadata.is_empty() {
            // nothing to write before the NUL terminator
        } else {
            let value = Value::Object(dir.metadata.clone().into_iter().collect());
            out.extend_from_slice(serde_json::to_string(&value)?.as_bytes());
        }
        out.push(0);

        let mut sorted = dir.entries.clone();
        sorted.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        for entry in &sorted {
            encode_entry(&mut out, entry)?;
        }
        Ok(out)
    }

    fn decode(&self, body: &[u8]) -> Result<Directory> {
        let nul_pos = body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| CodecError::CorruptStore("missing metadata terminator".into()))?;
        let metadata = if nul_pos == 0 {
            Default::default()
        } else {
            let value: Value = serde_json::from_slice(&body[..nul_pos])?;
            value
                .as_object()
                .ok_or_else(|| CodecError::CorruptStore("minimal metadata is not an object".into()))?
                .clone()
                .into_iter()
                .collect()
        };

        let mut offset = nul_pos + 1;
        let mut entries = Vec::new();
        while offset < body.len() {
            let (entry, consumed) = decode_entry(&body[offset..])?;
            entries.push(entry);
            offset += consumed;
        }
        Ok(Directory::new(metadata, entries))
    }
}

fn encode_entry(out: &mut Vec<u8>, entry: &DirEnt) -> Result<()> {
    let name_bytes = entry.name.as_bytes();
    if name_bytes.len() > 255 {
        return Err(CodecError::EncodingError(format!(
            "name exceeds 255 bytes ({} bytes)",
            name_bytes.len()
        )));
    }
    let ref_bytes: &[u8] = entry.reference.as_ref().map(RawName::as_bytes).unwrap_or(b"");
    if ref_bytes.len() > 255 {
        return Err(CodecError::EncodingError(format!(
            "ref exceeds 255 bytes ({} bytes)",
            ref_bytes.len()
        )));
    }
    out.push(name_bytes.len() as u8);
    out.push(ref_bytes.len() as u8);
    out.push(entry.kind.type_code());
    out.extend_from_slice(name_bytes);
    out.push(0);
    out.extend_from_slice(ref_bytes);
    out.push(0);
    Ok(())
}

fn decode_entry(buf: &[u8]) -> Result<(DirEnt, usize)> {
    if buf.len() < 3 {
        return Err(CodecError::CorruptStore("truncated minimal entry header".into()));
    }
    let name_len = buf[0] as usize;
    let ref_len = buf[1] as usize;
    let type_code = buf[2];
    let kind = EntryKind::from_type_code(type_code)
        .ok_or_else(|| CodecError::CorruptStore(format!("unknown type code {:?}", type_code as char)))?;

    let mut pos = 3;
    let name_end = pos + name_len;
    if buf.len() <= name_end || buf[name_end] != 0 {
        return Err(CodecError::CorruptStore("malformed name field".into()));
    }
    let name = buf[pos..name_end].to_vec();
    pos = name_end + 1;

    let ref_end = pos + ref_len;
    if buf.len() <= ref_end || buf[ref_end] != 0 {
        return Err(CodecError::CorruptStore("malformed ref field".into()));
    }
    let reference = buf[pos..ref_end].to_vec();

    let entry = DirEnt::bare(
        RawName::from_bytes(name),
        kind,
        if ref_len == 0 { None } else { Some(RawName::from_bytes(reference)) },
    );
    Ok((entry, ref_end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Directory;

    #[test]
    fn matches_known_byte_string() {
        let codec = MinimalCodec;
        let entry = DirEnt::bare(RawName::from_str("test"), EntryKind::File, None);
        let dir = Directory::new(Default::default(), vec![entry]);
        let encoded = codec.encode(&dir).unwrap();
        assert_eq!(encoded, b"CAS_Dir 00 \n\0\x04\x00ftest\x00\x00");
    }

    #[test]
    fn decodes_known_byte_string() {
        let codec = MinimalCodec;
        let blob: &[u8] = b"CAS_Dir 00 \n\0\x04\x00ftest\x00\x00";
        let (name, body) = framing::read_header(blob).unwrap();
        assert_eq!(name, "");
        let decoded = codec.decode(body).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].name.as_str(), Some("test"));
        assert!(decoded.entries[0].reference.is_none());
    }
}
