//! Unix codec: a compact binary encoding of `stat()`-shaped fields.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::entry::{Directory, DirEnt, EntryKind};
use crate::error::{CodecError, Result};
use crate::framing;
use crate::name::RawName;
use crate::Codec;

pub const FORMAT_NAME: &str = "unix";

/// Order of the colon-separated integer fields packed into `int_attrs`.
const INT_ATTR_FIELDS: usize = 12;

pub struct UnixCodec;

impl Codec for UnixCodec {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn encode(&self, dir: &Directory) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        framing::write_header(&mut out, FORMAT_NAME)?;

        let mut metadata = dir.metadata.clone();
        let (umap, gmap) = build_id_maps(&dir.entries);
        metadata.insert("umap".to_string(), umap);
        metadata.insert("gmap".to_string(), gmap);
        let metadata_value = Value::Object(metadata.into_iter().collect());
        let metadata_bytes = serde_json::to_vec(&metadata_value)?;
        out.extend_from_slice(&(metadata_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&metadata_bytes);

        let mut sorted = dir.entries.clone();
        sorted.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        for entry in &sorted {
            encode_entry(&mut out, entry)?;
        }
        Ok(out)
    }

    fn decode(&self, body: &[u8]) -> Result<Directory> {
        if body.len() < 4 {
            return Err(CodecError::CorruptStore("unix body too short for metadata length".into()));
        }
        let meta_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        let mut offset = 4;
        if body.len() < offset + meta_len {
            return Err(CodecError::CorruptStore("truncated unix metadata segment".into()));
        }
        let metadata_value: Value = serde_json::from_slice(&body[offset..offset + meta_len])?;
        let mut metadata: BTreeMap<String, Value> = metadata_value
            .as_object()
            .ok_or_else(|| CodecError::CorruptStore("unix metadata is not an object".into()))?
            .clone()
            .into_iter()
            .collect();
        let umap = metadata.remove("umap");
        let gmap = metadata.remove("gmap");
        offset += meta_len;

        let mut entries = Vec::new();
        while offset < body.len() {
            let (mut entry, consumed) = decode_entry(&body[offset..])?;
            if let Some(uid) = entry.uid {
                entry.user = lookup_id_map(umap.as_ref(), uid);
            }
            if let Some(gid) = entry.gid {
                entry.group = lookup_id_map(gmap.as_ref(), gid);
            }
            entries.push(entry);
            offset += consumed;
        }
        Ok(Directory::new(metadata, entries))
    }
}

fn lookup_id_map(map: Option<&Value>, id: u32) -> Option<String> {
    map?.as_object()?.get(&id.to_string())?.as_str().map(str::to_string)
}

fn build_id_maps(entries: &[DirEnt]) -> (Value, Value) {
    let mut umap = serde_json::Map::new();
    let mut gmap = serde_json::Map::new();
    for entry in entries {
        if let (Some(uid), Some(user)) = (entry.uid, &entry.user) {
            umap.insert(uid.to_string(), Value::String(user.clone()));
        }
        if let (Some(gid), Some(group)) = (entry.gid, &entry.group) {
            gmap.insert(gid.to_string(), Value::String(group.clone()));
        }
    }
    (Value::Object(umap), Value::Object(gmap))
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
    let int_attrs = encode_int_attrs(entry);
    if int_attrs.len() > 255 {
        return Err(CodecError::EncodingError("int_attrs exceeds 255 bytes".into()));
    }

    out.push(name_bytes.len() as u8);
    out.push(ref_bytes.len() as u8);
    out.push(int_attrs.len() as u8);
    out.push(entry.kind.type_code());
    out.extend_from_slice(name_bytes);
    out.push(0);
    out.extend_from_slice(ref_bytes);
    out.push(0);
    out.extend_from_slice(int_attrs.as_bytes());
    Ok(())
}

fn encode_int_attrs(entry: &DirEnt) -> String {
    let fields: [Option<u64>; INT_ATTR_FIELDS] = [
        entry.size,
        entry.modify_ts.map(|v| v as u64),
        entry.uid.map(u64::from),
        entry.gid.map(u64::from),
        entry.mode.map(u64::from),
        entry.metadata_ts.map(|v| v as u64),
        entry.access_ts.map(|v| v as u64),
        entry.nlink,
        entry.dev,
        entry.inode,
        entry.blocksize,
        entry.blockcount,
    ];
    let mut last_present = None;
    for (i, f) in fields.iter().enumerate() {
        if f.is_some() {
            last_present = Some(i);
        }
    }
    let keep = last_present.map(|i| i + 1).unwrap_or(0);
    fields[..keep]
        .iter()
        .map(|f| f.map(|v| v.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":")
}

fn decode_entry(buf: &[u8]) -> Result<(DirEnt, usize)> {
    if buf.len() < 4 {
        return Err(CodecError::CorruptStore("truncated unix entry header".into()));
    }
    let name_len = buf[0] as usize;
    let ref_len = buf[1] as usize;
    let int_attrs_len = buf[2] as usize;
    let type_code = buf[3];
    let kind = EntryKind::from_type_code(type_code)
        .ok_or_else(|| CodecError::CorruptStore(format!("unknown type code {:?}", type_code as char)))?;

    let mut pos = 4;
    let name_end = pos + name_len;
    let name = take_field(buf, pos, name_end)?;
    pos = name_end + 1;

    let ref_end = pos + ref_len;
    let reference = take_field(buf, pos, ref_end)?;
    pos = ref_end + 1;

    let attrs_end = pos + int_attrs_len;
    if buf.len() < attrs_end {
        return Err(CodecError::CorruptStore("truncated int_attrs".into()));
    }
    let int_attrs = std::str::from_utf8(&buf[pos..attrs_end])
        .map_err(|_| CodecError::CorruptStore("int_attrs not UTF-8".into()))?;

    let mut entry = DirEnt::bare(
        RawName::from_bytes(name),
        kind,
        if ref_len == 0 { None } else { Some(RawName::from_bytes(reference)) },
    );
    apply_int_attrs(&mut entry, int_attrs)?;

    Ok((entry, attrs_end))
}

fn take_field(buf: &[u8], start: usize, end: usize) -> Result<Vec<u8>> {
    if buf.len() <= end {
        return Err(CodecError::CorruptStore("truncated field in unix entry".into()));
    }
    if buf[end] != 0 {
        return Err(CodecError::CorruptStore("missing NUL terminator in unix entry".into()));
    }
    Ok(buf[start..end].to_vec())
}

fn apply_int_attrs(entry: &mut DirEnt, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    let parts: Vec<&str> = raw.split(':').collect();
    let parse = |s: &str| -> Result<Option<u64>> {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse()
                .map(Some)
                .map_err(|_| CodecError::CorruptStore(format!("invalid integer {:?} in int_attrs", s)))
        }
    };
    let mut it = parts.into_iter();
    entry.size = it.next().map(parse).transpose()?.flatten();
    entry.modify_ts = it.next().map(parse).transpose()?.flatten().flatten_i64();
    entry.uid = it.next().map(parse).transpose()?.flatten().map(|v| v as u32);
    entry.gid = it.next().map(parse).transpose()?.flatten().map(|v| v as u32);
    entry.mode = it.next().map(parse).transpose()?.flatten().map(|v| v as u32);
    entry.metadata_ts = it.next().map(parse).transpose()?.flatten().flatten_i64();
    entry.access_ts = it.next().map(parse).transpose()?.flatten().flatten_i64();
    entry.nlink = it.next().map(parse).transpose()?.flatten();
    entry.dev = it.next().map(parse).transpose()?.flatten();
    entry.inode = it.next().map(parse).transpose()?.flatten();
    entry.blocksize = it.next().map(parse).transpose()?.flatten();
    entry.blockcount = it.next().map(parse).transpose()?.flatten();
    Ok(())
}

trait FlattenI64 {
    fn flatten_i64(self) -> Option<i64>;
}

impl FlattenI64 for Option<u64> {
    fn flatten_i64(self) -> Option<i64> {
        self.map(|v| v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Directory;

    #[test]
    fn roundtrips_stat_fields() {
        let codec = UnixCodec;
        let mut entry = DirEnt::bare(RawName::from_str("file.txt"), EntryKind::File, Some(RawName::from_str("deadbeef")));
        entry.size = Some(4096);
        entry.modify_ts = Some(1_700_000_000);
        entry.uid = Some(1000);
        entry.gid = Some(1000);
        entry.mode = Some(0o644);
        entry.user = Some("alice".to_string());
        entry.group = Some("staff".to_string());
        let dir = Directory::new(Default::default(), vec![entry]);

        let encoded = codec.encode(&dir).unwrap();
        let (name, body) = framing::read_header(&encoded).unwrap();
        assert_eq!(name, FORMAT_NAME);
        let decoded = codec.decode(body).unwrap();

        let got = &decoded.entries[0];
        assert_eq!(got.name.as_str(), Some("file.txt"));
        assert_eq!(got.reference.as_ref().unwrap().as_str(), Some("deadbeef"));
        assert_eq!(got.size, Some(4096));
        assert_eq!(got.modify_ts, Some(1_700_000_000));
        assert_eq!(got.uid, Some(1000));
        assert_eq!(got.mode, Some(0o644));
        assert_eq!(got.user.as_deref(), Some("alice"));
        assert_eq!(got.group.as_deref(), Some("staff"));
    }

    #[test]
    fn zero_length_ref_decodes_as_absent() {
        let codec = UnixCodec;
        let entry = DirEnt::bare(RawName::from_str("a"), EntryKind::File, None);
        let dir = Directory::new(Default::default(), vec![entry]);
        let encoded = codec.encode(&dir).unwrap();
        let (_, body) = framing::read_header(&encoded).unwrap();
        let decoded = codec.decode(body).unwrap();
        assert!(decoded.entries[0].reference.is_none());
    }

    #[test]
    fn name_over_255_bytes_fails_encoding() {
        let codec = UnixCodec;
        let long_name = "a".repeat(256);
        let entry = DirEnt::bare(RawName::from_str(&long_name), EntryKind::File, None);
        let dir = Directory::new(Default::default(), vec![entry]);
        assert!(matches!(codec.encode(&dir), Err(CodecError::EncodingError(_))));
    }

    #[test]
    fn name_at_255_bytes_succeeds() {
        let codec = UnixCodec;
        let name = "a".repeat(255);
        let entry = DirEnt::bare(RawName::from_str(&name), EntryKind::File, None);
        let dir = Directory::new(Default::default(), vec![entry]);
        assert!(codec.encode(&dir).is_ok());
    }
}
