//! Universal codec: JSON, preserving every field including codec-unknown
//! extras. The slowest and largest of the three, but the only one that
//! round-trips arbitrary metadata.

use serde_json::{Map, Value};

use crate::entry::{Directory, DirEnt, EntryKind};
use crate::error::{CodecError, Result};
use crate::framing;
use crate::name::RawName;
use crate::Codec;

pub const FORMAT_NAME: &str = "universal";

const INVALID_UTF8_KEY: &str = "*InvalidUTF8*";

pub struct UniversalCodec;

impl Codec for UniversalCodec {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn encode(&self, dir: &Directory) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        framing::write_header(&mut out, FORMAT_NAME)?;

        let metadata_value = Value::Object(dir.metadata.clone().into_iter().collect());
        out.extend_from_slice(b"{\"metadata\":");
        out.extend_from_slice(serde_json::to_string(&metadata_value)?.as_bytes());
        out.extend_from_slice(b",\"entries\":[");

        let mut sorted = dir.entries.clone();
        sorted.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        for (i, entry) in sorted.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.push(b'\n');
            let value = entry_to_value(entry);
            out.extend_from_slice(serde_json::to_string(&value)?.as_bytes());
        }
        if !sorted.is_empty() {
            out.push(b'\n');
        }
        out.extend_from_slice(b"]}");
        Ok(out)
    }

    fn decode(&self, body: &[u8]) -> Result<Directory> {
        let value: Value = serde_json::from_slice(body)?;
        let obj = value
            .as_object()
            .ok_or_else(|| CodecError::CorruptStore("universal body is not a JSON object".into()))?;

        let metadata = match obj.get("metadata") {
            Some(Value::Object(m)) => m.clone().into_iter().collect(),
            Some(Value::Null) | None => Default::default(),
            Some(_) => return Err(CodecError::CorruptStore("metadata is not an object".into())),
        };

        let entries_value = obj
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::CorruptStore("missing entries array".into()))?;

        let mut entries = Vec::with_capacity(entries_value.len());
        for entry_value in entries_value {
            entries.push(value_to_entry(entry_value)?);
        }

        Ok(Directory::new(metadata, entries))
    }
}

fn name_to_value(name: &RawName) -> Value {
    match name.as_str() {
        Some(s) => Value::String(s.to_string()),
        None => {
            let mut m = Map::new();
            let codepoints: Vec<Value> = name.as_bytes().iter().map(|b| Value::from(*b as u64)).collect();
            m.insert(INVALID_UTF8_KEY.to_string(), Value::Array(codepoints));
            Value::Object(m)
        }
    }
}

fn value_to_name(value: &Value) -> Result<RawName> {
    match value {
        Value::String(s) => Ok(RawName::from_str(s)),
        Value::Object(m) => {
            let codepoints = m
                .get(INVALID_UTF8_KEY)
                .and_then(Value::as_array)
                .ok_or_else(|| CodecError::CorruptStore("expected *InvalidUTF8* wrapper".into()))?;
            let bytes: Result<Vec<u8>> = codepoints
                .iter()
                .map(|v| {
                    v.as_u64()
                        .filter(|n| *n <= 255)
                        .map(|n| n as u8)
                        .ok_or_else(|| CodecError::CorruptStore("invalid codepoint in *InvalidUTF8*".into()))
                })
                .collect();
            Ok(RawName::from_bytes(bytes?))
        }
        _ => Err(CodecError::CorruptStore("name is neither string nor wrapper".into())),
    }
}

const KNOWN_KEYS: &[&str] = &[
    "name",
    "type",
    "ref",
    "size",
    "create_ts",
    "modify_ts",
    "access_ts",
    "metadata_ts",
    "uid",
    "gid",
    "user",
    "group",
    "mode",
    "dev",
    "inode",
    "nlink",
    "blocksize",
    "blockcount",
];

fn entry_to_value(entry: &DirEnt) -> Value {
    let mut m = Map::new();
    m.insert("name".to_string(), name_to_value(&entry.name));
    m.insert("type".to_string(), Value::String(entry.kind.as_str().to_string()));
    if let Some(reference) = &entry.reference {
        m.insert("ref".to_string(), name_to_value(reference));
    }
    macro_rules! opt_num {
        ($field:ident) => {
            if let Some(v) = entry.$field {
                m.insert(stringify!($field).to_string(), Value::from(v));
            }
        };
    }
    opt_num!(size);
    opt_num!(create_ts);
    opt_num!(modify_ts);
    opt_num!(access_ts);
    opt_num!(metadata_ts);
    opt_num!(uid);
    opt_num!(gid);
    opt_num!(mode);
    opt_num!(dev);
    opt_num!(inode);
    opt_num!(nlink);
    opt_num!(blocksize);
    opt_num!(blockcount);
    if let Some(user) = &entry.user {
        m.insert("user".to_string(), Value::String(user.clone()));
    }
    if let Some(group) = &entry.group {
        m.insert("group".to_string(), Value::String(group.clone()));
    }
    for (k, v) in &entry.extra {
        m.insert(k.clone(), v.clone());
    }
    Value::Object(m)
}

fn value_to_entry(value: &Value) -> Result<DirEnt> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::CorruptStore("entry is not a JSON object".into()))?;

    let name = obj
        .get("name")
        .ok_or_else(|| CodecError::CorruptStore("entry missing name".into()))
        .and_then(value_to_name)?;
    let kind_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::CorruptStore("entry missing type".into()))?;
    let kind = EntryKind::from_str(kind_str)
        .ok_or_else(|| CodecError::CorruptStore(format!("unknown entry type {:?}", kind_str)))?;
    let reference = match obj.get("ref") {
        Some(Value::Null) | None => None,
        Some(v) => Some(value_to_name(v)?),
    };

    let mut entry = DirEnt::bare(name, kind, reference);
    entry.size = obj.get("size").and_then(Value::as_u64);
    entry.create_ts = obj.get("create_ts").and_then(Value::as_i64);
    entry.modify_ts = obj.get("modify_ts").and_then(Value::as_i64);
    entry.access_ts = obj.get("access_ts").and_then(Value::as_i64);
    entry.metadata_ts = obj.get("metadata_ts").and_then(Value::as_i64);
    entry.uid = obj.get("uid").and_then(Value::as_u64).map(|v| v as u32);
    entry.gid = obj.get("gid").and_then(Value::as_u64).map(|v| v as u32);
    entry.user = obj.get("user").and_then(Value::as_str).map(str::to_string);
    entry.group = obj.get("group").and_then(Value::as_str).map(str::to_string);
    entry.mode = obj.get("mode").and_then(Value::as_u64).map(|v| v as u32);
    entry.dev = obj.get("dev").and_then(Value::as_u64);
    entry.inode = obj.get("inode").and_then(Value::as_u64);
    entry.nlink = obj.get("nlink").and_then(Value::as_u64);
    entry.blocksize = obj.get("blocksize").and_then(Value::as_u64);
    entry.blockcount = obj.get("blockcount").and_then(Value::as_u64);

    for (k, v) in obj {
        if !KNOWN_KEYS.contains(&k.as_str()) {
            entry.extra.insert(k.clone(), v.clone());
        }
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Directory;

    #[test]
    fn roundtrips_unicode_and_opaque_names() {
        let codec = UniversalCodec;
        let unicode_entry = DirEnt::bare(RawName::from_str("\u{100}\u{150}"), EntryKind::File, None);
        let opaque_entry = DirEnt::bare(RawName::from_bytes(vec![0x80]), EntryKind::File, None);
        let dir = Directory::new(Default::default(), vec![unicode_entry.clone(), opaque_entry.clone()]);

        let encoded = codec.encode(&dir).unwrap();
        let (name, body) = framing::read_header(&encoded).unwrap();
        assert_eq!(name, FORMAT_NAME);
        let decoded = codec.decode(body).unwrap();

        let decoded_unicode = decoded.find(&unicode_entry.name).unwrap();
        assert_eq!(decoded_unicode.name.as_str(), Some("\u{100}\u{150}"));

        let decoded_opaque = decoded.find(&opaque_entry.name).unwrap();
        assert!(!decoded_opaque.name.is_utf8());
        assert_eq!(decoded_opaque.name.as_bytes(), &[0x80]);
    }

    #[test]
    fn preserves_extra_fields() {
        let codec = UniversalCodec;
        let mut entry = DirEnt::bare(RawName::from_str("a"), EntryKind::File, None);
        entry.extra.insert("custom_flag".to_string(), Value::Bool(true));
        let dir = Directory::new(Default::default(), vec![entry]);

        let encoded = codec.encode(&dir).unwrap();
        let (_, body) = framing::read_header(&encoded).unwrap();
        let decoded = codec.decode(body).unwrap();
        assert_eq!(
            decoded.entries[0].extra.get("custom_flag"),
            Some(&Value::Bool(true))
        );
    }
}
