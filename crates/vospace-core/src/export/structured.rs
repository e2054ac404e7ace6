//! Dropbox-style structured listings

use super::{ExportFormat, ExportOutput};
use crate::metastore::NodeKind;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde_json::{Map, Value};
use vospace_storage::{NodeInfo, NodePath};

const SIZE_UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Format `size` like `#,##0.#` in binary units: `1,023 B`, `1.5 KB`
pub fn readable_size(size: u64) -> String {
    if size == 0 {
        return "0 bytes".to_string();
    }
    let mut group = 0;
    while group + 1 < SIZE_UNITS.len() && size >= 1u64 << (10 * (group + 1)) {
        group += 1;
    }
    let value = size as f64 / (1u64 << (10 * group)) as f64;
    let tenths = (value * 10.0).round() as u64;

    let mut out = group_thousands(tenths / 10);
    if tenths % 10 != 0 {
        out.push('.');
        out.push_str(&(tenths % 10).to_string());
    }
    out.push(' ');
    out.push_str(SIZE_UNITS[group]);
    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `EEE, dd MMM yyyy HH:mm:ss Z`
pub fn format_modified(mtime: DateTime<Utc>) -> String {
    mtime.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// Fields shared by every entry, in output order
pub fn entry(path: &NodePath, kind: NodeKind, info: &NodeInfo, include_deleted: bool) -> Map<String, Value> {
    let is_dir = kind.is_container();
    let mut map = Map::new();
    map.insert("size".into(), readable_size(info.size).into());
    map.insert("rev".into(), info.revision.into());
    map.insert("thumb_exists".into(), false.into());
    map.insert("bytes".into(), info.size.into());
    map.insert("modified".into(), format_modified(info.mtime).into());
    map.insert("path".into(), path.outer_path().into());
    map.insert("is_dir".into(), is_dir.into());
    if include_deleted || info.deleted {
        map.insert("is_deleted".into(), info.deleted.into());
    }
    let icon = if is_dir { "folder_public" } else { "page_white" };
    map.insert("icon".into(), icon.into());
    let root = if path.is_app_container() { "sandbox" } else { "dropbox" };
    map.insert("root".into(), root.into());
    if !is_dir {
        map.insert("mime_type".into(), info.content_type.clone().into());
    }
    map
}

/// Append `hash`: base64 MD5 of the serialized entry as it is now
pub fn append_hash(map: &mut Map<String, Value>) -> Result<()> {
    let serialized = serde_json::to_vec(&*map)?;
    let digest = Md5::digest(&serialized);
    map.insert("hash".into(), STANDARD.encode(digest).into());
    Ok(())
}

/// Produce the output variant for `format`
pub fn render(map: Map<String, Value>, format: ExportFormat) -> Result<ExportOutput> {
    let value = Value::Object(map);
    match format {
        ExportFormat::JsonDropboxObject => Ok(ExportOutput::Json(value)),
        _ => Ok(ExportOutput::Bytes(Bytes::from(serde_json::to_vec(&value)?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 bytes")]
    #[case(1, "1 B")]
    #[case(1023, "1,023 B")]
    #[case(1024, "1 KB")]
    #[case(1536, "1.5 KB")]
    #[case(1_048_576, "1 MB")]
    #[case(5 * 1024 * 1024 * 1024, "5 GB")]
    fn test_readable_size(#[case] size: u64, #[case] expected: &str) {
        assert_eq!(readable_size(size), expected);
    }

    #[test]
    fn test_modified_format() {
        let t = Utc.with_ymd_and_hms(2013, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(format_modified(t), "Tue, 05 Mar 2013 14:07:09 +0000");
    }

    #[test]
    fn test_entry_fields() {
        let mut info = NodeInfo::new("alice");
        info.size = 10;
        let path = NodePath::parse("/app/docs/a.txt").unwrap().with_app_container(true);
        let map = entry(&path, NodeKind::Data, &info, false);

        assert_eq!(map["path"], "/docs/a.txt");
        assert_eq!(map["root"], "sandbox");
        assert_eq!(map["icon"], "page_white");
        assert_eq!(map["is_dir"], false);
        assert_eq!(map["bytes"], 10);
        assert!(map.get("is_deleted").is_none());
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(&keys[..3], &["size", "rev", "thumb_exists"]);
    }

    #[test]
    fn test_hash_excludes_itself() {
        let info = NodeInfo::new("alice");
        let path = NodePath::parse("/A").unwrap();
        let mut map = entry(&path, NodeKind::Container, &info, true);
        let before = serde_json::to_vec(&map).unwrap();

        append_hash(&mut map).unwrap();

        let expected = STANDARD.encode(Md5::digest(&before));
        assert_eq!(map["hash"], expected.as_str());
        assert_eq!(map.keys().last().map(String::as_str), Some("hash"));
    }

    proptest! {
        #[test]
        fn prop_small_sizes_are_whole_bytes(size in 1u64..1024) {
            prop_assert_eq!(readable_size(size), format!("{} B", group_thousands(size)));
        }

        #[test]
        fn prop_unit_never_exceeds_magnitude(size in 1u64..u64::MAX / 2) {
            let out = readable_size(size);
            let unit = out.rsplit(' ').next().unwrap();
            let group = SIZE_UNITS.iter().position(|u| *u == unit).unwrap();
            prop_assert!(size >= 1u64 << (10 * group));
        }
    }
}
