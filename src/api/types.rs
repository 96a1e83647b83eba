//! Wire types for the file API
//!
//! Listing entries, download links and upload payloads exactly as the
//! backend sends and expects them.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A file in the current listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Full object key, e.g. `notes/b.txt`
    #[serde(rename = "filename")]
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Last modification time as sent by the server (ISO 8601 or epoch millis)
    #[serde(
        rename = "lastModified",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
        }
    }

    /// Last path segment of the key
    pub fn basename(&self) -> &str {
        basename(&self.name)
    }

    /// Size rounded up to whole KiB, as shown in listings
    pub fn size_kb(&self) -> u64 {
        self.size.div_ceil(1024)
    }

    /// Parsed modification time, if the server sent one we understand
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.last_modified.as_deref()?)
    }
}

/// A virtual folder in the current listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    /// Folder prefix including the trailing slash, e.g. `notes/`
    pub prefix: String,
}

impl FolderEntry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

/// Response of `GET /files`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<FileEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub folders: Vec<FolderEntry>,
}

/// Response of `GET /download`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadLink {
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Body of `POST /upload`
#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    /// Destination key: current prefix + local file name
    pub filename: String,
    /// Standard base64 of the file bytes
    pub file_content: String,
}

/// Response of `POST /upload`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
}

/// Error body the backend returns on failures
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Last `/`-separated segment of a key
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Python's str(datetime) form: "2024-05-01 10:00:00+00:00"
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_wire_format() {
        let body = r#"{
            "files": [
                {"filename": "notes/b.txt", "size": 2048, "lastModified": "2024-05-01T10:00:00+00:00"}
            ],
            "folders": [{"prefix": "notes/archive/"}]
        }"#;
        let listing: Listing = serde_json::from_str(body).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "notes/b.txt");
        assert_eq!(listing.files[0].size_kb(), 2);
        assert_eq!(listing.files[0].basename(), "b.txt");
        assert_eq!(
            listing.files[0].modified_at().map(|d| d.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );
        assert_eq!(listing.folders[0].prefix, "notes/archive/");
    }

    #[test]
    fn test_listing_missing_or_null_arrays() {
        let listing: Listing = serde_json::from_str(r#"{"folders": null}"#).unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.folders.is_empty());
    }

    #[test]
    fn test_last_modified_accepts_epoch_millis() {
        let entry: FileEntry =
            serde_json::from_str(r#"{"filename": "a.txt", "size": 1, "lastModified": 1714557600000}"#).unwrap();
        assert_eq!(entry.last_modified.as_deref(), Some("1714557600000"));
        assert_eq!(entry.modified_at().map(|d| d.timestamp()), Some(1_714_557_600));
    }

    #[test]
    fn test_python_datetime_format() {
        let mut entry = FileEntry::new("a.txt", 1);
        entry.last_modified = Some("2024-05-01 10:00:00+00:00".to_string());
        assert!(entry.modified_at().is_some());
    }

    #[test]
    fn test_size_kb_rounds_up() {
        assert_eq!(FileEntry::new("a", 0).size_kb(), 0);
        assert_eq!(FileEntry::new("a", 1).size_kb(), 1);
        assert_eq!(FileEntry::new("a", 1024).size_kb(), 1);
        assert_eq!(FileEntry::new("a", 1025).size_kb(), 2);
    }

    #[test]
    fn test_upload_request_field_names() {
        let req = UploadRequest {
            filename: "docs/report.pdf".to_string(),
            file_content: "aGk=".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["filename"], "docs/report.pdf");
        assert_eq!(json["file_content"], "aGk=");
    }
}
