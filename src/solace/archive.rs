//! Where drained messages are written.
//!
//! Each drain run is named by a batch string `YYYY/MM/DD/HHMMSS`. Parsed
//! inspection records land under
//! `landing/<YYYYMMDD>/incremental/<HHMMSS>/<MessageID>_<RecordID>.json`;
//! anything that cannot be parsed is kept verbatim under
//! `error/<YYYYMMDD>/incremental/<HHMMSS>/<n>.json`.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::LoadgenError;

const SURVEY_SECTION: &str = "Survey and Localization Information";

/// Date and time components of a batch string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// All segments but the last, concatenated (`YYYYMMDD`).
    pub date: String,
    /// The last segment (`HHMMSS`).
    pub timestamp: String,
}

impl Batch {
    /// Splits a `YYYY/MM/DD/HHMMSS` batch string.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] when there are fewer than
    /// two segments or any segment is empty.
    pub fn parse(raw: &str) -> Result<Self, LoadgenError> {
        let segments: Vec<&str> = raw.trim().trim_matches('/').split('/').collect();
        let Some((timestamp, date)) = segments.split_last() else {
            return Err(LoadgenError::InvalidArgument(format!("batch {raw:?} is empty")));
        };
        if date.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(LoadgenError::InvalidArgument(format!(
                "batch {raw:?} must look like YYYY/MM/DD/HHMMSS"
            )));
        }
        Ok(Self {
            date: date.concat(),
            timestamp: (*timestamp).to_string(),
        })
    }

    /// Batch string for the current local time.
    #[must_use]
    pub fn current() -> String {
        chrono::Local::now().format("%Y/%m/%d/%H%M%S").to_string()
    }
}

/// One object to be written to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveObject {
    /// Relative key, `/` separated.
    pub key: String,
    /// JSON body.
    pub body: String,
    /// Whether the payload was a well-formed inspection record.
    pub parsed: bool,
}

/// Builds the archive object for message `message_number` of a batch.
#[must_use]
pub fn archive_object(batch: &Batch, message_number: u64, payload: &[u8]) -> ArchiveObject {
    match landing_object(batch, payload) {
        Ok(object) => object,
        Err(reason) => {
            tracing::warn!(message_number, %reason, "payload not archivable as landing data");
            let raw = String::from_utf8_lossy(payload);
            ArchiveObject {
                key: format!(
                    "error/{}/incremental/{}/{message_number}.json",
                    batch.date, batch.timestamp
                ),
                body: Value::String(raw.into_owned()).to_string(),
                parsed: false,
            }
        }
    }
}

fn landing_object(batch: &Batch, payload: &[u8]) -> Result<ArchiveObject, String> {
    let text = std::str::from_utf8(payload).map_err(|e| format!("invalid utf-8: {e}"))?;
    let document: Value = serde_json::from_str(text).map_err(|e| format!("invalid json: {e}"))?;
    let record = document
        .get("RailTrackInspectionData")
        .ok_or("missing RailTrackInspectionData")?;
    let identity = record
        .get("Headers")
        .and_then(|h| h.get("TransactionIdentity"))
        .ok_or("missing Headers.TransactionIdentity")?;
    let message_id = identity
        .get("MessageID")
        .map(id_text)
        .ok_or("missing MessageID")?;
    let record_id = identity
        .get("RecordID")
        .map(id_text)
        .ok_or("missing RecordID")?;
    let survey = record
        .get("Data")
        .and_then(|d| d.get(SURVEY_SECTION))
        .ok_or("missing Data section")?;

    Ok(ArchiveObject {
        key: format!(
            "landing/{}/incremental/{}/{message_id}_{record_id}.json",
            batch.date, batch.timestamp
        ),
        body: survey.to_string(),
        parsed: true,
    })
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Destination for archived objects.
#[allow(async_fn_in_trait)]
pub trait ArchiveSink {
    /// Stores `object`, replacing any previous object with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Archive`] if the write fails.
    async fn put(&self, object: &ArchiveObject) -> Result<(), LoadgenError>;
}

/// Archive rooted at a local directory; keys become relative paths.
#[derive(Debug, Clone)]
pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    /// Archive writing below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl ArchiveSink for FsArchive {
    async fn put(&self, object: &ArchiveObject) -> Result<(), LoadgenError> {
        let path = self.path_for(&object.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, object.body.as_bytes()).await?;
        tracing::debug!(path = %path.display(), bytes = object.body.len(), "archived");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn batch() -> Batch {
        let Ok(batch) = Batch::parse("2024/03/07/142500") else {
            panic!("batch should parse");
        };
        batch
    }

    const GOOD: &str = r#"{
        "RailTrackInspectionData": {
            "Headers": {"TransactionIdentity": {"MessageID": "M-17", "RecordID": 42}},
            "Data": {"Survey and Localization Information": {"km": 12.5, "line": "ER"}}
        }
    }"#;

    #[test]
    fn batch_splits_date_and_time() {
        let b = batch();
        assert_eq!(b.date, "20240307");
        assert_eq!(b.timestamp, "142500");
    }

    #[test]
    fn batch_rejects_single_segment() {
        assert!(matches!(
            Batch::parse("142500"),
            Err(LoadgenError::InvalidArgument(_))
        ));
        assert!(matches!(
            Batch::parse("2024//07/142500"),
            Err(LoadgenError::InvalidArgument(_))
        ));
    }

    #[test]
    fn current_batch_parses() {
        let Ok(b) = Batch::parse(&Batch::current()) else {
            panic!("current batch should parse");
        };
        assert_eq!(b.date.len(), 8);
        assert_eq!(b.timestamp.len(), 6);
    }

    #[test]
    fn inspection_record_goes_to_landing() {
        let object = archive_object(&batch(), 1, GOOD.as_bytes());
        assert!(object.parsed);
        assert_eq!(object.key, "landing/20240307/incremental/142500/M-17_42.json");
        let Ok(body) = serde_json::from_str::<Value>(&object.body) else {
            panic!("body should be json");
        };
        assert_eq!(body, serde_json::json!({"km": 12.5, "line": "ER"}));
    }

    #[test]
    fn invalid_json_goes_to_error() {
        let object = archive_object(&batch(), 3, b"not json {");
        assert!(!object.parsed);
        assert_eq!(object.key, "error/20240307/incremental/142500/3.json");
        assert_eq!(object.body, "\"not json {\"");
    }

    #[test]
    fn missing_section_goes_to_error() {
        let payload = br#"{"RailTrackInspectionData": {"Headers": {}}}"#;
        let object = archive_object(&batch(), 8, payload);
        assert_eq!(object.key, "error/20240307/incremental/142500/8.json");
        let Ok(Value::String(raw)) = serde_json::from_str::<Value>(&object.body) else {
            panic!("error body should be a json string");
        };
        assert_eq!(raw.as_bytes(), payload);
    }

    #[test]
    fn invalid_utf8_is_kept_lossily() {
        let object = archive_object(&batch(), 2, &[0xff, b'a']);
        assert_eq!(object.key, "error/20240307/incremental/142500/2.json");
        assert_eq!(object.body, "\"\u{fffd}a\"");
    }

    #[test]
    fn path_for_ignores_traversal() {
        let archive = FsArchive::new("/tmp/root");
        assert_eq!(
            archive.path_for("landing/../x/y.json"),
            PathBuf::from("/tmp/root/landing/x/y.json")
        );
    }

    #[tokio::test]
    async fn fs_archive_writes_nested_files() {
        let root = std::env::temp_dir().join(format!("loadgen-archive-{}", uuid::Uuid::new_v4()));
        let archive = FsArchive::new(&root);
        let object = archive_object(&batch(), 1, GOOD.as_bytes());

        let result = archive.put(&object).await;
        assert!(result.is_ok());

        let path = archive.path_for(&object.key);
        let Ok(written) = tokio::fs::read_to_string(&path).await else {
            panic!("archived file should exist");
        };
        assert_eq!(written, object.body);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
