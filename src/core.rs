use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ApiResult;

/// A media file enumerated for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// File name; doubles as the caption store key.
    pub name: String,
    pub size_bytes: u64,
    pub mime: String,
}

/// Server-side processing state of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Other(String),
}

impl FileState {
    pub fn as_str(&self) -> &str {
        match self {
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
            FileState::Other(value) => value,
        }
    }
}

impl From<&str> for FileState {
    fn from(value: &str) -> Self {
        match value {
            "PROCESSING" => FileState::Processing,
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            other => FileState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FileState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FileState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(FileState::from(value.as_str()))
    }
}

fn unspecified_state() -> FileState {
    FileState::Other("STATE_UNSPECIFIED".to_string())
}

/// The `file` resource the service returns for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHandle {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default = "unspecified_state")]
    pub state: FileState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The remote operations one media file goes through.
pub trait CaptionService {
    /// Picks the generation model once per run.
    fn select_model(&self) -> ApiResult<String>;

    fn upload(&self, media: &MediaFile) -> ApiResult<UploadHandle>;

    /// Blocks until the uploaded file is usable.
    fn await_active(&self, handle: &UploadHandle) -> ApiResult<UploadHandle>;

    fn generate_caption(&self, handle: &UploadHandle, model: &str) -> ApiResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_decodes_service_shape() {
        let handle: UploadHandle = serde_json::from_str(
            r#"{"name":"files/abc","uri":"https://x/files/abc","mimeType":"video/mp4","state":"PROCESSING","sizeBytes":"42"}"#,
        )
        .unwrap();
        assert_eq!(handle.name, "files/abc");
        assert_eq!(handle.mime_type, "video/mp4");
        assert_eq!(handle.state, FileState::Processing);
    }

    #[test]
    fn unknown_states_are_preserved() {
        let handle: UploadHandle =
            serde_json::from_str(r#"{"name":"files/a","uri":"u","state":"INTERNAL"}"#).unwrap();
        assert_eq!(handle.state, FileState::Other("INTERNAL".into()));
        assert_eq!(handle.state.to_string(), "INTERNAL");

        let missing: UploadHandle = serde_json::from_str(r#"{"name":"files/a","uri":"u"}"#).unwrap();
        assert_eq!(missing.state.as_str(), "STATE_UNSPECIFIED");
    }
}
