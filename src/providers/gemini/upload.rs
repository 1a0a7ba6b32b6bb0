use bytesize::ByteSize;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::GeminiClient;
use crate::constants::{API_VERSION, UPLOAD_URL_HEADER};
use crate::core::{MediaFile, UploadHandle};
use crate::error::{ApiError, ApiResult};
use crate::http::ApiRequest;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadHandle,
}

impl GeminiClient {
    /// Two-phase resumable upload: open a session, then send every byte in
    /// one finalizing request. A failed transfer restarts from the session
    /// request on the next attempt at the file.
    pub fn upload_file(&self, media: &MediaFile) -> ApiResult<UploadHandle> {
        let length = media.size_bytes.to_string();
        info!(
            file = %media.name,
            size = %ByteSize::b(media.size_bytes),
            mime = %media.mime,
            "starting upload"
        );

        let start = ApiRequest::new(
            Method::POST,
            self.endpoint(&format!("upload/{API_VERSION}/files"))?,
        )
        .header("x-goog-upload-protocol", "resumable")?
        .header("x-goog-upload-command", "start")?
        .header("x-goog-upload-header-content-length", &length)?
        .header("x-goog-upload-header-content-type", &media.mime)?
        .json(json!({"file": {"display_name": media.name}}));

        let started = self
            .executor
            .execute(&start)?
            .error_for_status("files.upload start")?;
        let session = started.header(UPLOAD_URL_HEADER).ok_or_else(|| {
            ApiError::UploadProtocol(format!(
                "no X-Goog-Upload-URL in start response for {}",
                media.name
            ))
        })?;
        let session = Url::parse(session)
            .map_err(|err| ApiError::UploadProtocol(format!("bad session URL {session}: {err}")))?;
        debug!(file = %media.name, "upload session opened");

        let transfer = ApiRequest::new(Method::PUT, session)
            .header("content-length", &length)?
            .header("x-goog-upload-offset", "0")?
            .header("x-goog-upload-command", "upload, finalize")?
            .file(media.path.clone(), media.size_bytes);

        let finished = self
            .executor
            .execute(&transfer)?
            .error_for_status("files.upload finalize")?;
        let uploaded: UploadResponse = finished.json("files.upload")?;
        debug!(
            file = %media.name,
            handle = %uploaded.file.name,
            state = %uploaded.file.state,
            "upload finalized"
        );
        Ok(uploaded.file)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use mockito::Matcher;

    use super::super::test_support::{client, KEY};
    use super::super::ClientOptions;
    use crate::core::{FileState, MediaFile};
    use crate::error::ApiError;

    fn media(dir: &Path) -> MediaFile {
        let path = dir.join("clip.mp4");
        fs::write(&path, b"0123456789").unwrap();
        MediaFile {
            path,
            name: "clip.mp4".into(),
            size_bytes: 10,
            mime: "video/mp4".into(),
        }
    }

    #[test]
    fn uploads_in_two_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new();
        let session = format!("{}/upload-session/abc", server.url());

        let start = server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::UrlEncoded("key".into(), KEY.into()))
            .match_header("x-goog-upload-protocol", "resumable")
            .match_header("x-goog-upload-command", "start")
            .match_header("x-goog-upload-header-content-length", "10")
            .match_header("x-goog-upload-header-content-type", "video/mp4")
            .match_body(Matcher::Json(
                serde_json::json!({"file": {"display_name": "clip.mp4"}}),
            ))
            .with_header("X-Goog-Upload-URL", &session)
            .create();
        let transfer = server
            .mock("PUT", "/upload-session/abc")
            .match_header("x-goog-upload-offset", "0")
            .match_header("x-goog-upload-command", "upload, finalize")
            .match_body("0123456789")
            .with_body(
                r#"{"file":{"name":"files/abc","uri":"https://files/abc","mimeType":"video/mp4","state":"PROCESSING"}}"#,
            )
            .create();

        let (client, _) = client(&server, ClientOptions::default());
        let handle = client.upload_file(&media(dir.path())).unwrap();

        start.assert();
        transfer.assert();
        assert_eq!(handle.name, "files/abc");
        assert_eq!(handle.uri, "https://files/abc");
        assert_eq!(handle.state, FileState::Processing);
    }

    #[test]
    fn missing_session_url_skips_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new();
        let start = server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .create();
        let transfer = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create();

        let (client, _) = client(&server, ClientOptions::default());
        let err = client.upload_file(&media(dir.path())).unwrap_err();

        assert!(matches!(err, ApiError::UploadProtocol(_)), "{err:?}");
        start.assert();
        transfer.assert();
    }

    #[test]
    fn rejected_start_is_a_status_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/upload/v1beta/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .create();

        let (client, _) = client(&server, ClientOptions::default());
        match client.upload_file(&media(dir.path())) {
            Err(ApiError::Status { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
