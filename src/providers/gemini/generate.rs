use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::GeminiClient;
use crate::constants::API_VERSION;
use crate::core::UploadHandle;
use crate::error::{ApiError, ApiResult};
use crate::http::ApiRequest;
use crate::prompts::CAPTION_PROMPT;

/// What to do when a generation response carries no caption text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCaptionPolicy {
    /// Store the empty caption; the file counts as done.
    #[default]
    Record,
    /// Fail the file so the next run tries it again.
    Retry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// `candidates[0].content.parts[0].text`
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Model ids from the listing already carry the `models/` prefix; pinned
/// ones may not.
pub fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

pub fn caption_request(handle: &UploadHandle) -> Value {
    json!({
        "contents": [{
            "parts": [
                {"text": CAPTION_PROMPT},
                {"file_data": {"mime_type": handle.mime_type, "file_uri": handle.uri}}
            ]
        }]
    })
}

impl GeminiClient {
    pub fn generate_text(&self, handle: &UploadHandle, model: &str) -> ApiResult<String> {
        let url = self.endpoint(&format!(
            "{API_VERSION}/{}:generateContent",
            model_path(model)
        ))?;
        let request = ApiRequest::new(Method::POST, url).json(caption_request(handle));
        let payload: GenerateResponse = self
            .executor
            .execute(&request)?
            .error_for_status("generateContent")?
            .json("generateContent")?;

        if let Some(reason) = payload
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            warn!(handle = %handle.name, reason, "prompt blocked");
        }

        match payload.first_text() {
            Some(text) if !text.trim().is_empty() => {
                debug!(handle = %handle.name, chars = text.len(), "caption generated");
                Ok(text.to_string())
            }
            _ => {
                let finish = payload
                    .candidates
                    .first()
                    .and_then(|c| c.finish_reason.clone())
                    .unwrap_or_else(|| "none".to_string());
                match self.options.empty_captions {
                    EmptyCaptionPolicy::Record => {
                        warn!(handle = %handle.name, finish_reason = %finish, "no caption text; recording empty caption");
                        Ok(payload.first_text().unwrap_or_default().to_string())
                    }
                    EmptyCaptionPolicy::Retry => Err(ApiError::malformed(
                        "generateContent",
                        format!("no caption text (finish reason {finish})"),
                    )),
                }
            }
        }
    }
}
