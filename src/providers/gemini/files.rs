use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use super::GeminiClient;
use crate::constants::{API_VERSION, DEFAULT_POLL_INTERVAL};
use crate::core::{FileState, UploadHandle};
use crate::error::{ApiError, ApiResult};
use crate::http::ApiRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// `None` polls until the server reaches a terminal state.
    pub max_wait: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

impl GeminiClient {
    /// `name` is the resource name (`files/...`) returned by the upload.
    pub fn get_file(&self, name: &str) -> ApiResult<UploadHandle> {
        let request = ApiRequest::get(self.endpoint(&format!("{API_VERSION}/{name}"))?);
        self.executor
            .execute(&request)?
            .error_for_status("files.get")?
            .json("files.get")
    }

    pub fn wait_until_active(&self, handle: &UploadHandle) -> ApiResult<UploadHandle> {
        let poll = self.options.poll;
        let started = self.sleeper.now();
        loop {
            let current = self.get_file(&handle.name)?;
            let waited = self.sleeper.now().saturating_duration_since(started);
            match current.state {
                FileState::Active => {
                    info!(handle = %handle.name, waited_ms = waited.as_millis() as u64, "file active");
                    return Ok(current);
                }
                FileState::Failed => {
                    return Err(ApiError::ProcessingFailed {
                        name: handle.name.clone(),
                    })
                }
                _ => {}
            }

            if let Some(max_wait) = poll.max_wait {
                if waited >= max_wait {
                    self.monitor.note_event(
                        "poll.timeout",
                        json!({"name": handle.name, "state": current.state.as_str()}),
                    );
                    return Err(ApiError::PollTimeout {
                        name: handle.name.clone(),
                        state: current.state.to_string(),
                        waited,
                    });
                }
            }

            debug!(handle = %handle.name, state = %current.state, "still processing");
            self.monitor.status().tick();
            self.sleeper.sleep(poll.interval);
        }
    }
}
