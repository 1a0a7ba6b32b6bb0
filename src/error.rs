use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the remote media service client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("still rate limited after {waits} cooldowns")]
    RateLimited { waits: u32 },

    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    #[error("upload protocol violation: {0}")]
    UploadProtocol(String),

    #[error("server failed to process {name}")]
    ProcessingFailed { name: String },

    #[error("{name} still {state} after waiting {}", human(.waited))]
    PollTimeout {
        name: String,
        state: String,
        waited: Duration,
    },

    #[error("malformed {context} response: {detail}")]
    MalformedResponse {
        context: &'static str,
        detail: String,
    },

    #[error("{context} failed with status {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not build request: {0}")]
    Request(String),
}

impl ApiError {
    /// Fatal errors abort the whole batch rather than the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::InvalidCredential(_))
    }

    pub fn malformed(context: &'static str, detail: impl ToString) -> Self {
        ApiError::MalformedResponse {
            context,
            detail: detail.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}
