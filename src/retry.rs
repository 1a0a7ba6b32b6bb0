use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_COOLDOWN, INVALID_KEY_REASON,
};
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, ApiResponse, Sleeper, Transport, TransportError};
use crate::telemetry::RunMonitor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transport failures and 5xx responses.
    pub max_attempts: u32,
    /// Linear backoff unit: the n-th failure waits `base_delay * n`.
    pub base_delay: Duration,
    pub rate_limit_cooldown: Duration,
    /// `None` keeps waiting out 429s forever.
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            max_rate_limit_waits: None,
        }
    }
}

/// Counters carried across attempts of one request. 429 cooldowns and hard
/// failures are tracked separately so rate limiting never burns the failure
/// budget.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub failures: u32,
    pub rate_limit_waits: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Transport(&'a TransportError),
    Response { status: StatusCode, body: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the response to the caller, whatever its status.
    Accept,
    Retry { delay: Duration, class: RetryClass },
    /// Budget spent or the failure is not retryable.
    GiveUp,
    /// The credential was rejected; nothing else will work either.
    Fatal(String),
}

impl RetryPolicy {
    pub fn decide(&self, state: &AttemptState, outcome: Outcome<'_>) -> Verdict {
        match outcome {
            Outcome::Transport(err) if !err.is_retryable() => Verdict::GiveUp,
            Outcome::Transport(_) => self.transient(state),
            Outcome::Response { status, .. } if status == StatusCode::TOO_MANY_REQUESTS => {
                match self.max_rate_limit_waits {
                    Some(limit) if state.rate_limit_waits >= limit => Verdict::GiveUp,
                    _ => Verdict::Retry {
                        delay: self.rate_limit_cooldown,
                        class: RetryClass::RateLimited,
                    },
                }
            }
            Outcome::Response { status, body } if status == StatusCode::BAD_REQUEST => {
                match invalid_credential_message(body) {
                    Some(message) => Verdict::Fatal(message),
                    None => Verdict::Accept,
                }
            }
            Outcome::Response { status, .. } if status.is_server_error() => self.transient(state),
            Outcome::Response { .. } => Verdict::Accept,
        }
    }

    fn transient(&self, state: &AttemptState) -> Verdict {
        if state.failures + 1 >= self.max_attempts {
            return Verdict::GiveUp;
        }
        Verdict::Retry {
            delay: self.base_delay * (state.failures + 1),
            class: RetryClass::Transient,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// Recognizes the service's "bad API key" 400 and returns its message.
pub fn invalid_credential_message(body: &[u8]) -> Option<String> {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        let reason_matches = envelope
            .error
            .details
            .first()
            .and_then(|detail| detail.reason.as_deref())
            .is_some_and(|reason| reason.contains(INVALID_KEY_REASON));
        if reason_matches || envelope.error.message.contains("API key") {
            return Some(envelope.error.message);
        }
        return None;
    }
    let raw = String::from_utf8_lossy(body);
    raw.contains(INVALID_KEY_REASON).then(|| raw.trim().to_string())
}

/// Sends requests through a [`Transport`], applying a [`RetryPolicy`].
pub struct RequestExecutor {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    monitor: RunMonitor,
}

impl RequestExecutor {
    pub fn new(
        transport: Box<dyn Transport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        monitor: RunMonitor,
    ) -> Self {
        Self {
            transport,
            policy,
            sleeper,
            monitor,
        }
    }

    /// Returns the first accepted response. Non-2xx statuses other than
    /// 429/5xx come back untouched; callers decide whether they are errors.
    pub fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let mut state = AttemptState::default();
        loop {
            let sent = self.transport.send(request);
            let verdict = match &sent {
                Ok(resp) => self.policy.decide(
                    &state,
                    Outcome::Response {
                        status: resp.status,
                        body: &resp.body,
                    },
                ),
                Err(err) => self.policy.decide(&state, Outcome::Transport(err)),
            };

            match verdict {
                Verdict::Accept => {
                    // Transport errors are never accepted by the policy.
                    return sent.map_err(|err| ApiError::Request(err.message));
                }
                Verdict::Fatal(message) => {
                    error!(url = %request.redacted_url(), "credential rejected: {message}");
                    return Err(ApiError::InvalidCredential(message));
                }
                Verdict::GiveUp => return Err(give_up_error(&state, sent)),
                Verdict::Retry { delay, class } => {
                    let cause = describe(&sent);
                    match class {
                        RetryClass::RateLimited => {
                            state.rate_limit_waits += 1;
                            warn!(
                                url = %request.redacted_url(),
                                wait = state.rate_limit_waits,
                                delay_ms = delay.as_millis() as u64,
                                "rate limited"
                            );
                            self.monitor.note_event(
                                "retry.rate_limited",
                                json!({
                                    "wait": state.rate_limit_waits,
                                    "delay_ms": delay.as_millis(),
                                }),
                            );
                            self.monitor.status().transient(&format!(
                                "  [Rate Limit] Hit 429. Waiting {}...",
                                humantime::format_duration(delay)
                            ));
                        }
                        RetryClass::Transient => {
                            state.failures += 1;
                            debug!(
                                url = %request.redacted_url(),
                                attempt = state.failures,
                                delay_ms = delay.as_millis() as u64,
                                "retrying after {cause}"
                            );
                            self.monitor.note_event(
                                "retry.transient",
                                json!({
                                    "attempt": state.failures,
                                    "delay_ms": delay.as_millis(),
                                    "error": cause,
                                }),
                            );
                            self.monitor.status().transient(&format!(
                                "  [Retry {}/{}] Network/Server error: {}. Waiting {}...",
                                state.failures,
                                self.policy.max_attempts,
                                cause,
                                humantime::format_duration(delay)
                            ));
                        }
                    }
                    self.sleeper.sleep(delay);
                }
            }
        }
    }
}

fn describe(sent: &Result<ApiResponse, TransportError>) -> String {
    match sent {
        Ok(resp) => format!("status {}", resp.status),
        Err(err) => err.to_string(),
    }
}

fn give_up_error(state: &AttemptState, sent: Result<ApiResponse, TransportError>) -> ApiError {
    match sent {
        Err(err) if !err.is_retryable() => ApiError::Request(err.message),
        Err(err) => ApiError::Transient {
            attempts: state.failures + 1,
            message: err.to_string(),
        },
        Ok(resp) if resp.status == StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            waits: state.rate_limit_waits,
        },
        Ok(resp) => ApiError::Transient {
            attempts: state.failures + 1,
            message: format!("status {}: {}", resp.status, resp.text()),
        },
    }
}
