use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::blocking::{Body, Client};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Payload of an [`ApiRequest`]. Bodies are replayable so the executor can
/// resend the same request after a backoff.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Streamed from disk on every attempt.
    File { path: PathBuf, len: u64 },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: &'static str, value: &str) -> ApiResult<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|err| ApiError::Request(format!("header {name}: {err}")))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn file(mut self, path: PathBuf, len: u64) -> Self {
        self.body = RequestBody::File { path, len };
        self
    }

    /// The URL with the `key` query parameter masked, for logs.
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "key" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        if pairs.is_empty() {
            return url.to_string();
        }
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Raises non-2xx statuses as [`ApiError::Status`].
    pub fn error_for_status(self, context: &'static str) -> ApiResult<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(ApiError::Status {
            context,
            status: self.status.as_u16(),
            body: self.text(),
        })
    }

    pub fn json<T: DeserializeOwned>(&self, context: &'static str) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|err| ApiError::malformed(context, err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    /// The exchange started but broke off (reset, truncated body, ...).
    Interrupted,
    /// Failed before anything reached the network.
    Local,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != TransportErrorKind::Local
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Performs exactly one HTTP exchange. Retrying is the executor's job.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => {
                let payload = serde_json::to_vec(value).map_err(|err| {
                    TransportError::new(TransportErrorKind::Local, err.to_string())
                })?;
                builder
                    .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(payload)
            }
            RequestBody::File { path, len } => {
                let file = File::open(path).map_err(|err| {
                    TransportError::new(
                        TransportErrorKind::Local,
                        format!("opening {}: {err}", path.display()),
                    )
                })?;
                builder.body(Body::sized(file, *len))
            }
        };

        let resp = builder.send().map_err(classify_reqwest_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().map_err(classify_reqwest_error)?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_builder() {
        TransportErrorKind::Local
    } else {
        TransportErrorKind::Interrupted
    };
    TransportError::new(kind, err.to_string())
}

/// Blocking wait used by backoff, cooldown and polling, plus the clock
/// those waits are measured against.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
