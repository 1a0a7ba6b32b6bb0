//! Client for the Gemini Files and generateContent REST endpoints.

mod files;
mod generate;
mod models;
mod upload;

use std::sync::Arc;

use url::Url;

pub use files::PollOptions;
pub use generate::EmptyCaptionPolicy;
pub use models::ModelPreferences;

use crate::core::{CaptionService, MediaFile, UploadHandle};
use crate::error::{ApiError, ApiResult};
use crate::http::Sleeper;
use crate::retry::RequestExecutor;
use crate::telemetry::RunMonitor;

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub poll: PollOptions,
    pub models: ModelPreferences,
    pub empty_captions: EmptyCaptionPolicy,
}

pub struct GeminiClient {
    api_key: String,
    base_url: Url,
    executor: RequestExecutor,
    sleeper: Arc<dyn Sleeper>,
    monitor: RunMonitor,
    options: ClientOptions,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        base_url: Url,
        executor: RequestExecutor,
        sleeper: Arc<dyn Sleeper>,
        monitor: RunMonitor,
        options: ClientOptions,
    ) -> Self {
        Self {
            api_key,
            base_url,
            executor,
            sleeper,
            monitor,
            options,
        }
    }

    /// Resolves `path` against the base URL and appends the API key.
    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::Request(format!("endpoint {path}: {err}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

impl CaptionService for GeminiClient {
    fn select_model(&self) -> ApiResult<String> {
        self.resolve_model()
    }

    fn upload(&self, media: &MediaFile) -> ApiResult<UploadHandle> {
        self.upload_file(media)
    }

    fn await_active(&self, handle: &UploadHandle) -> ApiResult<UploadHandle> {
        self.wait_until_active(handle)
    }

    fn generate_caption(&self, handle: &UploadHandle, model: &str) -> ApiResult<String> {
        self.generate_text(handle, model)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use url::Url;

    use super::{ClientOptions, GeminiClient};
    use crate::http::{ApiResponse, ReqwestTransport, Transport, TransportError};
    use crate::retry::{RequestExecutor, RetryPolicy};
    use crate::telemetry::RunMonitor;
    use crate::testing::{RecordingSleeper, ScriptedTransport};

    pub const KEY: &str = "test-key";

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            rate_limit_cooldown: Duration::from_millis(1),
            max_rate_limit_waits: None,
        }
    }

    fn build(
        transport: Box<dyn Transport>,
        base_url: &str,
        options: ClientOptions,
        policy: RetryPolicy,
    ) -> (GeminiClient, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let monitor = RunMonitor::quiet();
        let executor = RequestExecutor::new(transport, policy, sleeper.clone(), monitor.clone());
        let client = GeminiClient::new(
            KEY.to_string(),
            Url::parse(base_url).unwrap(),
            executor,
            sleeper.clone(),
            monitor,
            options,
        );
        (client, sleeper)
    }

    /// A client pointed at a mockito server with instant, recorded sleeps.
    pub fn client(
        server: &mockito::Server,
        options: ClientOptions,
    ) -> (GeminiClient, Arc<RecordingSleeper>) {
        let transport = ReqwestTransport::new(Duration::from_secs(10)).unwrap();
        build(Box::new(transport), &server.url(), options, fast_policy())
    }

    /// A client that replays canned responses instead of talking HTTP.
    pub fn scripted_client(
        script: Vec<Result<ApiResponse, TransportError>>,
        options: ClientOptions,
    ) -> (GeminiClient, Arc<RecordingSleeper>, ScriptedTransport) {
        scripted_client_with_policy(script, options, fast_policy())
    }

    pub fn scripted_client_with_policy(
        script: Vec<Result<ApiResponse, TransportError>>,
        options: ClientOptions,
        policy: RetryPolicy,
    ) -> (GeminiClient, Arc<RecordingSleeper>, ScriptedTransport) {
        let transport = ScriptedTransport::new(script);
        let (client, sleeper) = build(
            Box::new(transport.clone()),
            "https://generativelanguage.test",
            options,
            policy,
        );
        (client, sleeper, transport)
    }
}
