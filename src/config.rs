use std::fs::File;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::constants::{API_KEY_ENV_VARS, DEFAULT_REQUEST_TIMEOUT, GEMINI_BASE_URL};
use crate::engine::BatchOptions;
use crate::providers::gemini::{ClientOptions, EmptyCaptionPolicy, ModelPreferences, PollOptions};
use crate::retry::RetryPolicy;

const CONFIG_CANDIDATES: &[&str] = &["clipscribe.yaml", "clipscribe.yml"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiCfg {
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "human_duration")]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetryCfg {
    pub max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "human_duration")]
    pub base_delay: Option<Duration>,
    #[serde(default, deserialize_with = "human_duration")]
    pub rate_limit_cooldown: Option<Duration>,
    pub max_rate_limit_waits: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PollCfg {
    #[serde(default, deserialize_with = "human_duration")]
    pub interval: Option<Duration>,
    #[serde(default, deserialize_with = "human_duration")]
    pub max_wait: Option<Duration>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BatchCfg {
    #[serde(default, deserialize_with = "human_duration")]
    pub inter_file_delay: Option<Duration>,
    pub store_file: Option<String>,
    pub empty_captions: Option<EmptyCaptionPolicy>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelsCfg {
    pub priorities: Option<Vec<String>>,
    pub default: Option<String>,
    pub pinned: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineCfg {
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Root {
    pub api: Option<ApiCfg>,
    pub retry: Option<RetryCfg>,
    pub poll: Option<PollCfg>,
    pub batch: Option<BatchCfg>,
    pub models: Option<ModelsCfg>,
    pub pipeline: Option<PipelineCfg>,
}

/// Process-wide settings, resolved once at startup and read-only after.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub client: ClientOptions,
    pub batch: BatchOptions,
    pub pipeline_command: Vec<String>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let root = match path {
            Some(p) => Some(Self::read_yaml(p)?),
            None => match CONFIG_CANDIDATES.iter().map(Path::new).find(|p| p.exists()) {
                Some(found) => Some(Self::read_yaml(found)?),
                None => None,
            },
        };
        Self::from_root(root.unwrap_or_default(), |name| std::env::var(name).ok())
    }

    fn read_yaml(path: &Path) -> anyhow::Result<Root> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        serde_yaml::from_reader(file).with_context(|| format!("parsing {}", path.display()))
    }

    fn from_root(root: Root, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api = root.api.unwrap_or_default();
        let retry = root.retry.unwrap_or_default();
        let poll = root.poll.unwrap_or_default();
        let batch = root.batch.unwrap_or_default();
        let models = root.models.unwrap_or_default();
        let pipeline = root.pipeline.unwrap_or_default();

        let mut base_url = env("CLIPSCRIBE_BASE_URL")
            .or(api.base_url)
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());
        // Endpoint paths are joined onto this; without the slash the last
        // segment would be replaced.
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url =
            Url::parse(&base_url).with_context(|| format!("invalid base URL '{base_url}'"))?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: retry.base_delay.unwrap_or(defaults.base_delay),
            rate_limit_cooldown: retry
                .rate_limit_cooldown
                .unwrap_or(defaults.rate_limit_cooldown),
            max_rate_limit_waits: retry.max_rate_limit_waits,
        };
        if retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }

        let poll_defaults = PollOptions::default();
        let poll = PollOptions {
            interval: poll.interval.unwrap_or(poll_defaults.interval),
            max_wait: poll.max_wait,
        };
        if poll.interval.is_zero() {
            bail!("poll.interval must be greater than zero");
        }

        let model_defaults = ModelPreferences::default();
        let models = ModelPreferences {
            priorities: models.priorities.unwrap_or(model_defaults.priorities),
            fallback: models.default.unwrap_or(model_defaults.fallback),
            pinned: env("CLIPSCRIBE_MODEL").or(models.pinned),
        };

        let batch_defaults = BatchOptions::default();
        let empty_captions = batch.empty_captions.unwrap_or_default();
        let batch = BatchOptions {
            inter_file_delay: batch
                .inter_file_delay
                .unwrap_or(batch_defaults.inter_file_delay),
            store_file: batch.store_file.unwrap_or(batch_defaults.store_file),
        };

        let pipeline_command = env("CLIPSCRIBE_PIPELINE")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .or(pipeline.command)
            .unwrap_or_default();

        Ok(Self {
            base_url,
            request_timeout: api.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            retry,
            client: ClientOptions {
                poll,
                models,
                empty_captions,
            },
            batch,
            pipeline_command,
        })
    }
}

/// Environment first (`GEMINI_API_KEY`, then `GOOGLE_API_KEY`), then the
/// command-line value.
pub fn resolve_api_key(
    env: impl Fn(&str) -> Option<String>,
    cli_value: Option<String>,
) -> anyhow::Result<String> {
    API_KEY_ENV_VARS
        .iter()
        .find_map(|name| env(name))
        .or(cli_value)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "API key not found; set {} or pass it after the directory",
                API_KEY_ENV_VARS.join(" or ")
            )
        })
}

fn human_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_service_behavior() {
        let cfg = AppConfig::from_root(Root::default(), env(&[])).unwrap();
        assert_eq!(cfg.base_url.as_str(), "https://generativelanguage.googleapis.com/");
        assert_eq!(cfg.retry.max_attempts, 10);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(5));
        assert_eq!(cfg.retry.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(cfg.retry.max_rate_limit_waits, None);
        assert_eq!(cfg.client.poll.interval, Duration::from_secs(2));
        assert_eq!(cfg.client.poll.max_wait, None);
        assert_eq!(cfg.client.empty_captions, EmptyCaptionPolicy::Record);
        assert_eq!(cfg.batch.inter_file_delay, Duration::from_secs(10));
        assert_eq!(cfg.batch.store_file, "captions.json");
        assert_eq!(cfg.client.models.fallback, "models/gemini-1.5-flash");
        assert!(cfg.pipeline_command.is_empty());
    }

    #[test]
    fn yaml_overrides_and_env_wins() {
        let root: Root = serde_yaml::from_str(
            r#"
api:
  base_url: http://localhost:9000
retry:
  max_attempts: 4
  base_delay: 500ms
  max_rate_limit_waits: 30
poll:
  max_wait: 15m
batch:
  inter_file_delay: 1s
  empty_captions: retry
models:
  priorities: [gemini-2.0-flash]
  pinned: models/gemini-2.0-flash
pipeline:
  command: [python, run_inference.py]
"#,
        )
        .unwrap();
        let cfg = AppConfig::from_root(root, env(&[("CLIPSCRIBE_MODEL", "gemini-2.5-pro")])).unwrap();

        assert_eq!(cfg.base_url.as_str(), "http://localhost:9000/");
        assert_eq!(cfg.retry.max_attempts, 4);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(500));
        assert_eq!(cfg.retry.max_rate_limit_waits, Some(30));
        assert_eq!(cfg.client.poll.max_wait, Some(Duration::from_secs(900)));
        assert_eq!(cfg.client.empty_captions, EmptyCaptionPolicy::Retry);
        assert_eq!(cfg.batch.inter_file_delay, Duration::from_secs(1));
        assert_eq!(cfg.client.models.priorities, vec!["gemini-2.0-flash"]);
        assert_eq!(cfg.client.models.pinned.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(cfg.pipeline_command, vec!["python", "run_inference.py"]);
    }

    #[test]
    fn rejects_bad_durations_and_unknown_sections() {
        assert!(serde_yaml::from_str::<Root>("poll:\n  interval: soon\n").is_err());
        assert!(serde_yaml::from_str::<Root>("colors: true\n").is_err());
    }

    #[test]
    fn base_url_keeps_its_path_prefix() {
        let cfg = AppConfig::from_root(
            Root::default(),
            env(&[("CLIPSCRIBE_BASE_URL", "http://proxy.local/gemini")]),
        )
        .unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://proxy.local/gemini/");
        assert_eq!(
            cfg.base_url.join("v1beta/models").unwrap().as_str(),
            "http://proxy.local/gemini/v1beta/models"
        );
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let root: Root = serde_yaml::from_str("poll:\n  interval: 0s\n").unwrap();
        let err = AppConfig::from_root(root, env(&[])).unwrap_err();
        assert!(err.to_string().contains("poll.interval"), "{err}");
    }

    #[test]
    fn api_key_prefers_environment() {
        let key = resolve_api_key(
            env(&[("GOOGLE_API_KEY", "google"), ("GEMINI_API_KEY", "gemini")]),
            Some("cli".into()),
        )
        .unwrap();
        assert_eq!(key, "gemini");

        let key = resolve_api_key(env(&[("GOOGLE_API_KEY", "google")]), Some("cli".into())).unwrap();
        assert_eq!(key, "google");

        let key = resolve_api_key(env(&[]), Some("cli".into())).unwrap();
        assert_eq!(key, "cli");
    }

    #[test]
    fn missing_api_key_is_an_error() {
        assert!(resolve_api_key(env(&[]), None).is_err());
        assert!(resolve_api_key(env(&[]), Some("  ".into())).is_err());
    }
}
