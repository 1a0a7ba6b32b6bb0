use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::GeminiClient;
use crate::constants::{API_VERSION, DEFAULT_MODEL, GENERATE_CONTENT_METHOD, MODEL_PRIORITIES};
use crate::error::ApiResult;
use crate::http::ApiRequest;

const MAX_MODEL_PAGES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPage {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPreferences {
    /// Name substrings, most preferred first.
    pub priorities: Vec<String>,
    pub fallback: String,
    /// Skips listing entirely when set.
    pub pinned: Option<String>,
}

impl Default for ModelPreferences {
    fn default() -> Self {
        Self {
            priorities: MODEL_PRIORITIES.iter().map(|p| p.to_string()).collect(),
            fallback: DEFAULT_MODEL.to_string(),
            pinned: None,
        }
    }
}

/// Priority order wins over listing order; without a priority hit the first
/// model that can generate content is used.
pub fn choose_model<'a>(models: &'a [ModelInfo], priorities: &[String]) -> Option<&'a ModelInfo> {
    priorities
        .iter()
        .find_map(|priority| models.iter().find(|m| m.name.contains(priority.as_str())))
        .or_else(|| {
            models.iter().find(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_CONTENT_METHOD)
            })
        })
}

impl GeminiClient {
    pub fn list_models(&self) -> ApiResult<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_MODEL_PAGES {
            let mut url = self.endpoint(&format!("{API_VERSION}/models"))?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: ModelPage = self
                .executor
                .execute(&ApiRequest::get(url))?
                .error_for_status("models.list")?
                .json("models.list")?;
            models.extend(page.models);
            page_token = page.next_page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                break;
            }
        }
        Ok(models)
    }

    /// Listing problems degrade to the configured fallback; only a rejected
    /// credential propagates.
    pub fn resolve_model(&self) -> ApiResult<String> {
        let prefs = &self.options.models;
        if let Some(pinned) = &prefs.pinned {
            info!(model = %pinned, "using pinned model");
            return Ok(pinned.clone());
        }

        let models = match self.list_models() {
            Ok(models) => models,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("could not list models ({err}); using {}", prefs.fallback);
                self.monitor.note_event(
                    "model.fallback",
                    json!({"reason": err.to_string(), "model": prefs.fallback}),
                );
                return Ok(prefs.fallback.clone());
            }
        };

        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        info!(available = ?names, "listed models");

        match choose_model(&models, &prefs.priorities) {
            Some(model) => {
                info!(model = %model.name, "selected model");
                Ok(model.name.clone())
            }
            None => {
                warn!("no usable model advertised; using {}", prefs.fallback);
                self.monitor
                    .note_event("model.fallback", json!({"model": prefs.fallback}));
                Ok(prefs.fallback.clone())
            }
        }
    }
}
