use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use common::{Error, Result, SentimentEstimator};

use crate::config::{EstimatorConfig, EstimatorKind};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Remote LLM estimator speaking either the OpenAI chat-completions or the
/// Gemini `generateContent` protocol.
pub struct HttpEstimator {
    name: String,
    kind: EstimatorKind,
    model: String,
    base_url: String,
    api_key: String,
    weight: f64,
    http: Client,
}

impl HttpEstimator {
    /// Build from config, reading the API key from the named env var.
    pub fn from_config(cfg: &EstimatorConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!("environment variable '{}' is not set", cfg.api_key_env))
            })?;
        if !(cfg.weight.is_finite() && cfg.weight > 0.0) {
            return Err(Error::Config(format!(
                "estimator '{}' weight must be positive, got {}",
                cfg.name, cfg.weight
            )));
        }
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| match cfg.kind {
                EstimatorKind::OpenAi => OPENAI_BASE_URL.into(),
                EstimatorKind::Gemini => GEMINI_BASE_URL.into(),
            })
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            model: cfg.model.clone(),
            base_url,
            api_key,
            weight: cfg.weight,
            http,
        })
    }

    async fn post_json(&self, request: reqwest::RequestBuilder, body: serde_json::Value) -> Result<String> {
        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Estimator(format!("{}: HTTP {status}: {text}", self.name)));
        }
        Ok(text)
    }
}

#[async_trait]
impl SentimentEstimator for HttpEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn score(&self, prompt: &str) -> Result<String> {
        debug!(estimator = %self.name, model = %self.model, "Requesting sentiment");
        match self.kind {
            EstimatorKind::OpenAi => {
                let url = format!("{}/chat/completions", self.base_url);
                let body = json!({
                    "model": self.model,
                    "messages": [{ "role": "user", "content": prompt }],
                    "temperature": 0.3,
                });
                let request = self.http.post(&url).bearer_auth(&self.api_key);
                extract_openai_text(&self.post_json(request, body).await?)
            }
            EstimatorKind::Gemini => {
                let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
                let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
                let request = self.http.post(&url).header("x-goog-api-key", &self.api_key);
                extract_gemini_text(&self.post_json(request, body).await?)
            }
        }
    }
}

// ─── Response shapes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

fn extract_openai_text(body: &str) -> Result<String> {
    let resp: ChatResponse = serde_json::from_str(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Estimator("empty chat completion".into()))
}

fn extract_gemini_text(body: &str) -> Result<String> {
    let resp: GeminiResponse = serde_json::from_str(body)?;
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(Error::Estimator("empty Gemini candidate".into()));
    }
    Ok(text)
}
