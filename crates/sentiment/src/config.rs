use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{NewsFeed, SentimentEstimator};

use crate::feeds::RssFeed;
use crate::http::HttpEstimator;

/// News sources and sentiment back-ends (TOML).
///
/// Example `config/sources.toml`:
/// ```toml
/// [[feed]]
/// name = "investing-gold"
/// url = "https://cn.investing.com/rss/news_285.rss"
/// language = "zh"
/// limit = 5
///
/// [[estimator]]
/// name = "deepseek-reasoner"
/// kind = "openai"
/// base_url = "https://api.deepseek.com/v1"
/// model = "deepseek-reasoner"
/// api_key_env = "DEEPSEEK_API_KEY"
/// weight = 0.6
///
/// [[estimator]]
/// name = "gemini-flash"
/// kind = "gemini"
/// model = "gemini-2.5-flash"
/// api_key_env = "GEMINI_API_KEY"
/// weight = 0.4
///
/// [cadence]
/// utc_offset_hours = 8
/// active_windows = ["09:00-15:30", "20:00-02:30"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesFileConfig {
    #[serde(rename = "feed", default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(rename = "estimator", default)]
    pub estimators: Vec<EstimatorConfig>,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub cadence: CadenceConfig,
    /// Upper bound for one estimator call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for SourcesFileConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            estimators: Vec::new(),
            relevance: RelevanceConfig::default(),
            cadence: CadenceConfig::default(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Items taken from the top of the feed per poll.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// OpenAI-compatible `/chat/completions`.
    OpenAi,
    /// Google `models/{model}:generateContent`.
    Gemini,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EstimatorConfig {
    pub name: String,
    pub kind: EstimatorKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Keyword table for the local relevance score. Each keyword found in a
/// title adds its weight; the total is capped at 10.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelevanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keywords")]
    pub keywords: HashMap<String, u8>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: default_keywords(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CadenceConfig {
    /// Offset of the exchange-local clock used for the session windows.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// When true, Saturday and Sunday sessions are always sentry.
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
    /// `"HH:MM-HH:MM"` local windows; an end before the start wraps past midnight.
    #[serde(default = "default_active_windows")]
    pub active_windows: Vec<String>,
    #[serde(default = "ModeConfig::active")]
    pub active: ModeConfig,
    #[serde(default = "ModeConfig::sentry")]
    pub sentry: ModeConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            weekdays_only: true,
            active_windows: default_active_windows(),
            active: ModeConfig::active(),
            sentry: ModeConfig::sentry(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ModeConfig {
    pub poll_secs: u64,
    pub relevance_threshold: u8,
}

impl ModeConfig {
    fn active() -> Self {
        Self {
            poll_secs: 300,
            relevance_threshold: 3,
        }
    }

    fn sentry() -> Self {
        Self {
            poll_secs: 1800,
            relevance_threshold: 6,
        }
    }
}

fn default_language() -> String {
    "en".into()
}
fn default_feed_limit() -> usize {
    5
}
fn default_weight() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_call_timeout_secs() -> u64 {
    90
}
fn default_utc_offset() -> i32 {
    8
}
fn default_active_windows() -> Vec<String> {
    vec!["09:00-15:30".into(), "20:00-02:30".into()]
}

fn default_keywords() -> HashMap<String, u8> {
    [
        ("gold", 4),
        ("黄金", 4),
        ("xau", 4),
        ("paxg", 4),
        ("bullion", 3),
        ("fed", 3),
        ("美联储", 3),
        ("interest rate", 3),
        ("利率", 3),
        ("inflation", 3),
        ("通胀", 3),
        ("cpi", 3),
        ("nonfarm", 3),
        ("非农", 3),
        ("central bank", 3),
        ("央行", 3),
        ("safe haven", 3),
        ("避险", 3),
        ("dollar", 2),
        ("美元", 2),
        ("treasury", 2),
        ("yield", 2),
        ("tariff", 2),
        ("关税", 2),
        ("conflict", 2),
        ("geopolitic", 2),
    ]
    .into_iter()
    .map(|(k, w)| (k.to_string(), w))
    .collect()
}

impl SourcesFileConfig {
    /// Load from a TOML file. A missing file yields an empty configuration
    /// (no feeds, no estimators); a malformed one exits the process.
    pub fn load(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path, "No sources config — sentiment will report unavailable");
                return Self::default();
            }
            Err(e) => panic!("Failed to read sources config at '{path}': {e}"),
        };
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse sources config at '{path}': {e}"))
    }

    pub fn build_feeds(&self) -> Vec<Arc<dyn NewsFeed>> {
        self.feeds
            .iter()
            .map(|cfg| {
                info!(name = %cfg.name, url = %cfg.url, "Registered news feed");
                Arc::new(RssFeed::new(cfg.clone())) as Arc<dyn NewsFeed>
            })
            .collect()
    }

    /// Build every estimator whose API key is present; the rest are skipped
    /// with a warning.
    pub fn build_estimators(&self) -> Vec<Arc<dyn SentimentEstimator>> {
        self.estimators
            .iter()
            .filter_map(|cfg| match HttpEstimator::from_config(cfg) {
                Ok(est) => {
                    info!(name = %cfg.name, weight = cfg.weight, "Registered sentiment estimator");
                    Some(Arc::new(est) as Arc<dyn SentimentEstimator>)
                }
                Err(e) => {
                    warn!(name = %cfg.name, error = %e, "Sentiment estimator skipped");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let raw = r#"
            call_timeout_secs = 30

            [[feed]]
            name = "investing-gold"
            url = "https://example.com/rss"
            language = "zh"

            [[estimator]]
            name = "fast"
            kind = "gemini"
            model = "gemini-2.5-flash"
            api_key_env = "GEMINI_API_KEY"
            weight = 0.4

            [relevance]
            enabled = false

            [cadence]
            utc_offset_hours = 0
            active_windows = ["08:00-16:00"]
            active = { poll_secs = 60, relevance_threshold = 2 }
        "#;
        let cfg: SourcesFileConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.feeds[0].limit, 5);
        assert_eq!(cfg.estimators[0].kind, EstimatorKind::Gemini);
        assert!(!cfg.relevance.enabled);
        assert!(cfg.relevance.keywords.contains_key("gold"));
        assert_eq!(cfg.cadence.active.poll_secs, 60);
        assert_eq!(cfg.cadence.sentry.poll_secs, 1800);
        assert_eq!(cfg.call_timeout_secs, 30);
    }

    #[test]
    fn empty_file_is_valid() {
        let cfg: SourcesFileConfig = toml::from_str("").unwrap();
        assert!(cfg.feeds.is_empty());
        assert!(cfg.estimators.is_empty());
        assert_eq!(cfg.cadence.utc_offset_hours, 8);
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let cfg = SourcesFileConfig::load("/definitely/not/here/sources.toml");
        assert!(cfg.feeds.is_empty());
    }
}
