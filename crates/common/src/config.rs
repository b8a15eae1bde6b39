/// Process configuration loaded from environment variables at startup.
/// A missing required variable causes an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Market
    pub market_pair: String,
    pub tick_interval_secs: u64,
    pub candle_capacity: usize,
    /// Kline interval used for optimizer history, e.g. "15m".
    pub history_interval: String,

    // Telegram (disabled when no token is set)
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Dashboard
    pub dashboard_token: String,
    pub dashboard_port: u16,

    // Files
    pub settings_path: String,
    pub sources_config_path: String,

    pub optimize_on_start: bool,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let telegram_allowed_user_ids = optional_env("TELEGRAM_ALLOWED_USER_IDS")
            .map(|ids| parse_user_ids(&ids))
            .unwrap_or_default();

        Config {
            market_pair: optional_env("MARKET_PAIR").unwrap_or_else(|| "PAXGUSDT".to_string()),
            tick_interval_secs: optional_env("TICK_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            candle_capacity: optional_env("CANDLE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            history_interval: optional_env("HISTORY_INTERVAL")
                .unwrap_or_else(|| "15m".to_string()),
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()),
            telegram_allowed_user_ids,
            dashboard_token: required_env("DASHBOARD_TOKEN"),
            dashboard_port: optional_env("DASHBOARD_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            settings_path: optional_env("SETTINGS_PATH")
                .unwrap_or_else(|| "config/settings.json".to_string()),
            sources_config_path: optional_env("SOURCES_CONFIG_PATH")
                .unwrap_or_else(|| "config/sources.toml".to_string()),
            optimize_on_start: optional_env("OPTIMIZE_ON_START")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

fn parse_user_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse::<i64>().unwrap_or_else(|_| {
                panic!(
                    "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                    s.trim()
                )
            })
        })
        .collect()
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_are_trimmed_and_blank_entries_skipped() {
        assert_eq!(parse_user_ids(" 12, 34 ,,"), vec![12, 34]);
    }

    #[test]
    #[should_panic(expected = "non-numeric")]
    fn non_numeric_user_id_panics() {
        parse_user_ids("12,abc");
    }
}
