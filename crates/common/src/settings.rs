use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{Error, PortfolioState, Result, StrategyParams};

/// Persisted user settings (JSON).
///
/// Only `assets` and `strategy_params` are owned by the advisor. Every other
/// top-level field (credentials, UI state, the `arbiter` section) is carried
/// through untouched.
///
/// ```json
/// {
///   "assets": { "holdings": 5000.0, "cash": 10000.0 },
///   "strategy_params": { "rsi_period": 14, "sma_slow": 30 },
///   "email": { "sender": "...", "password": "..." }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub assets: PortfolioState,
    #[serde(default)]
    pub strategy_params: StrategyParams,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Load settings from `path`. A missing or corrupt file yields defaults
    /// instead of blocking startup.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file — using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings unreadable — using defaults");
                return Self::default();
            }
        };

        let mut extra = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %path.display(), "Settings root is not an object — using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings malformed — using defaults");
                return Self::default();
            }
        };

        // Each owned field falls back on its own so one bad value does not
        // reset the other.
        let assets: PortfolioState = owned_field(&mut extra, "assets");
        let mut strategy_params: StrategyParams = owned_field(&mut extra, "strategy_params");
        if let Err(e) = strategy_params.validate() {
            warn!(error = %e, "Persisted strategy params rejected — using defaults");
            strategy_params = StrategyParams::default();
        }

        info!(path = %path.display(), "Settings loaded");
        Self {
            assets: sanitize_assets(assets),
            strategy_params,
            extra,
        }
    }

    /// Deserialize a foreign section, e.g. `"arbiter"`. `None` when the
    /// section is absent or does not parse.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.extra.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(section = key, error = %e, "Settings section malformed — ignoring");
                None
            }
        }
    }

    /// Write the owned fields back to `path`.
    ///
    /// The current file is re-read first so fields written by other tools
    /// since startup are preserved; only `assets` and `strategy_params` are
    /// replaced. The write goes through a temporary file and a rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let mut root: Map<String, Value> = fs::read_to_string(path)
            .ok()
            .and_then(|c| serde_json::from_str::<Value>(&c).ok())
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();

        for (key, value) in &self.extra {
            root.entry(key.clone()).or_insert_with(|| value.clone());
        }
        root.insert("assets".into(), serde_json::to_value(self.assets)?);
        root.insert(
            "strategy_params".into(),
            serde_json::to_value(&self.strategy_params)?,
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&Value::Object(root))?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path).map_err(|e| {
            Error::Settings(format!("failed to replace '{}': {e}", path.display()))
        })?;

        info!(path = %path.display(), "Settings saved");
        Ok(())
    }
}

/// Remove `key` from `root` and decode it, defaulting when absent or malformed.
fn owned_field<T: DeserializeOwned + Default>(root: &mut Map<String, Value>, key: &str) -> T {
    let Some(value) = root.remove(key) else {
        return T::default();
    };
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(field = key, error = %e, "Settings field malformed — using defaults");
        T::default()
    })
}

fn sanitize_assets(assets: PortfolioState) -> PortfolioState {
    let clean = |v: f64| if v.is_finite() && v >= 0.0 { v } else { 0.0 };
    PortfolioState {
        holdings: clean(assets.holdings),
        cash: clean(assets.cash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(dir.path().join("nope.json"));
        assert_eq!(s.assets, PortfolioState::default());
        assert_eq!(s.strategy_params, StrategyParams::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ this is not json").unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.strategy_params, StrategyParams::default());
    }

    #[test]
    fn invalid_params_are_replaced_but_assets_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = json!({
            "assets": { "holdings": 1200.0, "cash": 300.0 },
            "strategy_params": { "sma_fast": 40, "sma_slow": 20 }
        });
        fs::write(&path, body.to_string()).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.assets.holdings, 1200.0);
        assert_eq!(s.strategy_params, StrategyParams::default());
    }

    #[test]
    fn partial_params_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"strategy_params": {"rsi_period": 18}}"#).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.strategy_params.rsi_period, 18);
        assert_eq!(s.strategy_params.sma_slow, 30);
    }

    #[test]
    fn save_preserves_foreign_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = json!({
            "assets": { "holdings": 0.0, "cash": 100.0 },
            "email": { "sender": "me@example.com", "password": "secret" }
        });
        fs::write(&path, body.to_string()).unwrap();

        let mut s = Settings::load(&path);
        s.assets.cash = 2500.0;
        s.strategy_params.bb_period = 24;
        s.save(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["email"]["password"], "secret");
        assert_eq!(written["assets"]["cash"], 2500.0);
        assert_eq!(written["strategy_params"]["bb_period"], 24);
    }

    #[test]
    fn save_keeps_fields_added_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{}").unwrap();
        let s = Settings::load(&path);

        fs::write(&path, r#"{"telegram": {"chat": 42}}"#).unwrap();
        s.save(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["telegram"]["chat"], 42);
        assert!(written.get("assets").is_some());
    }

    #[test]
    fn section_reads_foreign_struct() {
        #[derive(Deserialize)]
        struct Arbiter {
            buy_ratio: f64,
        }
        let s: Settings = serde_json::from_value(json!({ "arbiter": { "buy_ratio": 0.3 } })).unwrap();
        let a: Arbiter = s.section("arbiter").unwrap();
        assert_eq!(a.buy_ratio, 0.3);
        assert!(s.section::<Arbiter>("missing").is_none());
    }

    #[test]
    fn mistyped_params_keep_assets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = json!({
            "assets": { "holdings": 1500.0, "cash": 250.0 },
            "strategy_params": { "rsi_period": "fourteen" },
            "email": { "sender": "me@example.com" }
        });
        fs::write(&path, body.to_string()).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.assets, PortfolioState { holdings: 1500.0, cash: 250.0 });
        assert_eq!(s.strategy_params, StrategyParams::default());
        assert!(s.extra.contains_key("email"));
        assert!(!s.extra.contains_key("strategy_params"));
    }

    #[test]
    fn mistyped_assets_keep_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = json!({
            "assets": { "holdings": "lots" },
            "strategy_params": { "rsi_period": 18 }
        });
        fs::write(&path, body.to_string()).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.assets, PortfolioState::default());
        assert_eq!(s.strategy_params.rsi_period, 18);
    }

    #[test]
    fn negative_assets_are_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"assets": {"holdings": -5.0, "cash": 10.0}}"#).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.assets.holdings, 0.0);
        assert_eq!(s.assets.cash, 10.0);
    }
}
