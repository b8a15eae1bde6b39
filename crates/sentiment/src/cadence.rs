use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use serde::Serialize;

use common::{Error, Result};

use crate::config::{CadenceConfig, ModeConfig};

/// Operating regime of the sentiment loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceMode {
    /// Market session: poll often, accept weaker headlines.
    Active,
    /// Off hours: poll rarely, only strong headlines.
    Sentry,
}

impl std::fmt::Display for CadenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CadenceMode::Active => write!(f, "active"),
            CadenceMode::Sentry => write!(f, "sentry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSettings {
    pub poll_interval: Duration,
    pub relevance_threshold: u8,
}

impl From<ModeConfig> for ModeSettings {
    fn from(cfg: ModeConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(cfg.poll_secs.max(1)),
            relevance_threshold: cfg.relevance_threshold.min(crate::relevance::MAX_RELEVANCE),
        }
    }
}

/// Picks the mode from wall-clock time and weekday only.
#[derive(Debug, Clone)]
pub struct Cadence {
    offset: FixedOffset,
    weekdays_only: bool,
    windows: Vec<(NaiveTime, NaiveTime)>,
    active: ModeSettings,
    sentry: ModeSettings,
}

impl Cadence {
    pub fn from_config(cfg: &CadenceConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(cfg.utc_offset_hours * 3600).ok_or_else(|| {
            Error::Config(format!("utc_offset_hours out of range: {}", cfg.utc_offset_hours))
        })?;
        let windows = cfg
            .active_windows
            .iter()
            .map(|w| parse_window(w))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            offset,
            weekdays_only: cfg.weekdays_only,
            windows,
            active: cfg.active.into(),
            sentry: cfg.sentry.into(),
        })
    }

    pub fn mode_at(&self, now: DateTime<Utc>) -> CadenceMode {
        let local = now.with_timezone(&self.offset);
        let time = local.time();
        let today = local.weekday();
        let yesterday = today.pred();

        let active = self.windows.iter().any(|&(start, end)| {
            if start <= end {
                start <= time && time < end && self.trading_day(today)
            } else if time >= start {
                self.trading_day(today)
            } else {
                // After midnight: the session belongs to the day it opened.
                time < end && self.trading_day(yesterday)
            }
        });

        if active {
            CadenceMode::Active
        } else {
            CadenceMode::Sentry
        }
    }

    pub fn settings(&self, mode: CadenceMode) -> ModeSettings {
        match mode {
            CadenceMode::Active => self.active,
            CadenceMode::Sentry => self.sentry,
        }
    }

    fn trading_day(&self, day: Weekday) -> bool {
        !self.weekdays_only || !matches!(day, Weekday::Sat | Weekday::Sun)
    }
}

fn parse_window(raw: &str) -> Result<(NaiveTime, NaiveTime)> {
    let bad = || Error::Config(format!("invalid active window '{raw}', expected HH:MM-HH:MM"));
    let (start, end) = raw.split_once('-').ok_or_else(bad)?;
    let parse = |s: &str| NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| bad());
    Ok((parse(start)?, parse(end)?))
}
