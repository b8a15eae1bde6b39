use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{round_currency, Action, Advice, PortfolioState, Signal};

/// Sizing and veto constants. Empirical; tune through the `arbiter`
/// section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Fraction of cash committed by a plain BUY (e.g. 0.2 = 20%).
    pub buy_ratio: f64,
    /// Fraction of holdings released by a plain SELL.
    pub sell_ratio: f64,
    /// Floor for any suggested trade before capping.
    pub min_trade_amount: f64,
    /// Cash (for BUY) or holdings (for SELL) below this means nothing to trade.
    pub min_balance: f64,
    /// A BUY is vetoed when sentiment is at or below this.
    pub buy_veto: i32,
    /// A SELL is vetoed when sentiment is at or above this.
    pub sell_veto: i32,
    /// A SELL with sentiment strictly below this liquidates all holdings.
    pub panic_threshold: i32,
    /// Multiplier applied when sentiment mildly disagrees with the signal.
    pub divergence_ratio: f64,
    /// Extra multiplier for a SELL backed by negative sentiment.
    pub sell_aggression: f64,
    /// Physical unit shown next to the amount, e.g. "g".
    pub unit_label: String,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            buy_ratio: 0.2,
            sell_ratio: 0.2,
            min_trade_amount: 1000.0,
            min_balance: 100.0,
            buy_veto: -3,
            sell_veto: 3,
            panic_threshold: -7,
            divergence_ratio: 0.5,
            sell_aggression: 1.5,
            unit_label: "units".into(),
        }
    }
}

/// Merges the technical signal, fused sentiment and the caller's portfolio
/// into one sized recommendation. Never mutates the portfolio.
#[derive(Debug, Clone, Default)]
pub struct DecisionArbiter {
    config: ArbiterConfig,
}

impl DecisionArbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// `sentiment` is `None` when fusion reported unavailable; it sizes as 0.
    pub fn advise(
        &self,
        portfolio: PortfolioState,
        signal: Signal,
        sentiment: Option<i32>,
        price: Option<f64>,
    ) -> Advice {
        let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
            return Advice::hold("price data unavailable, cannot size a trade");
        };
        let cfg = &self.config;
        let score = sentiment.unwrap_or(0);
        let sentiment_note = match sentiment {
            Some(s) => format!("sentiment {s:+}"),
            None => "sentiment unavailable, sized as neutral".into(),
        };
        let confidence = 1.0 + f64::from(score.abs()) / 20.0;

        let advice = match signal {
            Signal::Neutral => {
                return Advice::hold("no clear technical direction, hold current position");
            }
            Signal::Buy => {
                let cash = portfolio.cash;
                if !(cash >= cfg.min_balance) {
                    return Advice::hold(format!("BUY signal but insufficient cash ({cash:.2})"));
                }
                if score <= cfg.buy_veto {
                    return Advice::hold(format!(
                        "technical BUY vetoed: {sentiment_note} is strongly bearish, staying out"
                    ));
                }
                let base = (cash * cfg.buy_ratio).max(cfg.min_trade_amount);
                let (raw, why) = if score > 0 {
                    (base * confidence, format!("technical BUY confirmed by {sentiment_note}"))
                } else {
                    (
                        base * cfg.divergence_ratio,
                        format!("technical BUY with weak disagreement ({sentiment_note}), half size"),
                    )
                };
                self.sized(Action::Buy, raw.min(cash), price, why)
            }
            Signal::Sell => {
                let holdings = portfolio.holdings;
                if !(holdings >= cfg.min_balance) {
                    return Advice::hold(format!("SELL signal but no holdings ({holdings:.2})"));
                }
                if score >= cfg.sell_veto {
                    return Advice::hold(format!(
                        "technical SELL vetoed: {sentiment_note} is strongly bullish, keeping position"
                    ));
                }
                let base = (holdings * cfg.sell_ratio).max(cfg.min_trade_amount);
                let (raw, why) = if score < cfg.panic_threshold {
                    (holdings, format!("panic liquidation: {sentiment_note}"))
                } else if score < 0 {
                    (
                        base * confidence * cfg.sell_aggression,
                        format!("technical SELL confirmed by {sentiment_note}, reducing"),
                    )
                } else {
                    (
                        base * cfg.divergence_ratio,
                        format!("technical SELL against {sentiment_note}, light profit-taking"),
                    )
                };
                self.sized(Action::Sell, raw.min(holdings), price, why)
            }
        };

        debug!(action = %advice.action, amount = advice.amount, "Advice computed");
        advice
    }

    fn sized(&self, action: Action, amount: f64, price: f64, why: String) -> Advice {
        let amount = round_currency(amount.max(0.0));
        let units = amount / price;
        Advice {
            action,
            amount,
            reason: format!("{why} (≈ {units:.2} {})", self.config.unit_label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> DecisionArbiter {
        DecisionArbiter::default()
    }

    fn pf(holdings: f64, cash: f64) -> PortfolioState {
        PortfolioState { holdings, cash }
    }

    #[test]
    fn confident_buy_scales_up() {
        let a = arbiter().advise(pf(0.0, 10_000.0), Signal::Buy, Some(8), Some(500.0));
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.amount, 2800.00);
        assert!(a.reason.contains("5.60 units"));
    }

    #[test]
    fn panic_sell_liquidates_everything() {
        let a = arbiter().advise(pf(5000.0, 1000.0), Signal::Sell, Some(-8), Some(500.0));
        assert_eq!(a.action, Action::Sell);
        assert_eq!(a.amount, 5000.0);
        assert!(a.reason.contains("panic"));
    }

    #[test]
    fn sell_at_panic_threshold_is_not_panic() {
        // -7 is not strictly below -7: base 1000 * 1.35 * 1.5
        let a = arbiter().advise(pf(5000.0, 0.0), Signal::Sell, Some(-7), Some(500.0));
        assert_eq!(a.amount, 2025.0);
    }

    #[test]
    fn bearish_sentiment_vetoes_buy() {
        let a = arbiter().advise(pf(0.0, 10_000.0), Signal::Buy, Some(-3), Some(500.0));
        assert_eq!(a.action, Action::Hold);
        assert_eq!(a.amount, 0.0);
        assert!(a.reason.contains("vetoed"));
    }

    #[test]
    fn bullish_sentiment_vetoes_sell() {
        let a = arbiter().advise(pf(5000.0, 0.0), Signal::Sell, Some(3), Some(500.0));
        assert_eq!(a.action, Action::Hold);
    }

    #[test]
    fn mild_disagreement_halves_buy() {
        let a = arbiter().advise(pf(0.0, 10_000.0), Signal::Buy, Some(-2), Some(500.0));
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.amount, 1000.0);
    }

    #[test]
    fn buy_is_capped_at_cash() {
        // base = max(300 * 0.2, 1000) = 1000, confidence 1.25 → capped at 300
        let a = arbiter().advise(pf(0.0, 300.0), Signal::Buy, Some(5), Some(500.0));
        assert_eq!(a.amount, 300.0);
    }

    #[test]
    fn missing_price_holds() {
        for price in [None, Some(0.0), Some(-1.0), Some(f64::NAN)] {
            let a = arbiter().advise(pf(5000.0, 5000.0), Signal::Buy, Some(9), price);
            assert_eq!(a.action, Action::Hold);
            assert!(a.reason.contains("unavailable"));
        }
    }

    #[test]
    fn neutral_signal_ignores_sentiment() {
        let a = arbiter().advise(pf(5000.0, 5000.0), Signal::Neutral, Some(10), Some(500.0));
        assert_eq!(a.action, Action::Hold);
    }

    #[test]
    fn low_balances_hold() {
        let buy = arbiter().advise(pf(0.0, 50.0), Signal::Buy, Some(5), Some(500.0));
        assert_eq!(buy.action, Action::Hold);
        assert!(buy.reason.contains("insufficient cash"));
        let sell = arbiter().advise(pf(10.0, 0.0), Signal::Sell, Some(-5), Some(500.0));
        assert_eq!(sell.action, Action::Hold);
    }

    #[test]
    fn unavailable_sentiment_sizes_as_neutral() {
        let a = arbiter().advise(pf(0.0, 10_000.0), Signal::Buy, None, Some(500.0));
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.amount, 1000.0);
        assert!(a.reason.contains("sentiment unavailable"));
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        // 12345.678 * 0.2 * 1.05 = 2592.59238 → 2592.59
        let a = arbiter().advise(pf(0.0, 12_345.678), Signal::Buy, Some(1), Some(777.0));
        assert_eq!(a.amount, round_currency(12_345.678 * 0.2 * 1.05));
    }

    #[test]
    fn config_reads_partial_section() {
        let cfg: ArbiterConfig = serde_json::from_str(r#"{"buy_ratio": 0.3, "unit_label": "g"}"#).unwrap();
        assert_eq!(cfg.buy_ratio, 0.3);
        assert_eq!(cfg.panic_threshold, -7);
        assert_eq!(cfg.unit_label, "g");
    }
}
