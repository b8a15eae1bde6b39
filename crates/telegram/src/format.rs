//! Plain-text rendering of advisor state for chat messages.

use common::{
    Action, Advice, AdvisorEvent, AdvisorSnapshot, OptimizationResult, PortfolioState,
    StrategyParams,
};

pub fn format_advice(advice: &Advice) -> String {
    match advice.action {
        Action::Hold => format!("Advice: HOLD\n{}", advice.reason),
        action => format!(
            "Advice: {} {:.2}\n{}",
            action.to_string().to_uppercase(),
            advice.amount,
            advice.reason
        ),
    }
}

pub fn format_status(snap: &AdvisorSnapshot) -> String {
    let price = snap
        .price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "n/a".into());
    let technical = snap
        .technical
        .as_ref()
        .map(|t| format!("{} ({})", t.signal, t.rationale))
        .unwrap_or_else(|| "no reading yet".into());
    let sentiment = match &snap.sentiment {
        Some(s) if s.is_available() => format!("{:+} from {} estimator(s)", s.score, s.contributors),
        Some(s) => s.rationale.clone(),
        None => "no reading yet".into(),
    };
    let advice = snap
        .advice
        .as_ref()
        .map(|a| format!("{} {:.2}", a.action, a.amount))
        .unwrap_or_else(|| "none".into());

    format!(
        "Aurum Status\n\
         Engine: {}\n\
         Price: {price}\n\
         Technical: {technical}\n\
         Sentiment: {sentiment}\n\
         Advice: {advice}\n\
         Holdings: {:.2}  Cash: {:.2}",
        snap.state, snap.portfolio.holdings, snap.portfolio.cash
    )
}

pub fn format_params(p: &StrategyParams) -> String {
    format!(
        "Strategy parameters\n\
         RSI {} ({}/{})\n\
         Bollinger {} x{}\n\
         SMA {}/{}\n\
         MACD {}/{}/{}\n\
         ATR {}  SL x{}  TP x{}\n\
         Volatility {}/{} gate x{}",
        p.rsi_period,
        p.rsi_oversold,
        p.rsi_overbought,
        p.bb_period,
        p.bb_std,
        p.sma_fast,
        p.sma_slow,
        p.macd_fast,
        p.macd_slow,
        p.macd_signal,
        p.atr_period,
        p.sl_atr_mult,
        p.tp_atr_mult,
        p.vol_period,
        p.vol_ma_period,
        p.vol_filter_ratio,
    )
}

fn format_optimization(result: &OptimizationResult) -> String {
    let test = result
        .test_score
        .map(|s| format!("{s:.3}"))
        .unwrap_or_else(|| "n/a".into());
    let degradation = result
        .degradation_pct
        .map(|d| format!("{d:.1}%"))
        .unwrap_or_else(|| "n/a".into());
    format!(
        "train Sharpe {:.3}, test Sharpe {test}, degradation {degradation}, overfit risk {} ({} trials)",
        result.train_score, result.verdict, result.trials
    )
}

/// Parse `/portfolio <holdings> <cash>` arguments.
pub fn parse_portfolio(args: &str) -> Result<PortfolioState, String> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [holdings, cash] = parts.as_slice() else {
        return Err("usage: /portfolio <holdings> <cash>".into());
    };
    let parse = |raw: &str| -> Result<f64, String> {
        match raw.replace(',', "").parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(format!("'{raw}' is not a non-negative amount")),
        }
    };
    Ok(PortfolioState {
        holdings: parse(holdings)?,
        cash: parse(cash)?,
    })
}

/// Decides which advisor events are worth a chat message.
///
/// Advice is only announced when the action changes; optimizer outcomes are
/// always announced; everything else stays on the dashboard.
#[derive(Debug, Default)]
pub struct AlertFilter {
    last_action: Option<Action>,
}

impl AlertFilter {
    pub fn alert_for(&mut self, event: &AdvisorEvent) -> Option<String> {
        match event {
            AdvisorEvent::Advice(advice) => {
                if self.last_action == Some(advice.action) {
                    return None;
                }
                self.last_action = Some(advice.action);
                Some(format_advice(advice))
            }
            AdvisorEvent::ParamsUpdated { result, .. } => Some(format!(
                "Parameters updated: {}",
                format_optimization(result)
            )),
            AdvisorEvent::OptimizationRejected { result } => Some(format!(
                "Optimization not applied: {}",
                format_optimization(result)
            )),
            AdvisorEvent::OptimizationFailed { reason, .. } => {
                Some(format!("Optimization failed: {reason}"))
            }
            _ => None,
        }
    }
}
