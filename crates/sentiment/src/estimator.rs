use std::sync::OnceLock;

use regex::Regex;

use common::NewsItem;

pub const SCORE_MIN: i32 = -10;
pub const SCORE_MAX: i32 = 10;

/// The prompt sent, unchanged, to every estimator in a cycle.
pub fn build_prompt(items: &[NewsItem], price: Option<f64>) -> String {
    let headlines = items
        .iter()
        .map(|n| format!("- {}", n.title))
        .collect::<Vec<_>>()
        .join("\n");
    let price = price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "unknown".into());

    format!(
        "You are a macro hedge-fund manager. Based on the headlines below and the \
         current gold price ({price}), assess the near-term direction of gold.\n\n\
         Latest headlines:\n{headlines}\n\n\
         Requirements:\n\
         1. Summarise the dominant sentiment in one or two sentences.\n\
         2. Rate the sentiment from -10 (extremely bearish) to +10 (extremely bullish).\n\
         3. Give a short trading suggestion.\n\n\
         Answer format:\n\
         Sentiment: ...\n\
         Score: ...\n\
         Suggestion: ..."
    )
}

fn score_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:score|打分)\s*[:：]\s*\**\s*([-+]?\d+)")
            .expect("score pattern is valid")
    })
}

/// The last `score: ±N` in `text`, clamped to [-10, 10].
/// `None` when no score is present.
pub fn parse_score(text: &str) -> Option<i32> {
    let raw = score_pattern()
        .captures_iter(text)
        .last()?
        .get(1)?
        .as_str();
    let value = raw.parse::<i64>().unwrap_or(if raw.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });
    Some(value.clamp(SCORE_MIN as i64, SCORE_MAX as i64) as i32)
}

/// First non-empty lines of an estimator answer, at most `max_chars` long.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.chars().count() <= max_chars {
        return joined;
    }
    let mut cut: String = joined.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
