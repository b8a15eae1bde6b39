use std::collections::HashMap;

use common::NewsItem;

/// Maximum local relevance score.
pub const MAX_RELEVANCE: u8 = 10;

/// Cheap keyword scorer that bounds how many items reach the estimators.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<(String, u8)>,
}

impl RelevanceFilter {
    pub fn new(keywords: &HashMap<String, u8>) -> Self {
        let mut keywords: Vec<(String, u8)> = keywords
            .iter()
            .map(|(k, w)| (k.to_lowercase(), *w))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        keywords.sort();
        Self { keywords }
    }

    /// Sum of the weights of every keyword found in `title`, capped at 10.
    pub fn score(&self, title: &str) -> u8 {
        let title = title.to_lowercase();
        let total: u32 = self
            .keywords
            .iter()
            .filter(|(k, _)| title.contains(k.as_str()))
            .map(|(_, w)| u32::from(*w))
            .sum();
        total.min(u32::from(MAX_RELEVANCE)) as u8
    }

    /// Set `relevance` on every item.
    pub fn annotate(&self, items: &mut [NewsItem]) {
        for item in items {
            item.relevance = Some(self.score(&item.title));
        }
    }
}

/// Items at or above `threshold`. Unscored items are kept: no score is not
/// the same as a score of zero.
pub fn relevant(items: &[NewsItem], threshold: u8) -> Vec<NewsItem> {
    items
        .iter()
        .filter(|n| n.relevance.map_or(true, |r| r >= threshold))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RelevanceFilter {
        let keywords = HashMap::from([
            ("gold".to_string(), 4),
            ("Fed".to_string(), 3),
            ("黄金".to_string(), 4),
            ("inflation".to_string(), 3),
        ]);
        RelevanceFilter::new(&keywords)
    }

    #[test]
    fn scores_are_case_insensitive_and_additive() {
        assert_eq!(filter().score("GOLD rallies as fed signals cuts"), 7);
        assert_eq!(filter().score("Tech stocks slide"), 0);
        assert_eq!(filter().score("黄金价格创新高"), 4);
    }

    #[test]
    fn score_is_capped() {
        let keywords = HashMap::from([("a".to_string(), 9), ("b".to_string(), 9)]);
        assert_eq!(RelevanceFilter::new(&keywords).score("ab"), MAX_RELEVANCE);
    }

    #[test]
    fn unscored_items_survive_filtering() {
        let mut scored = NewsItem::new("Tech stocks slide", "", "en", "s");
        scored.relevance = Some(0);
        let unscored = NewsItem::new("Unknown", "", "en", "s");
        let kept = relevant(&[scored, unscored], 3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Unknown");
    }
}
