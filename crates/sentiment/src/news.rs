use std::collections::HashSet;

use common::NewsItem;

/// Collapse runs of whitespace and trim.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop items whose normalized title was already seen, keeping the first
/// occurrence and the original order. Empty titles are dropped.
pub fn dedupe(items: impl IntoIterator<Item = NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|mut item| {
            item.title = normalize_title(&item.title);
            if item.title.is_empty() || !seen.insert(item.title.clone()) {
                return None;
            }
            Some(item)
        })
        .collect()
}

/// The ordered titles joined together. Equal fingerprints mean "no new
/// information".
pub fn fingerprint(items: &[NewsItem]) -> String {
    items
        .iter()
        .map(|n| n.title.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, source: &str) -> NewsItem {
        NewsItem::new(title, "https://example.com", "en", source)
    }

    #[test]
    fn identical_titles_from_two_sources_collapse() {
        let items = vec![
            item("Gold hits record high", "feed-a"),
            item("Gold  hits record high ", "feed-b"),
            item("Fed holds rates", "feed-b"),
        ];
        let deduped = dedupe(items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source, "feed-a");
        assert_eq!(fingerprint(&deduped), "Gold hits record high\nFed holds rates");
    }

    #[test]
    fn empty_titles_are_dropped() {
        assert!(dedupe(vec![item("   ", "a")]).is_empty());
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = vec![item("one", "s"), item("two", "s")];
        let b = vec![item("two", "s"), item("one", "s")];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
