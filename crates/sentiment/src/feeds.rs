use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use common::{Error, NewsFeed, NewsItem, Result};

use crate::config::FeedConfig;

/// RSS 2.0 feed polled over HTTP.
pub struct RssFeed {
    cfg: FeedConfig,
    http: Client,
}

impl RssFeed {
    pub fn new(cfg: FeedConfig) -> Self {
        Self {
            cfg,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl NewsFeed for RssFeed {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn poll(&self) -> Result<Vec<NewsItem>> {
        let resp = self
            .http
            .get(&self.cfg.url)
            .header("User-Agent", "aurum/0.1")
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Feed(format!("{}: HTTP {status}", self.cfg.name)));
        }

        let items: Vec<NewsItem> = parse_rss(&body, self.cfg.limit)
            .into_iter()
            .map(|(title, link)| NewsItem::new(title, link, &self.cfg.language, &self.cfg.name))
            .collect();
        debug!(feed = %self.cfg.name, items = items.len(), "Feed polled");
        Ok(items)
    }
}

struct RssPatterns {
    item: Regex,
    title: Regex,
    link: Regex,
    cdata: Regex,
}

fn patterns() -> &'static RssPatterns {
    static PATTERNS: OnceLock<RssPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| RssPatterns {
        item: Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").expect("valid item pattern"),
        title: Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("valid title pattern"),
        link: Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").expect("valid link pattern"),
        cdata: Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid cdata pattern"),
    })
}

/// `(title, link)` of the first `limit` items with a non-empty title.
pub fn parse_rss(body: &str, limit: usize) -> Vec<(String, String)> {
    let p = patterns();
    p.item
        .captures_iter(body)
        .filter_map(|item| {
            let inner = item.get(1)?.as_str();
            let field = |re: &Regex| {
                re.captures(inner)
                    .and_then(|c| c.get(1))
                    .map(|m| clean_text(&p.cdata, m.as_str()))
                    .unwrap_or_default()
            };
            let title = field(&p.title);
            (!title.is_empty()).then(|| (title, field(&p.link)))
        })
        .take(limit)
        .collect()
}

fn clean_text(cdata: &Regex, raw: &str) -> String {
    let unwrapped = cdata.replace_all(raw, "$1");
    unwrapped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Gold News</title>
  <item>
    <title><![CDATA[Gold rises as dollar slips]]></title>
    <link>https://example.com/a</link>
  </item>
  <item>
    <title>Fed &amp; ECB hold rates</title>
    <link>https://example.com/b</link>
  </item>
  <item><title></title><link>https://example.com/empty</link></item>
  <item><title>Third</title></item>
</channel></rss>"#;

    #[test]
    fn extracts_items_not_channel_title() {
        let items = parse_rss(SAMPLE, 10);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].0, "Gold rises as dollar slips");
        assert_eq!(items[1], ("Fed & ECB hold rates".into(), "https://example.com/b".into()));
        assert_eq!(items[2].1, "");
    }

    #[test]
    fn respects_limit() {
        assert_eq!(parse_rss(SAMPLE, 1).len(), 1);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_rss("<html>not a feed</html>", 5).is_empty());
    }
}
