//! HTML text extraction via `scraper`.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::config::WebFetchConfig;
use crate::error::{AppError, AppResult};

use super::{ContentExtractor, ExtractedContent};

pub struct HtmlExtractor {
    web_fetch: WebFetchConfig,
}

impl HtmlExtractor {
    pub fn new(web_fetch: WebFetchConfig) -> Self {
        Self { web_fetch }
    }

    fn parse(html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);

        let title_sel = Selector::parse("title").expect("static selector");
        let title = document
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let script_sel = Selector::parse("script, style").expect("static selector");
        let excluded: std::collections::HashSet<_> = document
            .select(&script_sel)
            .flat_map(|el| el.descendants().map(|n| n.id()))
            .collect();

        let body_sel = Selector::parse("body").expect("static selector");
        let root = document
            .select(&body_sel)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut lines = Vec::new();
        for node in root.descendants() {
            if excluded.contains(&node.id()) {
                continue;
            }
            if let Some(text_node) = node.value().as_text() {
                let trimmed = text_node.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
        let text = lines.join("\n");

        super::plain(text, title, "text/html")
    }
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract(&self, uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent> {
        let html = if uri.starts_with("http://") || uri.starts_with("https://") {
            if !self.web_fetch.enabled {
                return Err(AppError::extraction(uri, "web fetch is disabled"));
            }
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(self.web_fetch.timeout_sec))
                .user_agent(self.web_fetch.user_agent.clone())
                .build()
                .map_err(|e| AppError::extraction(uri, format!("failed to build HTTP client: {e}")))?;
            client
                .get(uri)
                .send()
                .await
                .map_err(|e| AppError::extraction(uri, format!("fetch failed: {e}")))?
                .text()
                .await
                .map_err(|e| AppError::extraction(uri, format!("failed to read response body: {e}")))?
        } else {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| AppError::extraction(uri, format!("invalid UTF-8: {e}")))?
        };

        Ok(Self::parse(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_title_and_visible_text() {
        let html = br#"<html><head><title>My Page</title><style>.x{color:red}</style></head>
            <body><script>alert(1)</script><h1>Hello</h1><p>World</p></body></html>"#;
        let extractor = HtmlExtractor::new(WebFetchConfig::default());
        let content = extractor.extract("file:///x.html", html).await.unwrap();
        assert_eq!(content.title.as_deref(), Some("My Page"));
        assert!(content.text.contains("Hello"));
        assert!(content.text.contains("World"));
        assert!(!content.text.contains("alert"));
    }

    #[tokio::test]
    async fn remote_fetch_disabled_by_default() {
        let extractor = HtmlExtractor::new(WebFetchConfig::default());
        let err = extractor.extract("https://example.com/page", b"").await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("disabled"));
    }
}
