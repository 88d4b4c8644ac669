//! Google Docs extraction: not an independent format — just validates the
//! URI and delegates to [`HtmlExtractor`], wrapping any failure with
//! additional context.

use async_trait::async_trait;

use crate::config::WebFetchConfig;
use crate::error::{AppError, AppResult};

use super::{is_google_doc_uri, ContentExtractor, ExtractedContent, HtmlExtractor};

pub struct GoogleDocExtractor {
    inner: HtmlExtractor,
}

impl GoogleDocExtractor {
    pub fn new(web_fetch: WebFetchConfig) -> Self {
        Self { inner: HtmlExtractor::new(web_fetch) }
    }
}

#[async_trait]
impl ContentExtractor for GoogleDocExtractor {
    async fn extract(&self, uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent> {
        if !is_google_doc_uri(uri) {
            return Err(AppError::extraction(uri, "not a Google Docs URI"));
        }
        self.inner
            .extract(uri, bytes)
            .await
            .map_err(|e| AppError::extraction(uri, format!("Failed to extract Google Doc: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_google_doc_uri() {
        let extractor = GoogleDocExtractor::new(WebFetchConfig::default());
        let err = extractor.extract("file:///local.html", b"").await.unwrap_err();
        assert!(err.to_string().contains("not a Google Docs URI"));
    }

    #[tokio::test]
    async fn wraps_inner_extraction_failure_with_context() {
        let extractor = GoogleDocExtractor::new(WebFetchConfig::default());
        let err = extractor
            .extract("https://docs.google.com/document/d/abc", b"")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to extract Google Doc"));
    }
}
