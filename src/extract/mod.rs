//! Content extraction: turns a document's raw bytes into plain text.
//!
//! Dispatch is by MIME type; an unrecognized type falls back to the HTML
//! extractor rather than being rejected, mirroring the policy that "best
//! effort" is better than refusing unknown content outright.

mod gdoc;
mod html;
mod markdown;
mod pdf;

use async_trait::async_trait;

use crate::config::WebFetchConfig;
use crate::error::AppResult;
use crate::models::ExtractedContent;

pub use gdoc::GoogleDocExtractor;
pub use html::HtmlExtractor;
pub use markdown::MarkdownExtractor;
pub use pdf::PdfExtractor;

pub(super) fn plain(text: String, title: Option<String>, mime_type: &str) -> ExtractedContent {
    ExtractedContent {
        text,
        title,
        mime_type: mime_type.to_string(),
        extra: Default::default(),
    }
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extracts plain text (and, where available, a title) from `bytes`
    /// fetched/read from `uri`.
    async fn extract(&self, uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent>;
}

/// `GoogleDocExtractor` is selected by URI shape, not MIME type (Google
/// Docs have no stable MIME type of their own), so dispatch checks the URI
/// first and falls back to the MIME-based table; anything unrecognized
/// falls back to HTML.
pub fn extractor_for(uri: &str, mime_type: &str, web_fetch: WebFetchConfig) -> Box<dyn ContentExtractor> {
    if is_google_doc_uri(uri) {
        return Box::new(GoogleDocExtractor::new(web_fetch));
    }
    match mime_type {
        "application/pdf" => Box::new(PdfExtractor),
        "text/markdown" => Box::new(MarkdownExtractor),
        "text/html" => Box::new(HtmlExtractor::new(web_fetch)),
        _ => Box::new(HtmlExtractor::new(web_fetch)),
    }
}

pub fn is_google_doc_uri(uri: &str) -> bool {
    uri.contains("docs.google.com")
}
