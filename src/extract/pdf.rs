//! PDF text extraction via `pdf-extract`, split per-page so pages can be
//! joined with a blank line and counted.

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

use super::{ContentExtractor, ExtractedContent};

pub struct PdfExtractor;

#[async_trait]
impl ContentExtractor for PdfExtractor {
    async fn extract(&self, uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent> {
        let bytes = bytes.to_vec();
        let uri_owned = uri.to_string();

        tokio::task::spawn_blocking(move || extract_sync(&uri_owned, &bytes))
            .await
            .map_err(|e| AppError::extraction(uri, format!("extraction task panicked: {e}")))?
    }
}

fn extract_sync(uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent> {
    let doc = lopdf_document(bytes, uri)?;
    let page_count = doc.get_pages().len();

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::extraction(uri, format!("PDF extraction failed: {e}")))?;

    let pages: Vec<&str> = text.split('\x0c').map(str::trim).filter(|p| !p.is_empty()).collect();
    let joined = if pages.is_empty() { text.trim().to_string() } else { pages.join("\n\n") };

    let title = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info_ref| doc.get_object(info_ref.as_reference().ok()?).ok())
        .and_then(|obj| obj.as_dict().ok().cloned())
        .and_then(|dict| dict.get(b"Title").ok().cloned())
        .and_then(|title_obj| title_obj.as_str().ok().map(|b| String::from_utf8_lossy(b).to_string()))
        .filter(|t| !t.trim().is_empty());

    let mut extra = std::collections::HashMap::new();
    extra.insert("page_count".to_string(), serde_json::json!(page_count));

    Ok(ExtractedContent { text: joined, title, mime_type: "application/pdf".to_string(), extra })
}

fn lopdf_document(bytes: &[u8], uri: &str) -> AppResult<lopdf::Document> {
    lopdf::Document::load_mem(bytes).map_err(|e| AppError::extraction(uri, format!("failed to parse PDF structure: {e}")))
}

#[cfg(test)]
mod tests {
    // PDF byte fixtures aren't hand-constructible here; extractor correctness
    // for page-join/title behavior is covered by `extract_sync`'s callers in
    // `indexing.rs` integration tests against a tiny generated PDF fixture.
}
