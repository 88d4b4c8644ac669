//! Markdown text extraction: frontmatter title, falling back to the first
//! H1 heading.

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

use super::{ContentExtractor, ExtractedContent};

pub struct MarkdownExtractor;

impl MarkdownExtractor {
    /// Splits a leading `---\n...\n---\n` YAML frontmatter block from the
    /// rest of the document, if present.
    fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
        let Some(rest) = text.strip_prefix("---") else {
            return (None, text);
        };
        let rest = rest.trim_start_matches(['\n', '\r']);
        let Some(end) = rest.find("\n---") else {
            return (None, text);
        };
        let frontmatter = &rest[..end];
        let after = &rest[end + 4..];
        let body = after.trim_start_matches(['\n', '\r']);
        (Some(frontmatter), body)
    }

    fn frontmatter_title(frontmatter: &str) -> Option<String> {
        let value: serde_yaml::Value = serde_yaml::from_str(frontmatter).ok()?;
        value.get("title")?.as_str().map(|s| s.to_string())
    }

    fn first_h1(body: &str) -> Option<String> {
        body.lines()
            .find_map(|line| line.strip_prefix("# ").map(|t| t.trim().to_string()))
    }
}

#[async_trait]
impl ContentExtractor for MarkdownExtractor {
    async fn extract(&self, uri: &str, bytes: &[u8]) -> AppResult<ExtractedContent> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AppError::extraction(uri, format!("invalid UTF-8: {e}")))?;

        let (frontmatter, body) = Self::split_frontmatter(text);
        let title = frontmatter
            .and_then(Self::frontmatter_title)
            .or_else(|| Self::first_h1(body));

        Ok(super::plain(body.trim().to_string(), title, "text/markdown"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frontmatter_title_wins_over_h1() {
        let md = b"---\ntitle: From Frontmatter\n---\n# From Heading\nbody text\n";
        let extractor = MarkdownExtractor;
        let content = extractor.extract("file:///a.md", md).await.unwrap();
        assert_eq!(content.title.as_deref(), Some("From Frontmatter"));
        assert!(content.text.contains("From Heading"));
        assert!(content.text.contains("body text"));
    }

    #[tokio::test]
    async fn falls_back_to_first_h1_without_frontmatter() {
        let md = b"# Document Title\n\nsome content\n";
        let extractor = MarkdownExtractor;
        let content = extractor.extract("file:///b.md", md).await.unwrap();
        assert_eq!(content.title.as_deref(), Some("Document Title"));
    }

    #[tokio::test]
    async fn no_title_available_is_none() {
        let md = b"just plain text, no heading\n";
        let extractor = MarkdownExtractor;
        let content = extractor.extract("file:///c.md", md).await.unwrap();
        assert_eq!(content.title, None);
    }
}
