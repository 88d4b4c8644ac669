//! OpenAI-compatible remote embedding provider.
//!
//! Calls `POST {api_base}/embeddings` with exponential backoff on rate
//! limits and server errors. `api_base` defaults to the OpenAI endpoint but
//! can be pointed at any compatible server (e.g. a local proxy) via
//! `embedding.api_base`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::error::{AppError, AppResult};

use super::EmbeddingProvider;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    api_base: String,
    model: String,
    max_retries: u32,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::Validation("OPENAI_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|e| AppError::Internal(format!("invalid API key header: {e}")))?;
                auth.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, auth);
                headers
            })
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone().unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: config.model_name.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<AppError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embeddings", self.api_base))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: OpenAiEmbeddingResponse = response
                            .json()
                            .await
                            .map_err(|e| AppError::BackendUnavailable(format!("malformed embedding response: {e}")))?;
                        return Ok(sort_by_index(parsed));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(AppError::BackendUnavailable(format!(
                            "embedding API error {status}: {text}"
                        )));
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    return Err(AppError::BackendUnavailable(format!(
                        "embedding API error {status}: {text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(AppError::BackendUnavailable(format!("embedding request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::BackendUnavailable("embedding failed after retries".into())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingDatum>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// The response `data` array is not guaranteed to preserve request order;
/// sort by the `index` field each datum carries before returning.
fn sort_by_index(mut resp: OpenAiEmbeddingResponse) -> Vec<Vec<f32>> {
    resp.data.sort_by_key(|d| d.index);
    resp.data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_by_index_reorders_out_of_order_response() {
        let resp = OpenAiEmbeddingResponse {
            data: vec![
                OpenAiEmbeddingDatum { embedding: vec![2.0], index: 1 },
                OpenAiEmbeddingDatum { embedding: vec![1.0], index: 0 },
            ],
        };
        assert_eq!(sort_by_index(resp), vec![vec![1.0], vec![2.0]]);
    }
}
