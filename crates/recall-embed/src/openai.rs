// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote synchronous embedding backend for the OpenAI embeddings API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, EmbeddingOutput, key_fingerprint};

const API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model when the config does not override it.
pub const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Dimensions for known OpenAI embedding models.
pub(crate) fn openai_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        // text-embedding-3-small and text-embedding-ada-002
        _ => 1536,
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Synchronous OpenAI embeddings client.
///
/// Retries once on transient errors (429, 500, 503) after a short delay.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    fingerprint: String,
    dimensions: usize,
    max_retries: u32,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: Option<String>) -> Result<Self, RecallError> {
        let model = model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        let dimensions = openai_dimensions(&model);
        let fingerprint = key_fingerprint(api_key);

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RecallError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("authorization", auth);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RecallError::EmbeddingFailed {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model,
            fingerprint,
            dimensions,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };
        let url = format!("{}/embeddings", self.base_url);

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying embeddings request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
                RecallError::EmbeddingFailed {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                }
            })?;

            let status = response.status();
            debug!(status = %status, attempt, texts = texts.len(), "embeddings response");

            if status.is_success() {
                let parsed: EmbeddingsResponse =
                    response.json().await.map_err(|e| RecallError::EmbeddingFailed {
                        message: format!("malformed embeddings response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                return sort_by_index(parsed.data, texts.len());
            }

            let retryable = matches!(status.as_u16(), 429 | 500 | 503);
            let body_text = response.text().await.unwrap_or_default();
            let err = RecallError::EmbeddingFailed {
                message: format!("embeddings API returned {status}: {body_text}"),
                source: None,
            };
            if retryable && attempt < self.max_retries {
                warn!(status = %status, "transient embeddings error, will retry");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| RecallError::EmbeddingFailed {
            message: "embeddings request failed".to_string(),
            source: None,
        }))
    }
}

/// Reassemble response vectors in input order, rejecting short responses.
fn sort_by_index(
    mut data: Vec<EmbeddingDatum>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, RecallError> {
    if data.len() != expected {
        return Err(RecallError::EmbeddingFailed {
            message: format!("expected {expected} embeddings, got {}", data.len()),
            source: None,
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn provider_id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        let embeddings = self.request_embeddings(&input.texts).await?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_embedder(base_url: &str) -> OpenAiEmbedder {
        OpenAiEmbedder::new("sk-test", None)
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    #[tokio::test]
    async fn embeds_in_input_order() {
        let server = MockServer::start().await;
        // Response deliberately out of order; the client must sort by index.
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [2.0, 2.0]},
                {"index": 0, "embedding": [1.0, 1.0]},
            ],
            "model": "text-embedding-3-small"
        });
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri());
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into(), "b".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings[0], vec![1.0, 1.0]);
        assert_eq!(out.embeddings[1], vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn retries_once_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        let body = serde_json::json!({
            "data": [{"index": 0, "embedding": [0.5]}],
            "model": "text-embedding-3-small"
        });
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri());
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings.len(), 1);
    }

    #[tokio::test]
    async fn surfaces_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri());
        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::EmbeddingFailed { .. }));
    }

    #[test]
    fn known_model_dimensions() {
        assert_eq!(openai_dimensions("text-embedding-3-small"), 1536);
        assert_eq!(openai_dimensions("text-embedding-3-large"), 3072);
    }
}
