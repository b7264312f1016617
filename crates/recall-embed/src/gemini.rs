// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote synchronous embedding backend for the Gemini API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, EmbeddingOutput, key_fingerprint};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model when the config does not override it.
pub const GEMINI_DEFAULT_MODEL: &str = "text-embedding-004";

pub(crate) fn gemini_dimensions(model: &str) -> usize {
    match model {
        "gemini-embedding-001" => 3072,
        // text-embedding-004 and embedding-001
        _ => 768,
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Gemini `batchEmbedContents` client.
///
/// Embeds a whole batch in one call; retries once on transient errors.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    fingerprint: String,
    dimensions: usize,
    max_retries: u32,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: &str, model: Option<String>) -> Result<Self, RecallError> {
        let model = model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        let dimensions = gemini_dimensions(&model);
        let fingerprint = key_fingerprint(api_key);

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| RecallError::Config(format!("invalid API key header value: {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);
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
        let qualified = format!("models/{}", self.model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: qualified.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                })
                .collect(),
        };
        let url = format!("{}/{qualified}:batchEmbedContents", self.base_url);

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
                let parsed: BatchEmbedResponse =
                    response.json().await.map_err(|e| RecallError::EmbeddingFailed {
                        message: format!("malformed embeddings response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                if parsed.embeddings.len() != texts.len() {
                    return Err(RecallError::EmbeddingFailed {
                        message: format!(
                            "expected {} embeddings, got {}",
                            texts.len(),
                            parsed.embeddings.len()
                        ),
                        source: None,
                    });
                }
                return Ok(parsed.embeddings.into_iter().map(|e| e.values).collect());
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

#[async_trait]
impl EmbeddingBackend for GeminiEmbedder {
    fn provider_id(&self) -> &str {
        "gemini"
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

    #[tokio::test]
    async fn embeds_whole_batch_in_one_call() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "embeddings": [
                {"values": [0.1, 0.2]},
                {"values": [0.3, 0.4]},
            ]
        });
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:batchEmbedContents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = GeminiEmbedder::new("test-key", None)
            .unwrap()
            .with_base_url(server.uri());
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into(), "b".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings.len(), 2);
        assert_eq!(out.embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn rejects_short_responses() {
        let server = MockServer::start().await;
        let body = serde_json::json!({"embeddings": [{"values": [0.1]}]});
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:batchEmbedContents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let embedder = GeminiEmbedder::new("test-key", None)
            .unwrap()
            .with_base_url(server.uri());
        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into(), "b".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::EmbeddingFailed { .. }));
    }
}
