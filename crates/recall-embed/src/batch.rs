// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous embedding backend using the OpenAI Batch API.
//!
//! Intended for bulk backfill: uploads a JSONL job, polls at a fixed
//! interval under a deadline, then downloads the output file. Never chosen
//! by the automatic waterfall; only an explicit `provider = "openai-batch"`
//! selects it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, EmbeddingOutput, key_fingerprint};

use crate::openai::{OPENAI_DEFAULT_MODEL, openai_dimensions};

const API_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    output_file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputLine {
    custom_id: String,
    response: Option<OutputResponse>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    body: OutputBody,
}

#[derive(Debug, Deserialize)]
struct OutputBody {
    data: Vec<OutputDatum>,
}

#[derive(Debug, Deserialize)]
struct OutputDatum {
    embedding: Vec<f32>,
}

/// OpenAI Batch API embedder.
///
/// The poll loop is cancellable: when the token fires mid-poll the call
/// returns an error and leaves no partial state behind, since results are
/// only handed back once the whole output file parses.
pub struct OpenAiBatchEmbedder {
    client: reqwest::Client,
    model: String,
    fingerprint: String,
    dimensions: usize,
    base_url: String,
    poll_interval: Duration,
    deadline: Duration,
    cancel: CancellationToken,
}

impl OpenAiBatchEmbedder {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        cancel: CancellationToken,
    ) -> Result<Self, RecallError> {
        let model = model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        let dimensions = openai_dimensions(&model);
        let fingerprint = key_fingerprint(api_key);

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RecallError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
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
            base_url: API_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            cancel,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Overrides poll timing (for tests that exercise the deadline).
    #[cfg(test)]
    pub fn with_timing(mut self, poll_interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.deadline = deadline;
        self
    }

    /// Serialize one embeddings request per input text, keyed by position.
    fn build_jsonl(&self, texts: &[String]) -> Result<String, RecallError> {
        let mut out = String::new();
        for (i, text) in texts.iter().enumerate() {
            let line = serde_json::json!({
                "custom_id": format!("chunk-{i}"),
                "method": "POST",
                "url": "/v1/embeddings",
                "body": {"model": self.model, "input": [text]},
            });
            out.push_str(&line.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    async fn upload_input(&self, jsonl: String) -> Result<String, RecallError> {
        let part = reqwest::multipart::Part::text(jsonl)
            .file_name("embeddings.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| embed_err(format!("multipart part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| embed_err(format!("file upload failed: {e}")))?;
        let file: FileObject = parse_or_status(response, "file upload").await?;
        Ok(file.id)
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchObject, RecallError> {
        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .json(&serde_json::json!({
                "input_file_id": input_file_id,
                "endpoint": "/v1/embeddings",
                "completion_window": "24h",
            }))
            .send()
            .await
            .map_err(|e| embed_err(format!("batch creation failed: {e}")))?;
        parse_or_status(response, "batch creation").await
    }

    async fn fetch_batch(&self, batch_id: &str) -> Result<BatchObject, RecallError> {
        let response = self
            .client
            .get(format!("{}/batches/{batch_id}", self.base_url))
            .send()
            .await
            .map_err(|e| embed_err(format!("batch status poll failed: {e}")))?;
        parse_or_status(response, "batch status").await
    }

    /// Poll until the batch reaches a terminal status, the deadline passes,
    /// or the cancellation token fires.
    async fn await_completion(&self, batch_id: &str) -> Result<BatchObject, RecallError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick so the first poll waits one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(batch_id, "batch embedding poll cancelled");
                    return Err(embed_err("batch embedding cancelled".to_string()));
                }
                _ = ticker.tick() => {}
            }

            if started.elapsed() >= self.deadline {
                warn!(batch_id, deadline = ?self.deadline, "batch embedding deadline elapsed");
                return Err(RecallError::BatchTimeout {
                    duration: self.deadline,
                });
            }

            let batch = self.fetch_batch(batch_id).await?;
            debug!(batch_id, status = %batch.status, "batch status");
            match batch.status.as_str() {
                "completed" => return Ok(batch),
                "failed" | "expired" | "cancelled" => {
                    return Err(embed_err(format!(
                        "batch {batch_id} ended with status {}",
                        batch.status
                    )));
                }
                _ => {}
            }
        }
    }

    async fn download_output(
        &self,
        output_file_id: &str,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, RecallError> {
        let response = self
            .client
            .get(format!("{}/files/{output_file_id}/content", self.base_url))
            .send()
            .await
            .map_err(|e| embed_err(format!("output download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(embed_err(format!(
                "output download returned {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| embed_err(format!("reading output body failed: {e}")))?;

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; expected];
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: OutputLine = serde_json::from_str(line)
                .map_err(|e| embed_err(format!("malformed output line: {e}")))?;
            let index: usize = parsed
                .custom_id
                .strip_prefix("chunk-")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| embed_err(format!("unknown custom_id {}", parsed.custom_id)))?;
            let response = parsed
                .response
                .ok_or_else(|| embed_err(format!("no response for {}", parsed.custom_id)))?;
            let datum = response
                .body
                .data
                .into_iter()
                .next()
                .ok_or_else(|| embed_err(format!("empty data for chunk-{index}")))?;
            if index < expected {
                vectors[index] = Some(datum.embedding);
            }
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| embed_err(format!("missing embedding for chunk-{i}"))))
            .collect()
    }
}

fn embed_err(message: String) -> RecallError {
    RecallError::EmbeddingFailed {
        message,
        source: None,
    }
}

async fn parse_or_status<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, RecallError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(embed_err(format!("{what} returned {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| embed_err(format!("malformed {what} response: {e}")))
}

#[async_trait]
impl EmbeddingBackend for OpenAiBatchEmbedder {
    fn provider_id(&self) -> &str {
        "openai-batch"
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
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: self.dimensions,
            });
        }

        let jsonl = self.build_jsonl(&input.texts)?;
        let input_file_id = self.upload_input(jsonl).await?;
        let batch = self.create_batch(&input_file_id).await?;
        info!(batch_id = %batch.id, texts = input.texts.len(), "submitted embedding batch");

        let done = self.await_completion(&batch.id).await?;
        let output_file_id = done
            .output_file_id
            .ok_or_else(|| embed_err(format!("batch {} completed without output file", done.id)))?;

        let embeddings = self.download_output(&output_file_id, input.texts.len()).await?;
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

    fn test_embedder(base_url: &str, cancel: CancellationToken) -> OpenAiBatchEmbedder {
        OpenAiBatchEmbedder::new("sk-test", None, cancel)
            .unwrap()
            .with_base_url(base_url.to_string())
            .with_timing(Duration::from_millis(10), Duration::from_secs(5))
    }

    async fn mount_submission(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "file-in", "object": "file"})),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "batch-1", "status": "validating"}),
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn completes_and_reorders_by_custom_id() {
        let server = MockServer::start().await;
        mount_submission(&server).await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "batch-1",
                "status": "completed",
                "output_file_id": "file-out",
            })))
            .mount(&server)
            .await;
        // Lines out of order; the client must key on custom_id.
        let output = concat!(
            r#"{"custom_id":"chunk-1","response":{"body":{"data":[{"embedding":[2.0]}]}}}"#,
            "\n",
            r#"{"custom_id":"chunk-0","response":{"body":{"data":[{"embedding":[1.0]}]}}}"#,
            "\n",
        );
        Mock::given(method("GET"))
            .and(path("/files/file-out/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(output))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri(), CancellationToken::new());
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into(), "b".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn deadline_maps_to_batch_timeout() {
        let server = MockServer::start().await;
        mount_submission(&server).await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "batch-1", "status": "in_progress"}),
            ))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri(), CancellationToken::new())
            .with_timing(Duration::from_millis(5), Duration::from_millis(20));
        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::BatchTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_poll_loop() {
        let server = MockServer::start().await;
        mount_submission(&server).await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "batch-1", "status": "in_progress"}),
            ))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let embedder = test_embedder(&server.uri(), cancel.clone());
        let handle = tokio::spawn(async move {
            embedder
                .embed(EmbeddingInput {
                    texts: vec!["a".into()],
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, RecallError::EmbeddingFailed { .. }));
    }

    #[tokio::test]
    async fn failed_batch_is_a_provider_failure() {
        let server = MockServer::start().await;
        mount_submission(&server).await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "batch-1", "status": "failed"}),
            ))
            .mount(&server)
            .await;

        let embedder = test_embedder(&server.uri(), CancellationToken::new());
        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["a".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::EmbeddingFailed { .. }));
    }
}
