// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider selection waterfall.
//!
//! Picks one embedding backend per index lifetime. In `auto` mode the order
//! is local, then openai, then gemini; the batch provider is only reachable
//! through an explicit `provider = "openai-batch"`. An explicitly named
//! provider that is unusable either fails hard or, with `fallback = true`,
//! hands over to the remaining waterfall.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use recall_config::MemoryConfig;
use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;

use crate::batch::OpenAiBatchEmbedder;
use crate::gemini::GeminiEmbedder;
use crate::local::LocalEmbedder;
use crate::model_manager::ModelManager;
use crate::openai::OpenAiEmbedder;

/// A waterfall candidate that was probed and passed over.
#[derive(Debug, Clone)]
pub struct SkippedProvider {
    pub provider: String,
    pub reason: String,
}

/// The outcome of provider selection.
pub struct SelectedBackend {
    pub backend: Arc<dyn EmbeddingBackend>,
    /// Candidates tried before the selected one, with the reason each was
    /// unusable. Logged once at startup.
    pub skipped: Vec<SkippedProvider>,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("backend", &self.backend.provider_id())
            .field("skipped", &self.skipped)
            .finish()
    }
}


/// Select an embedding backend for this index, reading credentials from the
/// process environment.
pub async fn select_backend(
    config: &MemoryConfig,
    data_dir: &Path,
    cancel: CancellationToken,
) -> Result<SelectedBackend, RecallError> {
    select_with_credentials(config, data_dir, cancel, |name| std::env::var(name).ok()).await
}

async fn select_with_credentials(
    config: &MemoryConfig,
    data_dir: &Path,
    cancel: CancellationToken,
    credential: impl Fn(&str) -> Option<String>,
) -> Result<SelectedBackend, RecallError> {
    let manager = ModelManager::new(data_dir.to_path_buf());
    let explicit = config.provider != "auto";

    let order: Vec<String> = if explicit {
        let mut order = vec![config.provider.clone()];
        if config.fallback {
            for p in ["local", "openai", "gemini"] {
                if p != config.provider {
                    order.push(p.to_string());
                }
            }
        }
        order
    } else {
        vec!["local".into(), "openai".into(), "gemini".into()]
    };

    let mut skipped: Vec<SkippedProvider> = Vec::new();
    for provider in order {
        // The model override applies only to the provider it was written for.
        let named = explicit && provider == config.provider;
        let model = if named { config.model.clone() } else { None };

        match try_build(&provider, named, model, &manager, &cancel, &credential).await {
            Ok(backend) => {
                for skip in &skipped {
                    debug!(provider = %skip.provider, reason = %skip.reason, "skipped embedding provider");
                }
                info!(
                    provider = %backend.provider_id(),
                    model = %backend.model(),
                    dimensions = backend.dimensions(),
                    "selected embedding backend"
                );
                return Ok(SelectedBackend { backend, skipped });
            }
            Err(reason) => skipped.push(SkippedProvider { provider, reason }),
        }
    }

    let missing = skipped
        .iter()
        .map(|s| format!("{}: {}", s.provider, s.reason))
        .collect::<Vec<_>>()
        .join("; ");
    Err(RecallError::ProviderUnavailable { missing })
}

async fn try_build(
    provider: &str,
    named: bool,
    model: Option<String>,
    manager: &ModelManager,
    cancel: &CancellationToken,
    credential: &impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn EmbeddingBackend>, String> {
    match provider {
        "local" => {
            let model_dir = if named {
                manager.ensure_model().await.map_err(|e| e.to_string())?
            } else if manager.is_available() {
                manager.model_dir()
            } else {
                return Err("model files not downloaded".to_string());
            };
            let embedder = LocalEmbedder::load(&model_dir).map_err(|e| e.to_string())?;
            Ok(Arc::new(embedder))
        }
        "openai" => {
            let key = credential("OPENAI_API_KEY").ok_or("OPENAI_API_KEY not set")?;
            let embedder = OpenAiEmbedder::new(&key, model).map_err(|e| e.to_string())?;
            Ok(Arc::new(embedder))
        }
        "gemini" => {
            let key = credential("GEMINI_API_KEY").ok_or("GEMINI_API_KEY not set")?;
            let embedder = GeminiEmbedder::new(&key, model).map_err(|e| e.to_string())?;
            Ok(Arc::new(embedder))
        }
        "openai-batch" => {
            let key = credential("OPENAI_API_KEY").ok_or("OPENAI_API_KEY not set")?;
            let embedder =
                OpenAiBatchEmbedder::new(&key, model, cancel.clone()).map_err(|e| e.to_string())?;
            Ok(Arc::new(embedder))
        }
        other => Err(format!("unknown provider {other}")),
    }
}
