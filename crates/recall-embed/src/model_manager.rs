// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the local embedding model.
//!
//! Fetches the all-MiniLM-L6-v2 INT8 ONNX export from HuggingFace into the
//! data directory. The waterfall only probes for file presence; the download
//! runs when the local provider is requested explicitly.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::info;

use recall_core::error::RecallError;

use crate::local::LOCAL_MODEL;

const MODEL_URL: &str = "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Resolves model file paths and downloads them on first use.
pub struct ModelManager {
    data_dir: PathBuf,
    /// Serializes concurrent `ensure_model` callers.
    download_lock: Mutex<()>,
}

impl ModelManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            download_lock: Mutex::new(()),
        }
    }

    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(LOCAL_MODEL)
    }

    /// True when both model files are on disk.
    pub fn is_available(&self) -> bool {
        let dir = self.model_dir();
        dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists()
    }

    /// Downloads the model files if missing and returns the model directory.
    pub async fn ensure_model(&self) -> Result<PathBuf, RecallError> {
        let _guard = self.download_lock.lock().await;

        if self.is_available() {
            return Ok(self.model_dir());
        }

        info!("local embedding model missing, downloading from HuggingFace");

        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| RecallError::Internal(format!("failed to create model directory: {e}")))?;

        for (filename, url) in [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)] {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }
            match download_file(url, &dest).await {
                Ok(size) => info!(filename, size, "downloaded model file"),
                Err(e) => {
                    // Drop partial files so the next attempt starts clean.
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
            }
        }

        info!(dir = %model_dir.display(), "local embedding model ready");
        Ok(model_dir)
    }
}

async fn download_file(url: &str, dest: &Path) -> Result<usize, RecallError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| RecallError::Internal(format!("download of {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(RecallError::Internal(format!(
            "download of {url} returned {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RecallError::Internal(format!("reading body of {url} failed: {e}")))?;

    let size = bytes.len();
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| RecallError::Internal(format!("writing {} failed: {e}", dest.display())))?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf());
        assert!(!manager.is_available());

        let model_dir = manager.model_dir();
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("model.onnx"), b"stub").unwrap();
        assert!(!manager.is_available());

        std::fs::write(model_dir.join("tokenizer.json"), b"{}").unwrap();
        assert!(manager.is_available());
    }
}
