// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Model download and cache manager.
//!
//! Models are fetched on first use into `~/.cache/voicewire/models/` and
//! verified by SHA256 before they are handed out.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Errors from model download and cache management.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SHA256 mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("home directory not found")]
    NoHomeDir,
}

/// URL for the Silero VAD ONNX model.
pub const SILERO_VAD_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx";

/// Expected SHA256 of the Silero VAD model. Empty disables verification.
pub const SILERO_VAD_SHA256: &str = "";

/// Local filename for the cached Silero VAD model.
pub const SILERO_VAD_FILENAME: &str = "silero_vad_v5.onnx";

/// Downloads and caches model files.
pub struct ModelManager;

impl ModelManager {
    /// Return the local path for a model, downloading it if needed.
    ///
    /// A cached file whose hash no longer matches `expected_sha256` is
    /// re-downloaded; a mismatch after downloading is an error.
    pub async fn get_model(
        filename: &str,
        url: &str,
        expected_sha256: Option<&str>,
    ) -> Result<PathBuf, ModelError> {
        let path = Self::cache_dir()?.join(filename);
        let expected = expected_sha256.filter(|s| !s.is_empty());

        if path.exists() {
            match expected {
                Some(expected) => {
                    let actual = Self::sha256_file(&path).await?;
                    if actual == expected {
                        return Ok(path);
                    }
                    tracing::warn!(model = filename, "cached model hash mismatch, re-downloading");
                    tokio::fs::remove_file(&path).await?;
                }
                None => return Ok(path),
            }
        }

        tracing::info!(model = filename, url, "downloading model");
        Self::download(url, &path).await?;

        if let Some(expected) = expected {
            let actual = Self::sha256_file(&path).await?;
            if actual != expected {
                tokio::fs::remove_file(&path).await?;
                return Err(ModelError::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(path)
    }

    /// Fetch (or reuse) the Silero VAD model.
    pub async fn get_silero_vad() -> Result<PathBuf, ModelError> {
        Self::get_model(SILERO_VAD_FILENAME, SILERO_VAD_URL, Some(SILERO_VAD_SHA256)).await
    }

    fn cache_dir() -> Result<PathBuf, ModelError> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| ModelError::NoHomeDir)?;
        let cache = home.join(".cache").join("voicewire").join("models");
        std::fs::create_dir_all(&cache)?;
        Ok(cache)
    }

    /// Download `url` to `dest`, writing to a `.tmp` sibling and renaming so
    /// readers never see a partial file.
    async fn download(url: &str, dest: &Path) -> Result<(), ModelError> {
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let tmp = dest.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, dest).await?;

        tracing::info!(path = %dest.display(), "model downloaded");
        Ok(())
    }

    async fn sha256_file(path: &Path) -> Result<String, ModelError> {
        let bytes = tokio::fs::read(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sha256_of_known_content() {
        let dir = std::env::temp_dir().join("voicewire-model-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let hash = ModelManager::sha256_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
