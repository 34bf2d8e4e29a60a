//! Model-file acquisition.
//!
//! Resolution order for hub files: an operator-supplied local model
//! directory (offline installs), then the Hugging Face hub with its
//! on-disk cache. The separately hosted fallback model is fetched by plain
//! HTTP into our own cache directory. All blocking transfers run off the
//! async threads.

use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("hub download failed for {repo_id}/{filename}: {message}")]
    Hub {
        repo_id: String,
        filename: String,
        message: String,
    },
    #[error("download failed for {url}: {message}")]
    Http { url: String, message: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("download task failed: {0}")]
    TaskFailed(String),
}

/// Fetches and caches model files.
#[derive(Clone)]
pub struct ModelFetcher {
    /// Local override directory searched before any network access.
    model_dir: Option<PathBuf>,
    /// Cache for direct-URL downloads.
    cache_dir: PathBuf,
}

impl ModelFetcher {
    pub fn new(model_dir: Option<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            model_dir,
            cache_dir,
        }
    }

    /// Resolve a hub-hosted file to a local path.
    pub async fn fetch_hub_file(&self, repo_id: &str, filename: &str) -> Result<PathBuf, FetchError> {
        if let Some(dir) = &self.model_dir {
            let local = dir.join(flatten_hub_name(repo_id, filename));
            if local.exists() {
                tracing::debug!(path = %local.display(), "using local model override");
                return Ok(local);
            }
        }

        let repo_id = repo_id.to_string();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || {
            let api = Api::new().map_err(|e| FetchError::Hub {
                repo_id: repo_id.clone(),
                filename: filename.clone(),
                message: e.to_string(),
            })?;
            let repo = api.repo(Repo::with_revision(
                repo_id.clone(),
                RepoType::Model,
                "main".to_string(),
            ));
            repo.get(&filename).map_err(|e| FetchError::Hub {
                repo_id,
                filename,
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| FetchError::TaskFailed(e.to_string()))?
    }

    /// Download a directly hosted file into the cache, reusing an existing
    /// cached copy byte-for-byte.
    pub async fn fetch_url(&self, url: &str) -> Result<PathBuf, FetchError> {
        let dest = self.cache_dir.join(file_name_for_url(url));
        if dest.exists() {
            tracing::debug!(path = %dest.display(), "using cached model");
            return Ok(dest);
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let response = reqwest::get(url).await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let response = response.error_for_status().map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let bytes = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        // Write-then-rename so a torn download never looks like a cache hit.
        let tmp = dest.with_extension("part");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &dest).await?;

        tracing::info!(url, path = %dest.display(), bytes = bytes.len(), "model downloaded");
        Ok(dest)
    }
}

/// Flat file name for a hub file inside the local override directory,
/// e.g. `Xenova--mobilevit-small--onnx--model.onnx`.
fn flatten_hub_name(repo_id: &str, filename: &str) -> String {
    format!(
        "{}--{}",
        repo_id.replace('/', "--"),
        filename.replace('/', "--")
    )
}

/// Cache file name for a direct URL (its final path segment).
fn file_name_for_url(url: &str) -> String {
    Path::new(url)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model.onnx".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_hub_name() {
        assert_eq!(
            flatten_hub_name("Xenova/mobilevit-small", "onnx/model.onnx"),
            "Xenova--mobilevit-small--onnx--model.onnx"
        );
    }

    #[test]
    fn test_file_name_for_url() {
        assert_eq!(
            file_name_for_url("https://example.com/models/mobilenetv2-10.onnx"),
            "mobilenetv2-10.onnx"
        );
    }

    #[tokio::test]
    async fn test_local_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let name = flatten_hub_name("owner/model", "onnx/model.onnx");
        let local = dir.path().join(&name);
        std::fs::write(&local, b"weights").unwrap();

        let fetcher = ModelFetcher::new(
            Some(dir.path().to_path_buf()),
            dir.path().join("cache"),
        );
        let resolved = fetcher
            .fetch_hub_file("owner/model", "onnx/model.onnx")
            .await
            .unwrap();
        assert_eq!(resolved, local);
    }

    #[tokio::test]
    async fn test_fetch_url_cache_hit_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().to_path_buf();
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("weights.onnx"), b"cached").unwrap();

        let fetcher = ModelFetcher::new(None, cache.clone());
        // The host below does not exist; a cache hit must not touch it.
        let path = fetcher
            .fetch_url("http://scanlens.invalid/weights.onnx")
            .await
            .unwrap();
        assert_eq!(path, cache.join("weights.onnx"));
    }
}
