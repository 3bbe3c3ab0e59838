//! Segmentation model download
//!
//! The model file is fetched once into its configured path. Downloads land
//! in a `.part` file next to the target and are renamed into place only
//! after the optional SHA256 check passes, so a partial download is never
//! mistaken for a model.

use crate::config::SegmentationConfig;
use crate::error::{PhotoError, Result};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Fetches and verifies model files
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
}

impl ModelDownloader {
    /// Create a new model downloader
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| PhotoError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client })
    }

    /// Make sure the configured model exists locally, downloading it if needed
    ///
    /// # Errors
    /// - Model missing and no download URL configured
    /// - Network or filesystem errors during download
    /// - SHA256 mismatch
    pub async fn ensure_model(&self, config: &SegmentationConfig) -> Result<PathBuf> {
        let path = &config.model_path;
        let expected = config.model_sha256.as_deref();

        if path.is_file() {
            if !verify_file_integrity(path, expected)? {
                return Err(PhotoError::model(format!(
                    "Model file {} does not match the configured SHA256",
                    path.display()
                )));
            }
            log::debug!("Using existing model at {}", path.display());
            return Ok(path.clone());
        }

        let url = config.model_url.as_deref().ok_or_else(|| {
            PhotoError::model(format!(
                "Model file {} not found and no model URL configured",
                path.display()
            ))
        })?;
        validate_model_url(url)?;

        let partial = partial_path(path);
        self.download_file(url, &partial).await?;

        if !verify_file_integrity(&partial, expected)? {
            let _ = std::fs::remove_file(&partial);
            return Err(PhotoError::model(format!(
                "Downloaded model from {url} does not match the configured SHA256"
            )));
        }

        std::fs::rename(&partial, path)
            .map_err(|e| PhotoError::file_io_error("move downloaded model to", path, &e))?;
        log::info!("Model downloaded to {}", path.display());
        Ok(path.clone())
    }

    /// Download a single file by streaming the response body to disk
    async fn download_file(&self, url: &str, local_path: &Path) -> Result<()> {
        log::info!("Downloading model: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PhotoError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PhotoError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(PhotoError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP status {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| PhotoError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(std::io::Error::other),
        );

        let downloaded = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| PhotoError::network_error("Failed to read download stream", e))?;

        file.flush()
            .await
            .map_err(|e| PhotoError::file_io_error("flush file", local_path, &e))?;

        log::debug!(
            "Downloaded {:.2} MB to {}",
            downloaded as f64 / (1024.0 * 1024.0),
            local_path.display()
        );
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Verify a file against an expected SHA256 hex digest
///
/// Returns `true` when no digest is expected.
///
/// # Errors
/// - File cannot be read
pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_hash else {
        return Ok(true);
    };

    let mut file = std::fs::File::open(file_path)
        .map_err(|e| PhotoError::file_io_error("open file for verification", file_path, &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| PhotoError::file_io_error("read file for verification", file_path, &e))?;
        if read == 0 {
            break;
        }
        hasher.update(buffer.get(..read).unwrap_or_default());
    }

    let actual_hash = format!("{:x}", hasher.finalize());
    if actual_hash.eq_ignore_ascii_case(expected.trim()) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected,
            actual_hash
        );
        Ok(false)
    }
}

/// Validate that a model URL can be fetched
///
/// # Errors
/// - Empty URL or a scheme other than `http`/`https`
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(PhotoError::invalid_config("Model URL cannot be empty"));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            PhotoError::invalid_config(format!(
                "Unsupported model URL: {url}. Only http(s) URLs are supported"
            ))
        })?;

    if rest.split('/').next().unwrap_or_default().is_empty() {
        return Err(PhotoError::invalid_config(format!(
            "Model URL has no host: {url}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url(crate::config::DEFAULT_MODEL_URL).is_ok());
        assert!(validate_model_url("http://localhost:8000/u2net.onnx").is_ok());
        assert!(validate_model_url("").is_err());
        assert!(validate_model_url("ftp://example.com/model.onnx").is_err());
        assert!(validate_model_url("https:///model.onnx").is_err());
    }

    #[test]
    fn test_verify_file_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.onnx");
        std::fs::write(&path, b"test content").unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"test content");
        let hash = format!("{:x}", hasher.finalize());

        assert!(verify_file_integrity(&path, None).unwrap());
        assert!(verify_file_integrity(&path, Some(&hash)).unwrap());
        assert!(verify_file_integrity(&path, Some(&hash.to_uppercase())).unwrap());
        assert!(!verify_file_integrity(&path, Some("deadbeef")).unwrap());
        assert!(verify_file_integrity(&temp_dir.path().join("missing"), Some(&hash)).is_err());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("models/u2net.onnx")),
            PathBuf::from("models/u2net.onnx.part")
        );
    }

    #[tokio::test]
    async fn test_ensure_model_uses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("u2net.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let config = SegmentationConfig {
            model_path: path.clone(),
            model_url: None,
            ..SegmentationConfig::default()
        };
        let resolved = ModelDownloader::new().unwrap().ensure_model(&config).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn test_ensure_model_rejects_tampered_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("u2net.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let config = SegmentationConfig {
            model_path: path,
            model_sha256: Some("00".repeat(32)),
            ..SegmentationConfig::default()
        };
        let err = ModelDownloader::new().unwrap().ensure_model(&config).await.unwrap_err();
        assert!(matches!(err, PhotoError::Model(_)));
    }

    #[tokio::test]
    async fn test_ensure_model_without_url_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = SegmentationConfig {
            model_path: temp_dir.path().join("absent.onnx"),
            model_url: None,
            ..SegmentationConfig::default()
        };
        let err = ModelDownloader::new().unwrap().ensure_model(&config).await.unwrap_err();
        assert!(matches!(err, PhotoError::Model(_)));
    }
}
