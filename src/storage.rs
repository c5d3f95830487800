//! Object storage access for uploaded documents.
//!
//! The pipeline only ever *reads* from storage: given a public URL or a
//! storage path, return the raw bytes. [`ObjectStorage`] is the seam;
//! [`DefaultStorage`] covers HTTP(S) URLs, a local storage root and an HTTP
//! download endpoint, and [`MemoryStorage`] backs tests.
//!
//! Every read takes a byte ceiling. A document over it fails with
//! [`TooLarge`] before its body is buffered.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StorageConfig;

/// A document is larger than the caller's byte ceiling.
#[derive(Debug, Error)]
#[error("document exceeds {limit} bytes (at least {size})")]
pub struct TooLarge {
    pub size: u64,
    pub limit: u64,
}

fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(TooLarge { size, limit }.into());
    }
    Ok(())
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch a document by its public URL, reading at most `max_bytes`.
    async fn fetch_url(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>>;

    /// Download a document by its storage path (the direct path used when
    /// the public URL is unavailable), reading at most `max_bytes`.
    async fn download(&self, path: &str, max_bytes: u64) -> Result<Vec<u8>>;
}

/// Storage backed by `reqwest` and, optionally, a local directory.
pub struct DefaultStorage {
    client: reqwest::Client,
    local_root: Option<PathBuf>,
    download_base: Option<String>,
}

impl DefaultStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            local_root: config.local_root.clone(),
            download_base: config
                .download_base
                .as_ref()
                .map(|b| b.trim_end_matches('/').to_string()),
        })
    }

    async fn get(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
        debug!(url, "fetching document");
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;
        if let Some(len) = resp.content_length() {
            check_size(len, max_bytes)?;
        }
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            body.extend_from_slice(&chunk);
            check_size(body.len() as u64, max_bytes)?;
        }
        Ok(body)
    }
}

/// Rejects absolute paths and `..` so storage paths stay under the root.
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative.trim_start_matches('/'));
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("storage path escapes the storage root: {}", relative);
    }
    Ok(root.join(rel))
}

#[async_trait]
impl ObjectStorage for DefaultStorage {
    async fn fetch_url(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("unsupported document URL: {}", url);
        }
        self.get(url, max_bytes).await
    }

    async fn download(&self, path: &str, max_bytes: u64) -> Result<Vec<u8>> {
        if let Some(root) = &self.local_root {
            let full = resolve_under(root, path)?;
            let meta = tokio::fs::metadata(&full)
                .await
                .with_context(|| format!("Failed to stat {}", full.display()))?;
            check_size(meta.len(), max_bytes)?;
            return tokio::fs::read(&full)
                .await
                .with_context(|| format!("Failed to read {}", full.display()));
        }
        match &self.download_base {
            Some(base) => {
                self.get(
                    &format!("{}/{}", base, path.trim_start_matches('/')),
                    max_bytes,
                )
                .await
            }
            None => bail!("no storage root or download endpoint configured"),
        }
    }
}

/// In-memory storage keyed by URL or path.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.into(), bytes.into());
    }

    async fn lookup(&self, key: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let objects = self.objects.read().await;
        let bytes = objects
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("object not found: {}", key))?;
        check_size(bytes.len() as u64, max_bytes)?;
        Ok(bytes.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn fetch_url(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
        self.lookup(url, max_bytes).await
    }

    async fn download(&self, path: &str, max_bytes: u64) -> Result<Vec<u8>> {
        self.lookup(path, max_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_paths_cannot_escape_root() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_under(root, "p1/brief.pdf").unwrap(),
            PathBuf::from("/srv/files/p1/brief.pdf")
        );
        assert_eq!(
            resolve_under(root, "/p1/brief.pdf").unwrap(),
            PathBuf::from("/srv/files/p1/brief.pdf")
        );
        assert!(resolve_under(root, "../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn local_root_download_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("p1")).unwrap();
        std::fs::write(tmp.path().join("p1/notes.txt"), "hello").unwrap();
        let storage = DefaultStorage::new(&StorageConfig {
            local_root: Some(tmp.path().to_path_buf()),
            ..StorageConfig::default()
        })
        .unwrap();
        assert_eq!(
            storage.download("p1/notes.txt", 1024).await.unwrap(),
            b"hello"
        );
        assert!(storage.fetch_url("ftp://nope", 1024).await.is_err());

        let err = storage.download("p1/notes.txt", 3).await.unwrap_err();
        assert!(err.downcast_ref::<TooLarge>().is_some());
    }

    #[tokio::test]
    async fn file_urls_are_not_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let secret = tmp.path().join("secret.txt");
        std::fs::write(&secret, "DB_PASSWORD=hunter2").unwrap();
        let storage = DefaultStorage::new(&StorageConfig {
            local_root: Some(tmp.path().to_path_buf()),
            ..StorageConfig::default()
        })
        .unwrap();

        let url = format!("file://{}", secret.display());
        let err = storage.fetch_url(&url, 1024).await.unwrap_err();
        assert!(err.to_string().contains("unsupported document URL"));
    }

    #[tokio::test]
    async fn memory_storage_misses_are_errors() {
        let storage = MemoryStorage::new();
        storage.put("a", b"1".to_vec()).await;
        assert_eq!(storage.fetch_url("a", 16).await.unwrap(), b"1");
        assert!(storage.download("b", 16).await.is_err());
    }

    #[tokio::test]
    async fn http_bodies_over_the_limit_are_cut_off() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/big.txt",
            axum::routing::get(|| async { "a".repeat(4096) }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let storage = DefaultStorage::new(&StorageConfig::default()).unwrap();
        let url = format!("http://{}/big.txt", addr);
        let err = storage.fetch_url(&url, 1024).await.unwrap_err();
        let too_large = err.downcast_ref::<TooLarge>().unwrap();
        assert_eq!(too_large.limit, 1024);
        assert_eq!(storage.fetch_url(&url, 8192).await.unwrap().len(), 4096);
    }
}
