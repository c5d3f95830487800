use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Storage paths are resolved under this directory when set.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// HTTP base URL for storage-path downloads.
    #[serde(default)]
    pub download_base: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_root: None,
            download_base: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Entries with this many failed attempts are no longer polled.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_website_priority")]
    pub website_priority: i64,
    /// Propagate knowledge-item insert failures instead of logging them.
    #[serde(default = "default_strict_writes")]
    pub strict_writes: bool,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            website_priority: default_website_priority(),
            strict_writes: default_strict_writes(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_batch_size() -> usize {
    10
}
fn default_website_priority() -> i64 {
    9
}
fn default_strict_writes() -> bool {
    true
}
fn default_max_document_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("extraction.max_attempts must be >= 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("extraction.batch_size must be >= 1");
        }
        if self.max_document_bytes == 0 {
            anyhow::bail!("extraction.max_document_bytes must be > 0");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.extraction.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
