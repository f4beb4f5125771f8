use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Where log objects come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProvider {
    S3,
    #[default]
    Local,
    Memory,
}

/// Log object source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub provider: SourceProvider,
    /// S3 bucket holding the edge logs
    pub bucket: Option<String>,
    /// Key prefix listed by `ingest`
    #[serde(default)]
    pub prefix: String,
    /// Directory served by the local provider
    #[serde(default = "default_source_root")]
    pub root: Option<PathBuf>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Loaded from environment, not from config file
    #[serde(skip)]
    pub access_key: Option<String>,
    /// Loaded from environment, not from config file
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: SourceProvider::default(),
            bucket: None,
            prefix: String::new(),
            root: default_source_root(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_source_root() -> Option<PathBuf> {
    Some(PathBuf::from("data/incoming"))
}

/// Bucket store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Fjall block cache
    #[serde(default = "default_cache_size")]
    pub cache_size: ByteSize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            cache_size: default_cache_size(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/buckets")
}

fn default_cache_size() -> ByteSize {
    ByteSize(32 * 1024 * 1024) // 32 MB
}

/// Ingestion run configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_delete_after")]
    pub delete_after: bool,
    #[serde(default = "default_commit_attempts")]
    pub commit_attempts: u32,
    #[serde(default = "default_commit_backoff_ms")]
    pub commit_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            delete_after: default_delete_after(),
            commit_attempts: default_commit_attempts(),
            commit_backoff_ms: default_commit_backoff_ms(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_delete_after() -> bool {
    true
}

fn default_commit_attempts() -> u32 {
    3
}

fn default_commit_backoff_ms() -> u64 {
    200
}

/// Flat-file export configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub include_today: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            include_today: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/var/log")
}
