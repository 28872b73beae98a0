// # IP Source Trait
//
// Supplies the candidate IP list the speed test measures. Fetching the
// provider ranges (CloudFlare, GCore, CloudFront, ...) happens outside this
// crate; the workflow only needs a local file path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Trait for candidate IP list providers
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Make the IP list available locally and return its path
    async fn prepare(&self) -> Result<PathBuf>;

    /// Source name (for logging/debugging)
    fn source_name(&self) -> &str;
}

/// An IP list that already exists on disk
#[derive(Debug, Clone)]
pub struct LocalIpFile {
    path: PathBuf,
}

impl LocalIpFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IpSource for LocalIpFile {
    async fn prepare(&self) -> Result<PathBuf> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(self.path.clone()),
            _ => Err(Error::IpFileNotFound(self.path.clone())),
        }
    }

    fn source_name(&self) -> &str {
        "local-file"
    }
}
