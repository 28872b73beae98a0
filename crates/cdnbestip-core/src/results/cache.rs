// # Results Cache
//
// Keyed JSON snapshots of parsed results, so a run can reuse the ranking
// input of an earlier run without re-reading the speed test output.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "created_at": "2026-01-09T12:00:00Z",
//   "results": [ { "ip": "1.1.1.1", "port": 443, ... } ]
// }
// ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::ResultRecord;

const CACHE_FILE_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct CacheFileFormat {
    version: String,
    created_at: DateTime<Utc>,
    results: Vec<ResultRecord>,
}

/// Directory of cached result sets
#[derive(Debug, Clone)]
pub struct ResultsCache {
    dir: PathBuf,
}

impl ResultsCache {
    /// Cache rooted at `dir` (created on first store)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::config(format!("Invalid cache key: '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Store `results` under `key`, replacing any previous entry
    pub async fn store(&self, key: &str, results: &[ResultRecord]) -> Result<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.dir).await?;

        let entry = CacheFileFormat {
            version: CACHE_FILE_VERSION.to_string(),
            created_at: Utc::now(),
            results: results.to_vec(),
        };
        let json = serde_json::to_string_pretty(&entry)?;

        let mut temp = path.clone();
        temp.set_extension("tmp");
        {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }
        fs::rename(&temp, &path).await?;

        debug!("Cached {} results under '{}'", results.len(), key);
        Ok(())
    }

    /// Load the entry for `key` if it is younger than `max_age_hours`
    ///
    /// Missing, expired and corrupted entries all yield `None`.
    pub async fn load(&self, key: &str, max_age_hours: f64) -> Result<Option<Vec<ResultRecord>>> {
        let path = self.entry_path(key)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheFileFormat = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring corrupted cache entry {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if entry.version != CACHE_FILE_VERSION {
            warn!(
                "Cache entry version mismatch: expected {}, got {}",
                CACHE_FILE_VERSION, entry.version
            );
        }

        let age = Utc::now().signed_duration_since(entry.created_at);
        let age_hours = age.num_milliseconds() as f64 / 3_600_000.0;
        if age_hours > max_age_hours {
            debug!("Cache entry '{}' expired ({:.1}h old)", key, age_hours);
            return Ok(None);
        }

        Ok(Some(entry.results))
    }
}
