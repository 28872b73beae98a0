// # Results File Management
//
// Freshness checks, inspection and cleanup for speed test output files.
// A results file older than the configured age (or unreadable) is refreshed
// by running the speed test again; otherwise the previous run is reused.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::parser;
use crate::error::{Error, Result};
use crate::models::ResultRecord;

/// Header written by [`save_results`]
pub const RESULTS_HEADER: &str = "IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)";

/// Summary of a results file on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFileInfo {
    /// Path inspected
    pub path: PathBuf,
    /// Whether the file exists
    pub exists: bool,
    /// Size in bytes
    pub size: u64,
    /// Hours since last modification
    pub age_hours: f64,
    /// Number of records that parse
    pub result_count: usize,
    /// Whether the file parses to at least one record
    pub is_valid: bool,
}

fn age_hours(modified: SystemTime) -> f64 {
    let modified: DateTime<Utc> = modified.into();
    let elapsed = Utc::now().signed_duration_since(modified);
    (elapsed.num_milliseconds().max(0) as f64) / 3_600_000.0
}

async fn file_age_hours(path: &Path) -> Option<f64> {
    let metadata = fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(age_hours)
}

/// Write records in the English layout, atomically
pub async fn save_results(records: &[ResultRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut body = String::from(RESULTS_HEADER);
    body.push('\n');
    for r in records {
        body.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            r.ip, r.port, r.data_center, r.region, r.city, r.speed, r.latency
        ));
    }

    let mut temp = path.to_path_buf();
    temp.set_extension("tmp");
    {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
    }
    fs::rename(&temp, path).await?;

    debug!("Saved {} results to {}", records.len(), path.display());
    Ok(())
}

/// Whether the speed test should run again
///
/// True when the file is missing, unreadable, or older than `max_age_hours`.
pub async fn should_refresh_results(path: impl AsRef<Path>, max_age_hours: f64) -> bool {
    match file_age_hours(path.as_ref()).await {
        Some(age) => age > max_age_hours,
        None => true,
    }
}

/// Whether the file exists and yields at least one record
pub async fn is_results_file_valid(path: impl AsRef<Path>) -> bool {
    parser::parse_file(path).await.is_ok()
}

/// Inspect a results file
pub async fn results_file_info(path: impl AsRef<Path>) -> ResultsFileInfo {
    let path = path.as_ref();
    let mut info = ResultsFileInfo {
        path: path.to_path_buf(),
        exists: false,
        size: 0,
        age_hours: 0.0,
        result_count: 0,
        is_valid: false,
    };

    let Ok(metadata) = fs::metadata(path).await else {
        return info;
    };
    info.exists = true;
    info.size = metadata.len();
    info.age_hours = metadata.modified().map(age_hours).unwrap_or(0.0);

    if let Ok(records) = parser::parse_file(path).await {
        info.result_count = records.len();
        info.is_valid = true;
    }
    info
}

/// Delete `*.csv` files in `dir` older than `max_age_days`
///
/// Returns the number of files removed. A missing directory removes nothing.
pub async fn cleanup_old_results(dir: impl AsRef<Path>, max_age_days: f64) -> Result<usize> {
    let dir = dir.as_ref();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let max_age_hours = max_age_days * 24.0;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(age) = file_age_hours(&path).await else {
            continue;
        };
        if age <= max_age_hours {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed old results file {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Cleaned up {} old results files in {}", removed, dir.display());
    }
    Ok(removed)
}

/// Remove a results file so the next run re-measures
pub async fn force_refresh_results(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            info!("Removed results file {} to force refresh", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Network(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ResultRecord> {
        vec![
            ResultRecord::new("1.1.1.1", 443, 15.5, 25.3).with_location("LAX", "US", "LA"),
            ResultRecord::new("1.0.0.1", 443, 12.8, 30.1).with_location("NYC", "US", "NY"),
        ]
    }

    #[tokio::test]
    async fn saved_results_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/result.csv");
        save_results(&sample(), &path).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with(RESULTS_HEADER));
        assert_eq!(parser::parse_file(&path).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn fresh_file_is_not_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        assert!(should_refresh_results(&path, 24.0).await);

        save_results(&sample(), &path).await.unwrap();
        assert!(!should_refresh_results(&path, 24.0).await);
        assert!(should_refresh_results(&path, -1.0).await);
    }

    #[tokio::test]
    async fn info_reports_missing_and_present_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");

        let missing = results_file_info(&path).await;
        assert!(!missing.exists);
        assert!(!missing.is_valid);

        save_results(&sample(), &path).await.unwrap();
        let present = results_file_info(&path).await;
        assert!(present.exists);
        assert!(present.is_valid);
        assert_eq!(present.result_count, 2);
        assert!(present.size > 0);
        assert!(present.age_hours < 1.0);
    }

    #[tokio::test]
    async fn header_only_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        fs::write(&path, format!("{}\n", RESULTS_HEADER)).await.unwrap();
        assert!(!is_results_file_valid(&path).await);
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x").await.unwrap();
        fs::write(dir.path().join("b.csv"), "x").await.unwrap();
        fs::write(dir.path().join("notes.txt"), "x").await.unwrap();

        // Nothing is older than a day yet
        assert_eq!(cleanup_old_results(dir.path(), 1.0).await.unwrap(), 0);
        // Negative age treats every file as expired
        assert_eq!(cleanup_old_results(dir.path(), -1.0).await.unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(
            cleanup_old_results(dir.path().join("missing"), 1.0).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn force_refresh_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        save_results(&sample(), &path).await.unwrap();

        force_refresh_results(&path).await.unwrap();
        assert!(!path.exists());
        force_refresh_results(&path).await.unwrap();
    }
}
