//! Speed test results: parsing, validation, and on-disk management
//!
//! - [`parser`]: delimited text to [`ResultRecord`]s
//! - [`files`]: freshness, inspection and cleanup of results files
//! - [`cache`]: keyed JSON snapshots of parsed results
//!
//! The workflow only reads and refreshes its own output file.
//! [`ResultsCache`] and [`cleanup_old_results`] are library helpers for
//! callers that keep several result sets around; nothing in the pipeline
//! calls them.

pub mod cache;
pub mod files;
pub mod parser;

pub use cache::ResultsCache;
pub use files::{
    ResultsFileInfo, cleanup_old_results, force_refresh_results, is_results_file_valid,
    results_file_info, save_results, should_refresh_results,
};
pub use parser::{parse, parse_file};

use tracing::warn;

use crate::models::ResultRecord;

/// Drop records with an empty IP or negative measurements
pub fn validate_results(records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    let before = records.len();
    let valid: Vec<_> = records.into_iter().filter(ResultRecord::is_valid).collect();
    if valid.len() < before {
        warn!("Dropped {} invalid results", before - valid.len());
    }
    valid
}
