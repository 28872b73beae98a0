// # Speed Tester Trait
//
// Runs the external speed test against a candidate IP file and reports where
// the results landed.
//
// ## Implementations
//
// - Child process runner: `cdnbestip-speedtest` crate
//
// Failures map onto distinct errors so the caller can give distinct
// guidance: `Error::SpeedTestTimeout`, `Error::SpeedTestFailed` (non-zero
// exit), `Error::SpeedTestBinaryNotFound` and `Error::IpFileNotFound`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Trait for speed test runners
#[async_trait]
pub trait SpeedTester: Send + Sync {
    /// Measure the IPs in `ip_file`, writing results to `output`
    ///
    /// Returns the path of the results file. A timed-out run never leaves a
    /// results file that should be trusted.
    async fn run(&self, ip_file: &Path, output: &Path) -> Result<PathBuf>;

    /// Runner name (for logging/debugging)
    fn name(&self) -> &'static str;
}
