// # Speed Test Runner
//
// Drives the external CloudflareSpeedTest binary (`cfst`) as a child
// process.
//
// ## Command Line
//
// ```text
// <binary> -f <ip_file> -o <output> [-tp <port>] [-url <url>]
//          [-sl <threshold> -tl 200] [-dn <quantity>] [extra args...]
// ```
//
// `-sl`/`-tl` are passed only for a positive speed threshold and `-dn` only
// for a positive quantity.
//
// ## Failure Modes
//
// - IP file missing: `IpFileNotFound`, checked before spawning
// - Binary cannot be started: `SpeedTestBinaryNotFound`
// - Non-zero exit: `SpeedTestFailed` with the exit code and stderr
// - Wall-clock limit reached: the child is killed, any partial output is
//   removed, `SpeedTestTimeout`
// - Zero exit without an output file: `ResultsFileNotFound`

use async_trait::async_trait;
use cdnbestip_core::config::{SelectionConfig, SpeedTestConfig};
use cdnbestip_core::traits::SpeedTester;
use cdnbestip_core::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Latency ceiling (ms) passed alongside a speed threshold
const LATENCY_LIMIT_MS: u32 = 200;

/// Runs the speed test binary
#[derive(Debug, Clone)]
pub struct CfstRunner {
    binary: PathBuf,
    port: Option<u16>,
    url: Option<String>,
    speed_threshold: f64,
    quantity: usize,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl CfstRunner {
    /// Runner for `binary` with no optional flags and a 600 s limit
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            port: None,
            url: None,
            speed_threshold: 0.0,
            quantity: 0,
            timeout: SpeedTestConfig::default().timeout(),
            extra_args: Vec::new(),
        }
    }

    /// Runner configured from the speed test and selection settings
    pub fn from_config(speed_test: &SpeedTestConfig, selection: &SelectionConfig) -> Self {
        Self {
            binary: speed_test.binary.clone(),
            port: speed_test.port,
            url: speed_test.url.clone(),
            speed_threshold: selection.speed_threshold,
            quantity: selection.quantity,
            timeout: speed_test.timeout(),
            extra_args: speed_test.extra_args.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_speed_threshold(mut self, threshold: f64) -> Self {
        self.speed_threshold = threshold;
        self
    }

    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Arguments passed to the binary
    pub fn arguments(&self, ip_file: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            ip_file.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
        ];

        if let Some(port) = self.port {
            args.push("-tp".into());
            args.push(port.to_string().into());
        }
        if let Some(url) = &self.url {
            args.push("-url".into());
            args.push(url.into());
        }
        if self.speed_threshold > 0.0 {
            args.push("-sl".into());
            args.push(format_threshold(self.speed_threshold).into());
            args.push("-tl".into());
            args.push(LATENCY_LIMIT_MS.to_string().into());
        }
        if self.quantity > 0 {
            args.push("-dn".into());
            args.push(self.quantity.to_string().into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

/// Render a threshold the way the binary documents it (`5.0`, `2.5`)
fn format_threshold(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

#[async_trait]
impl SpeedTester for CfstRunner {
    async fn run(&self, ip_file: &Path, output: &Path) -> Result<PathBuf> {
        match tokio::fs::metadata(ip_file).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(Error::IpFileNotFound(ip_file.to_path_buf())),
        }

        let args = self.arguments(ip_file, output);
        tracing::info!(
            "Running speed test: {} {}",
            self.binary.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    Error::SpeedTestBinaryNotFound(self.binary.clone())
                }
                _ => Error::Network(e),
            })?;

        // Dropping the wait future on timeout kills the child
        let finished = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!("Speed test exceeded {:?}, killed", self.timeout);
                if let Err(e) = tokio::fs::remove_file(output).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial results {}: {}", output.display(), e);
                    }
                }
                return Err(Error::SpeedTestTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr).trim().to_string();
            // Killed by a signal has no code
            let exit_code = finished.status.code().unwrap_or(-1);
            tracing::error!("Speed test exited with {}: {}", exit_code, stderr);
            return Err(Error::SpeedTestFailed { exit_code, stderr });
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(Error::ResultsFileNotFound(output.to_path_buf()));
        }

        tracing::info!("Speed test finished, results in {}", output.display());
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "cfst"
    }
}
