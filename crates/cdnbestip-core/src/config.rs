//! Configuration types for CDNBestIP
//!
//! Every section deserializes with defaults, so a partial JSON document (or
//! an empty one) is a valid starting point. [`CdnBestIpConfig::validate`]
//! must pass before the workflow performs any I/O.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::{Backoff, RetryPolicy};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnBestIpConfig {
    /// Result selection
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Speed test invocation
    #[serde(default)]
    pub speed_test: SpeedTestConfig,

    /// DNS publication
    #[serde(default)]
    pub dns: DnsConfig,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the workflow event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl CdnBestIpConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            selection: SelectionConfig::default(),
            speed_test: SpeedTestConfig::default(),
            dns: DnsConfig::default(),
            retry: RetryConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        self.speed_test.validate()?;
        self.dns.validate()?;
        self.retry.validate()?;
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for CdnBestIpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum download speed in MB/s
    #[serde(default = "default_speed_threshold")]
    pub speed_threshold: f64,

    /// Number of IPs to publish (0 = all)
    #[serde(default)]
    pub quantity: usize,

    /// Publish only the single best IP
    #[serde(default)]
    pub only_one: bool,

    /// Maximum latency in ms
    #[serde(default)]
    pub max_latency: Option<f64>,

    /// Regions to keep (empty = all)
    #[serde(default)]
    pub allowed_regions: Vec<String>,

    /// Rank by weighted score instead of raw speed
    #[serde(default)]
    pub weighted: bool,

    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,

    #[serde(default = "default_latency_weight")]
    pub latency_weight: f64,

    /// Keep at most this many IPs per data center
    #[serde(default)]
    pub max_per_datacenter: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            speed_threshold: default_speed_threshold(),
            quantity: 0,
            only_one: false,
            max_latency: None,
            allowed_regions: Vec::new(),
            weighted: false,
            speed_weight: default_speed_weight(),
            latency_weight: default_latency_weight(),
            max_per_datacenter: None,
        }
    }
}

impl SelectionConfig {
    /// Validate selection settings
    pub fn validate(&self) -> Result<()> {
        if !self.speed_threshold.is_finite() || self.speed_threshold < 0.0 {
            return Err(Error::config(format!(
                "Speed threshold must be a non-negative number, got {}",
                self.speed_threshold
            )));
        }
        if let Some(max_latency) = self.max_latency {
            if !max_latency.is_finite() || max_latency < 0.0 {
                return Err(Error::config("Maximum latency must be non-negative"));
            }
        }
        if self.weighted {
            let weights = [self.speed_weight, self.latency_weight];
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(Error::config("Ranking weights must be non-negative"));
            }
            if self.speed_weight + self.latency_weight == 0.0 {
                return Err(Error::config("At least one ranking weight must be > 0"));
            }
        }
        Ok(())
    }

    /// Set the speed threshold
    pub fn with_speed_threshold(mut self, threshold: f64) -> Self {
        self.speed_threshold = threshold;
        self
    }

    /// Set the quantity
    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Speed test invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestConfig {
    /// Path to the speed test binary
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Candidate IP list
    #[serde(default = "default_ip_file")]
    pub ip_file: PathBuf,

    /// Where the speed test writes its results
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Port to test against
    #[serde(default)]
    pub port: Option<u16>,

    /// Download URL used for speed measurement
    #[serde(default)]
    pub url: Option<String>,

    /// Wall-clock limit for one run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra arguments appended verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Re-run even when a fresh results file exists
    #[serde(default)]
    pub refresh: bool,

    /// Age after which an existing results file is re-measured
    #[serde(default = "default_max_result_age_hours")]
    pub max_result_age_hours: f64,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            ip_file: default_ip_file(),
            output_file: default_output_file(),
            port: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            extra_args: Vec::new(),
            refresh: false,
            max_result_age_hours: default_max_result_age_hours(),
        }
    }
}

impl SpeedTestConfig {
    /// Validate speed test settings
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::config("Speed test timeout must be > 0"));
        }
        if self.port == Some(0) {
            return Err(Error::config("Speed test port must be between 1 and 65535"));
        }
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) || url.len() < 10 {
                return Err(Error::config(format!("Invalid speed test URL: {}", url)));
            }
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(Error::config("Speed test output file cannot be empty"));
        }
        Ok(())
    }

    /// Wall-clock limit as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// DNS publication settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Publish the selection to DNS
    #[serde(default)]
    pub update_dns: bool,

    /// Domain the records live under
    #[serde(default)]
    pub domain: String,

    /// Record name prefix (`{prefix}{N}.{domain}`)
    #[serde(default)]
    pub prefix: String,

    /// A or AAAA
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// TTL in seconds (1 = automatic)
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    #[serde(default)]
    pub proxied: bool,

    /// Delete indexed records beyond the selection size
    #[serde(default)]
    pub prune_excess: bool,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            update_dns: false,
            domain: String::new(),
            prefix: String::new(),
            record_type: default_record_type(),
            ttl: default_ttl(),
            proxied: false,
            prune_excess: false,
        }
    }
}

impl DnsConfig {
    /// Validate DNS settings
    pub fn validate(&self) -> Result<()> {
        normalize_record_type(&self.record_type)?;
        if !self.update_dns {
            return Ok(());
        }
        validate_domain(&self.domain)?;
        if self.prefix.is_empty() {
            return Err(Error::config("DNS prefix is required when DNS updates are enabled"));
        }
        if !self
            .prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::config(format!("Invalid DNS prefix: {}", self.prefix)));
        }
        Ok(())
    }

    /// Normalized record type
    pub fn record_type(&self) -> Result<&'static str> {
        normalize_record_type(&self.record_type)
    }

    /// Name used in only-one mode
    pub fn single_record_name(&self) -> String {
        format!("{}.{}", self.prefix, self.domain)
    }
}

/// Retry settings for transient provider failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause before the second attempt
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// Double the pause after each failed attempt
    #[serde(default)]
    pub exponential: bool,

    /// Upper bound on the pause when exponential
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
            exponential: false,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Validate retry settings
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("Retry attempts must be > 0"));
        }
        if self.exponential && self.max_delay_ms < self.delay_ms {
            return Err(Error::config("Maximum retry delay must be >= the initial delay"));
        }
        Ok(())
    }

    /// Build the retry policy
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        let backoff = if self.exponential {
            Backoff::Exponential {
                initial: delay,
                max: Duration::from_millis(self.max_delay_ms),
            }
        } else {
            Backoff::Fixed(delay)
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

/// Upper-case a record type, accepting only A and AAAA
pub fn normalize_record_type(record_type: &str) -> Result<&'static str> {
    match record_type.trim().to_ascii_uppercase().as_str() {
        "A" => Ok("A"),
        "AAAA" => Ok("AAAA"),
        other => Err(Error::config(format!(
            "Unsupported record type '{}', expected A or AAAA",
            other
        ))),
    }
}

/// Check a domain has at least two well-formed labels
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("Domain cannot be empty"));
    }
    if domain.len() > 253 {
        return Err(Error::config(format!("Domain too long: {}", domain)));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::config(format!(
            "Invalid domain '{}': expected at least two labels",
            domain
        )));
    }

    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::config(format!(
                "Invalid domain '{}': bad label '{}'",
                domain, label
            )));
        }
    }
    Ok(())
}

fn default_speed_threshold() -> f64 {
    2.0
}

fn default_speed_weight() -> f64 {
    crate::ranking::DEFAULT_SPEED_WEIGHT
}

fn default_latency_weight() -> f64 {
    crate::ranking::DEFAULT_LATENCY_WEIGHT
}

fn default_binary() -> PathBuf {
    PathBuf::from("cfst")
}

fn default_ip_file() -> PathBuf {
    PathBuf::from("ip.txt")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("result.csv")
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_result_age_hours() -> f64 {
    24.0
}

fn default_record_type() -> String {
    "A".to_string()
}

fn default_ttl() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_event_channel_capacity() -> usize {
    100
}
