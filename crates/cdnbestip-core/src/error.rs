//! Error types for CDNBestIP
//!
//! Every fault carries a human-readable message. Callers that want to give
//! the user guidance use [`Error::suggestion`]; the retry combinator and the
//! reconciler use [`Error::is_transient`] and [`Error::is_authentication`] to
//! decide between retrying, skipping and stopping.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for CDNBestIP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Bad configuration or input, rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// The results file does not exist
    #[error("Results file not found: {}", .0.display())]
    ResultsFileNotFound(PathBuf),

    /// The results file has no data rows
    #[error("Results file is empty: {0}")]
    ResultsEmpty(String),

    /// Ranking was asked to pick from nothing
    #[error("No results available")]
    NoResults,

    /// Every record fell below the speed threshold
    #[error("No results meet speed threshold {threshold} MB/s")]
    NoResultsAboveThreshold {
        /// Configured threshold in MB/s
        threshold: f64,
    },

    /// Not authenticated or insufficient permissions
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No zone matches the domain or any of its parents
    #[error("Zone not found for domain: {0}")]
    ZoneNotFound(String),

    /// Zone lookup kept failing with transient errors
    #[error("Zone lookup failed for {domain}: {source}")]
    ZoneLookupFailed {
        /// Domain being resolved
        domain: String,
        /// Last underlying error
        #[source]
        source: Box<Error>,
    },

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider rate limit hit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider returned a 5xx
    #[error("Provider server error ({status}): {message}")]
    ProviderServer {
        /// HTTP status code
        status: u16,
        /// Provider error payload
        message: String,
    },

    /// Provider rejected the request as malformed
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// I/O errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The speed test did not finish in time and was killed
    #[error("Speed test timed out after {secs} seconds")]
    SpeedTestTimeout {
        /// Configured timeout
        secs: u64,
    },

    /// The speed test exited with a non-zero code
    #[error("Speed test failed with return code {exit_code}: {stderr}")]
    SpeedTestFailed {
        /// Process exit code (-1 when killed by a signal)
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The speed test binary could not be started
    #[error("Speed test binary not found: {}", .0.display())]
    SpeedTestBinaryNotFound(PathBuf),

    /// The candidate IP list does not exist
    #[error("IP file not found: {}", .0.display())]
    IpFileNotFound(PathBuf),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a provider 5xx error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::ProviderServer {
            status,
            message: message.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if attempted again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ProviderServer { .. } | Self::Network(_) | Self::Http(_)
        )
    }

    /// Whether this is an authentication or permission failure
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Whether this is a zone or record absence
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ZoneNotFound(_))
    }

    /// Raw provider payload, for verbose output
    pub fn provider_payload(&self) -> Option<&str> {
        match self {
            Self::Authentication(msg)
            | Self::NotFound(msg)
            | Self::RateLimited(msg)
            | Self::BadRequest(msg) => Some(msg),
            Self::ProviderServer { message, .. } | Self::Provider { message, .. } => Some(message),
            Self::ZoneLookupFailed { source, .. } => source.provider_payload(),
            _ => None,
        }
    }

    /// Actionable hint for the user, if one applies
    pub fn suggestion(&self) -> Option<String> {
        let hint = match self {
            Self::Authentication(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("expired") {
                    "Your API token has expired. Generate a new token at \
                     https://dash.cloudflare.com/profile/api-tokens"
                } else if lower.contains("permission") || lower.contains("forbidden") {
                    "Make sure the API token has Zone:Edit and DNS:Edit permissions"
                } else {
                    "Check your API token (https://dash.cloudflare.com/profile/api-tokens) \
                     or your API key and email"
                }
            }
            Self::ZoneNotFound(_) => {
                "Make sure the domain is added to your CloudFlare account and the \
                 credentials can access it"
            }
            Self::ZoneLookupFailed { .. } | Self::RateLimited(_) | Self::ProviderServer { .. } => {
                "The DNS provider is unavailable or throttling requests; try again in a few minutes"
            }
            Self::BadRequest(_) => "Check the record name and content; the provider rejected them",
            Self::SpeedTestTimeout { .. } => {
                "Try reducing the number of IPs to test or increase the speed test timeout"
            }
            Self::SpeedTestFailed { exit_code: 1, .. } => "Check the IP file format",
            Self::SpeedTestFailed { exit_code: 2, .. } => "Check network connectivity",
            Self::SpeedTestFailed { .. } => "Check the speed test binary and its arguments",
            Self::SpeedTestBinaryNotFound(_) => {
                "Check the speed test binary path and that the file is executable"
            }
            Self::IpFileNotFound(_) => "Check the IP file path or download the IP list first",
            Self::ResultsEmpty(_) => "Run the speed test again with refresh enabled",
            Self::ResultsFileNotFound(_) => "Run the speed test first to produce a results file",
            Self::NoResultsAboveThreshold { .. } => "Lower the speed threshold",
            _ => return None,
        };
        Some(hint.to_string())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
