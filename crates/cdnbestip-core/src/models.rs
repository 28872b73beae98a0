//! Measurement data produced by the speed test

use serde::{Deserialize, Serialize};

/// One measured edge IP
///
/// Built by the results parser from a single input row and never mutated
/// afterwards. Location labels may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// IP address as printed by the speed test
    pub ip: String,
    /// Port the measurement ran against
    pub port: u16,
    /// Data center code (e.g. "LAX")
    #[serde(default)]
    pub data_center: String,
    /// Region label
    #[serde(default)]
    pub region: String,
    /// City label
    #[serde(default)]
    pub city: String,
    /// Download speed in MB/s
    pub speed: f64,
    /// Average latency in ms
    pub latency: f64,
}

impl ResultRecord {
    /// Create a record with empty location labels
    pub fn new(ip: impl Into<String>, port: u16, speed: f64, latency: f64) -> Self {
        Self {
            ip: ip.into(),
            port,
            data_center: String::new(),
            region: String::new(),
            city: String::new(),
            speed,
            latency,
        }
    }

    /// Set data center, region and city
    pub fn with_location(
        mut self,
        data_center: impl Into<String>,
        region: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        self.data_center = data_center.into();
        self.region = region.into();
        self.city = city.into();
        self
    }

    /// Non-empty IP and non-negative measurements
    pub fn is_valid(&self) -> bool {
        !self.ip.trim().is_empty() && self.speed >= 0.0 && self.latency >= 0.0
    }
}
