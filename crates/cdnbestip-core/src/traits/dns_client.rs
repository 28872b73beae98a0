// # DNS Client Trait
//
// The raw provider API the zone resolver and record reconciler drive:
// zone list/get and record list/create/update/delete, keyed by zone id and
// record id.
//
// ## Implementations
//
// - CloudFlare: `cdnbestip-provider-cloudflare` crate
//
// ## Response Objects
//
// Responses are returned as `serde_json::Value` exactly as the provider sent
// them. Attributes may be missing; the entity constructors in `crate::dns`
// read every field through a defaulting accessor instead of assuming a
// schema.
//
// ## Usage
//
// ```rust,ignore
// use cdnbestip_core::traits::{DnsClient, RecordQuery};
//
// let zones = client.list_zones(Some("example.com")).await?;
// let records = client
//     .list_records("zone-id", &RecordQuery::by_name("cf1.example.com", "A"))
//     .await?;
// ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Filter for record listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Exact record name
    pub name: Option<String>,
    /// Record type
    pub record_type: Option<String>,
}

impl RecordQuery {
    /// Every record in the zone
    pub fn all() -> Self {
        Self::default()
    }

    /// Records of one type
    pub fn by_type(record_type: impl Into<String>) -> Self {
        Self {
            name: None,
            record_type: Some(record_type.into()),
        }
    }

    /// Records with an exact name and type
    pub fn by_name(name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            record_type: Some(record_type.into()),
        }
    }
}

/// Body of a create or update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordPayload {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// Trait for DNS provider API clients
///
/// # Trust Level: Untrusted
///
/// Clients perform one API call per method and report failures through the
/// error taxonomy:
///
/// - authentication/permission → `Error::Authentication`
/// - missing zone or record → `Error::NotFound`
/// - throttling → `Error::RateLimited`
/// - provider 5xx → `Error::ProviderServer`
/// - malformed request → `Error::BadRequest`
///
/// Clients must not retry or sleep. Retries belong to the caller, which
/// wraps each call in a [`RetryPolicy`](crate::retry::RetryPolicy).
#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Check that the configured credentials are accepted
    async fn verify_credentials(&self) -> Result<()>;

    /// List zones, optionally restricted to an exact name
    async fn list_zones(&self, name: Option<&str>) -> Result<Vec<Value>>;

    /// Fetch one zone
    async fn get_zone(&self, zone_id: &str) -> Result<Value>;

    /// List records in a zone
    async fn list_records(&self, zone_id: &str, query: &RecordQuery) -> Result<Vec<Value>>;

    /// Create a record, returning the provider's view of it
    async fn create_record(&self, zone_id: &str, record: &RecordPayload) -> Result<Value>;

    /// Replace a record, returning the provider's view of it
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordPayload,
    ) -> Result<Value>;

    /// Delete a record
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
