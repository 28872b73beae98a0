// # DNS Entities
//
// `DnsRecord` and `Zone` are built from provider responses. Provider objects
// are not guaranteed to carry every attribute, so each field is read through
// an accessor that yields `None` for absent or null values and the
// constructor substitutes a documented default:
//
// | field       | default                      |
// |-------------|------------------------------|
// | id          | None                         |
// | zone_id     | caller-supplied zone id      |
// | zone_name   | None                         |
// | name        | ""                           |
// | content     | ""                           |
// | type        | "A"                          |
// | ttl         | 1 (automatic)                |
// | proxied     | false                        |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::RecordPayload;

/// Default record type
pub const DEFAULT_RECORD_TYPE: &str = "A";

/// TTL value meaning "automatic"
pub const AUTO_TTL: u32 = 1;

/// Read a field, treating null as absent
pub fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

/// Read a string field; numbers are rendered as strings
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    match field(value, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read an unsigned integer field; numeric strings are accepted
pub fn u32_field(value: &Value, key: &str) -> Option<u32> {
    match field(value, key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean field; "true"/"false" strings are accepted
pub fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match field(value, key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A provider-side name to content mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned id; absent for records not yet created
    pub id: Option<String>,
    pub zone_id: String,
    pub zone_name: Option<String>,
    /// Fully qualified name
    pub name: String,
    /// IP address or target
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl DnsRecord {
    /// A record that has not been sent to the provider yet
    pub fn new(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            zone_id: zone_id.into(),
            zone_name: None,
            name: name.into(),
            content: content.into(),
            record_type: DEFAULT_RECORD_TYPE.to_string(),
            ttl: AUTO_TTL,
            proxied: false,
        }
    }

    /// Build from a provider response object
    ///
    /// Never fails: absent attributes fall back to the defaults listed in
    /// the module docs, `zone_id` to `fallback_zone_id`.
    pub fn from_provider(value: &Value, fallback_zone_id: &str) -> Self {
        Self {
            id: string_field(value, "id"),
            zone_id: string_field(value, "zone_id").unwrap_or_else(|| fallback_zone_id.to_string()),
            zone_name: string_field(value, "zone_name"),
            name: string_field(value, "name").unwrap_or_default(),
            content: string_field(value, "content").unwrap_or_default(),
            record_type: string_field(value, "type")
                .unwrap_or_else(|| DEFAULT_RECORD_TYPE.to_string()),
            ttl: u32_field(value, "ttl").unwrap_or(AUTO_TTL),
            proxied: bool_field(value, "proxied").unwrap_or(false),
        }
    }

    /// Set the record type
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set proxying
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Request body for creating or replacing this record
    pub fn to_payload(&self) -> RecordPayload {
        RecordPayload {
            record_type: self.record_type.clone(),
            name: self.name.clone(),
            content: self.content.clone(),
            ttl: self.ttl,
            proxied: self.proxied,
        }
    }
}

/// Read-only view of a provider zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub status: String,
    pub paused: bool,
    #[serde(rename = "type")]
    pub zone_type: String,
}

impl Zone {
    /// Build from a provider response object; absent fields become empty/false
    pub fn from_provider(value: &Value) -> Self {
        Self {
            id: string_field(value, "id").unwrap_or_default(),
            name: string_field(value, "name").unwrap_or_default(),
            status: string_field(value, "status").unwrap_or_default(),
            paused: bool_field(value, "paused").unwrap_or(false),
            zone_type: string_field(value, "type").unwrap_or_default(),
        }
    }
}
