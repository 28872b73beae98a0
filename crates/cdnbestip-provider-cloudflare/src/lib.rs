// # CloudFlare DNS Client
//
// [`DnsClient`] over the CloudFlare API v4.
//
// ## Behavior
//
// - One logical API call per trait method; list calls follow pagination
// - HTTP timeout of 30 seconds
// - Status codes are mapped onto the core error taxonomy (401/403, 404,
//   429, 5xx, 400)
// - No retry, backoff or sleeping here. The reconciler owns retries.
//
// ## Credentials
//
// Either an API token (sent as a bearer token) or the legacy global API key
// together with the account email. The secret never appears in logs or in
// `Debug` output.
//
// ## API Reference
//
// - Verify token: GET `/user/tokens/verify`
// - List zones: GET `/zones?name=...`
// - Get zone: GET `/zones/:zone_id`
// - List records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create record: POST `/zones/:zone_id/dns_records`
// - Update record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use cdnbestip_core::traits::{DnsClient, RecordPayload, RecordQuery};
use cdnbestip_core::{Error, Result};
use serde_json::Value;
use std::time::Duration;

/// CloudFlare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list calls
const PER_PAGE: u32 = 100;

/// CloudFlare error codes that mean the credentials were rejected
const AUTH_ERROR_CODES: &[i64] = &[9103, 9106, 9109, 10000];

/// How requests are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Scoped API token
    Token(String),
    /// Global API key and account email
    ApiKey { key: String, email: String },
}

impl Credentials {
    /// Prefer a token; fall back to key and email
    pub fn from_parts(
        token: Option<String>,
        key: Option<String>,
        email: Option<String>,
    ) -> Result<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (non_empty(token), non_empty(key), non_empty(email)) {
            (Some(token), _, _) => Ok(Self::Token(token)),
            (None, Some(key), Some(email)) => Ok(Self::ApiKey { key, email }),
            (None, Some(_), None) => Err(Error::config(
                "CloudFlare API key requires the account email",
            )),
            _ => Err(Error::config(
                "CloudFlare credentials missing: set an API token, or an API key and email",
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "api-token",
            Self::ApiKey { .. } => "api-key",
        }
    }
}

// Hide secrets
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"<REDACTED>").finish(),
            Self::ApiKey { email, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"<REDACTED>")
                .field("email", email)
                .finish(),
        }
    }
}

/// CloudFlare API client
///
/// # Trust Level: Untrusted
///
/// Stateless apart from the HTTP connection pool. Every failure is returned
/// to the caller.
pub struct CloudflareClient {
    credentials: Credentials,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client against the public API
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_base_url(credentials, CLOUDFLARE_API_BASE)
    }

    /// Create a client against another API root
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Token-authenticated client
    pub fn with_token(token: impl Into<String>) -> Result<Self> {
        Self::new(Credentials::from_parts(Some(token.into()), None, None)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header("Content-Type", "application/json");
        match &self.credentials {
            Credentials::Token(token) => builder.bearer_auth(token),
            Credentials::ApiKey { key, email } => builder
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    /// Send a request and unwrap the response envelope
    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: HTTP request failed: {}", what, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read response: {}", what, e)))?;

        tracing::debug!("{} -> HTTP {}", what, status);
        parse_envelope(status, &body, what)
    }

    /// GET every page of a list endpoint
    async fn get_all(&self, path: &str, params: &[(&str, String)], what: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", PER_PAGE.to_string()));

            let envelope = self
                .send(self.request(reqwest::Method::GET, path).query(&query), what)
                .await?;
            let batch = envelope["result"]
                .as_array()
                .cloned()
                .ok_or_else(|| Error::provider("cloudflare", format!("{}: result is not an array", what)))?;
            let fetched = batch.len();
            items.extend(batch);

            let total_pages = envelope["result_info"]["total_pages"].as_u64().unwrap_or(1);
            if u64::from(page) >= total_pages || fetched == 0 {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Map an HTTP status and body onto a result
///
/// A 2xx response must carry `"success": true`; its `result` is returned.
fn parse_envelope(status: u16, body: &str, what: &str) -> Result<Value> {
    let json: Option<Value> = serde_json::from_str(body).ok();
    let message = json
        .as_ref()
        .and_then(first_error_message)
        .unwrap_or_else(|| truncate(body, 200));

    if (200..300).contains(&status) {
        let json = json.ok_or_else(|| {
            Error::provider("cloudflare", format!("{}: response is not JSON", what))
        })?;
        if json["success"].as_bool() == Some(false) {
            return Err(classify(400, &json, format!("{}: {}", what, message)));
        }
        return Ok(json);
    }

    let json = json.unwrap_or(Value::Null);
    Err(classify(status, &json, format!("{}: {}", what, message)))
}

fn classify(status: u16, json: &Value, message: String) -> Error {
    let auth_code = json["errors"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| e["code"].as_i64())
        .any(|code| AUTH_ERROR_CODES.contains(&code));

    match status {
        401 | 403 => Error::auth(message),
        _ if auth_code => Error::auth(message),
        404 => Error::not_found(message),
        429 => Error::rate_limited(message),
        500..=599 => Error::server(status, message),
        400 => Error::bad_request(message),
        _ => Error::provider("cloudflare", format!("HTTP {}: {}", status, message)),
    }
}

fn first_error_message(json: &Value) -> Option<String> {
    let error = json["errors"].as_array()?.first()?;
    let message = error["message"].as_str()?;
    Some(match error["code"].as_i64() {
        Some(code) => format!("{} (code {})", message, code),
        None => message.to_string(),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn record_params(query: &RecordQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(name) = &query.name {
        params.push(("name", name.clone()));
    }
    if let Some(record_type) = &query.record_type {
        params.push(("type", record_type.clone()));
    }
    params
}

#[async_trait]
impl DnsClient for CloudflareClient {
    async fn verify_credentials(&self) -> Result<()> {
        tracing::debug!("Verifying CloudFlare credentials ({})", self.credentials.kind());
        let builder = match self.credentials {
            Credentials::Token(_) => self.request(reqwest::Method::GET, "/user/tokens/verify"),
            // Global keys cannot use the token endpoint
            Credentials::ApiKey { .. } => self
                .request(reqwest::Method::GET, "/zones")
                .query(&[("per_page", "1")]),
        };

        match self.send(builder, "credential check").await {
            Ok(envelope) => {
                if let Some(status) = envelope["result"]["status"].as_str() {
                    if status != "active" {
                        return Err(Error::auth(format!("API token is {}", status)));
                    }
                }
                Ok(())
            }
            Err(Error::NotFound(msg)) | Err(Error::BadRequest(msg)) => Err(Error::auth(msg)),
            Err(e) => Err(e),
        }
    }

    async fn list_zones(&self, name: Option<&str>) -> Result<Vec<Value>> {
        let params: Vec<(&str, String)> = name
            .map(|n| vec![("name", n.to_string())])
            .unwrap_or_default();
        self.get_all("/zones", &params, "zone list").await
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Value> {
        let envelope = self
            .send(
                self.request(reqwest::Method::GET, &format!("/zones/{}", zone_id)),
                "zone fetch",
            )
            .await?;
        Ok(envelope["result"].clone())
    }

    async fn list_records(&self, zone_id: &str, query: &RecordQuery) -> Result<Vec<Value>> {
        self.get_all(
            &format!("/zones/{}/dns_records", zone_id),
            &record_params(query),
            "record list",
        )
        .await
    }

    async fn create_record(&self, zone_id: &str, record: &RecordPayload) -> Result<Value> {
        let envelope = self
            .send(
                self.request(reqwest::Method::POST, &format!("/zones/{}/dns_records", zone_id))
                    .json(record),
                "record create",
            )
            .await?;
        Ok(envelope["result"].clone())
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordPayload,
    ) -> Result<Value> {
        let envelope = self
            .send(
                self.request(
                    reqwest::Method::PUT,
                    &format!("/zones/{}/dns_records/{}", zone_id, record_id),
                )
                .json(record),
                "record update",
            )
            .await?;
        Ok(envelope["result"].clone())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.send(
            self.request(
                reqwest::Method::DELETE,
                &format!("/zones/{}/dns_records/{}", zone_id, record_id),
            ),
            "record delete",
        )
        .await
        .map(|_| ())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}
