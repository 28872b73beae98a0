// # Record Reconciler
//
// Makes provider records match a desired IP set.
//
// ## Operations
//
// - `upsert`: one named record, created or updated in place
// - `batch_upsert`: `{prefix}{i}.{domain}` for each IP, independently
// - `reconcile_by_prefix`: zip existing indexed records against the IP list
//   by position; update, create the surplus, delete the excess
// - `delete_by_prefix`: remove every indexed record
//
// ## Failure Handling
//
// Every provider call goes through the retry policy, so rate limits and 5xx
// responses are retried. In batch operations a failed item is logged and
// left out of the result while the remaining items proceed. An
// authentication failure ends the batch, since every later call would fail
// the same way. Operations run one at a time in ascending index order.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::naming::{indexed_name, prefix_index};
use super::record::{AUTO_TTL, DEFAULT_RECORD_TYPE, DnsRecord};
use super::zone::ZoneResolver;
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, aborts_batch};
use crate::traits::{DnsClient, RecordPayload, RecordQuery};

/// Optional overrides for an upsert
///
/// Unset fields use the reconciler defaults on create and keep the existing
/// record's values on update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    pub record_type: Option<String>,
    pub ttl: Option<u32>,
    pub proxied: Option<bool>,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = Some(proxied);
        self
    }
}

/// Values used when creating records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub record_type: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            record_type: DEFAULT_RECORD_TYPE.to_string(),
            ttl: AUTO_TTL,
            proxied: false,
        }
    }
}

/// Kind of provider write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A batch item that did not go through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOperation {
    pub operation: Operation,
    pub name: String,
    pub error: String,
}

/// Outcome of a prefix reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records now in place, in index order
    pub records: Vec<DnsRecord>,
    pub created: usize,
    pub updated: usize,
    /// Positions whose record already matched
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: Vec<FailedOperation>,
}

impl ReconcileReport {
    /// Whether every operation succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies desired record state through a [`DnsClient`]
pub struct Reconciler {
    client: Arc<dyn DnsClient>,
    zones: ZoneResolver,
    retry: RetryPolicy,
    defaults: RecordDefaults,
}

impl Reconciler {
    pub fn new(client: Arc<dyn DnsClient>, retry: RetryPolicy) -> Self {
        Self {
            zones: ZoneResolver::new(client.clone(), retry),
            client,
            retry,
            defaults: RecordDefaults::default(),
        }
    }

    /// Set the values used when creating records
    pub fn with_defaults(mut self, defaults: RecordDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Zone resolver sharing this reconciler's client and retry policy
    pub fn zones(&self) -> &ZoneResolver {
        &self.zones
    }

    /// Check credentials before starting work
    pub async fn verify_credentials(&self) -> Result<()> {
        self.retry
            .run("credential check", || self.client.verify_credentials())
            .await
            .map_err(|e| match e {
                Error::NotFound(msg) => Error::auth(msg),
                other => other,
            })
    }

    /// Create or update the record called `name`
    ///
    /// With several matches the first in provider order is updated. When
    /// the existing record already has the requested content, TTL and
    /// proxying, no write is made.
    pub async fn upsert(
        &self,
        zone_id: &str,
        name: &str,
        content: &str,
        options: &UpsertOptions,
    ) -> Result<DnsRecord> {
        let record_type = options
            .record_type
            .clone()
            .unwrap_or_else(|| self.defaults.record_type.clone());
        let query = RecordQuery::by_name(name, record_type.clone());

        let existing = self
            .retry
            .run("record list", || self.client.list_records(zone_id, &query))
            .await?;

        let Some(first) = existing.first() else {
            let payload = RecordPayload {
                record_type,
                name: name.to_string(),
                content: content.to_string(),
                ttl: options.ttl.unwrap_or(self.defaults.ttl),
                proxied: options.proxied.unwrap_or(self.defaults.proxied),
            };
            return self.create(zone_id, &payload).await;
        };

        if existing.len() > 1 {
            warn!(
                "{} records named {}, updating the first",
                existing.len(),
                name
            );
        }

        let current = DnsRecord::from_provider(first, zone_id);
        let payload = RecordPayload {
            record_type: current.record_type.clone(),
            name: if current.name.is_empty() {
                name.to_string()
            } else {
                current.name.clone()
            },
            content: content.to_string(),
            ttl: options.ttl.unwrap_or(current.ttl),
            proxied: options.proxied.unwrap_or(current.proxied),
        };

        if current.content == payload.content
            && current.ttl == payload.ttl
            && current.proxied == payload.proxied
        {
            debug!("{} already points to {}", name, content);
            return Ok(current);
        }

        self.update(zone_id, &current, &payload).await
    }

    async fn create(&self, zone_id: &str, payload: &RecordPayload) -> Result<DnsRecord> {
        let value = self
            .retry
            .run("record create", || self.client.create_record(zone_id, payload))
            .await?;
        let mut record = DnsRecord::from_provider(&value, zone_id);
        fill_from_payload(&mut record, payload);
        info!("Created {} -> {}", payload.name, payload.content);
        Ok(record)
    }

    async fn update(
        &self,
        zone_id: &str,
        current: &DnsRecord,
        payload: &RecordPayload,
    ) -> Result<DnsRecord> {
        let record_id = current.id.as_deref().ok_or_else(|| {
            Error::provider(
                self.client.provider_name(),
                format!("record {} has no id", current.name),
            )
        })?;
        let value = self
            .retry
            .run("record update", || {
                self.client.update_record(zone_id, record_id, payload)
            })
            .await?;
        let mut record = DnsRecord::from_provider(&value, zone_id);
        if record.id.is_none() {
            record.id = current.id.clone();
        }
        fill_from_payload(&mut record, payload);
        info!(
            "Updated {}: {} -> {}",
            payload.name, current.content, payload.content
        );
        Ok(record)
    }

    /// Delete one record by id
    pub async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.retry
            .run("record delete", || self.client.delete_record(zone_id, record_id))
            .await
    }

    async fn zone_domain(&self, zone_id: &str) -> Result<String> {
        let zone = self.zones.get_zone(zone_id).await?;
        if zone.name.is_empty() {
            return Err(Error::not_found(format!("zone {} has no name", zone_id)));
        }
        Ok(zone.name)
    }

    /// Upsert `{prefix}{i}.{domain}` for each IP, 1-based
    ///
    /// A failed index is logged and skipped; the result lists the successful
    /// records in index order and may be shorter than `ips`.
    pub async fn batch_upsert(
        &self,
        zone_id: &str,
        prefix: &str,
        ips: &[String],
        record_type: &str,
    ) -> Result<Vec<DnsRecord>> {
        let domain = self.zone_domain(zone_id).await?;
        let options = UpsertOptions::new().with_type(record_type);

        let mut records = Vec::with_capacity(ips.len());
        for (i, ip) in ips.iter().enumerate() {
            let name = indexed_name(prefix, i + 1, &domain);
            match self.upsert(zone_id, &name, ip, &options).await {
                Ok(record) => records.push(record),
                Err(e) if aborts_batch(&e) => {
                    error!("Aborting batch at {}: {}", name, e);
                    return Err(e);
                }
                Err(e) => error!("Failed to upsert {} -> {}: {}", name, ip, e),
            }
        }

        info!(
            "Batch upsert finished: {} succeeded, {} failed",
            records.len(),
            ips.len() - records.len()
        );
        Ok(records)
    }

    /// Existing `{prefix}{N}.{domain}` records sorted by N
    ///
    /// `record_type` of `None` matches every type.
    pub async fn list_by_prefix(
        &self,
        zone_id: &str,
        prefix: &str,
        record_type: Option<&str>,
    ) -> Result<Vec<(usize, DnsRecord)>> {
        let domain = self.zone_domain(zone_id).await?;
        self.list_indexed(zone_id, prefix, &domain, record_type).await
    }

    async fn list_indexed(
        &self,
        zone_id: &str,
        prefix: &str,
        domain: &str,
        record_type: Option<&str>,
    ) -> Result<Vec<(usize, DnsRecord)>> {
        let query = match record_type {
            Some(t) => RecordQuery::by_type(t),
            None => RecordQuery::all(),
        };

        let values = match self
            .retry
            .run("record list", || self.client.list_records(zone_id, &query))
            .await
        {
            Ok(values) => values,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut indexed: Vec<(usize, DnsRecord)> = values
            .iter()
            .map(|v| DnsRecord::from_provider(v, zone_id))
            .filter_map(|r| prefix_index(&r.name, prefix, domain).map(|n| (n, r)))
            .collect();
        indexed.sort_by_key(|(n, _)| *n);
        debug!("Found {} records matching {}N.{}", indexed.len(), prefix, domain);
        Ok(indexed)
    }

    /// Make the indexed records under `prefix` equal `ips`
    ///
    /// Existing records are paired with IPs by position after sorting on
    /// N. Paired records get the IP (and their canonical name); surplus IPs
    /// are created; surplus records are deleted.
    pub async fn reconcile_by_prefix(
        &self,
        zone_id: &str,
        prefix: &str,
        ips: &[String],
    ) -> Result<ReconcileReport> {
        let domain = self.zone_domain(zone_id).await?;
        let existing = self
            .list_indexed(zone_id, prefix, &domain, Some(&self.defaults.record_type))
            .await?;

        let mut report = ReconcileReport::default();
        let positions = existing.len().max(ips.len());
        for pos in 0..positions {
            let name = indexed_name(prefix, pos + 1, &domain);
            let current = existing.get(pos).map(|(_, record)| record);

            let (operation, result) = match (current, ips.get(pos)) {
                (Some(current), Some(ip)) => {
                    let payload = RecordPayload {
                        record_type: current.record_type.clone(),
                        name: name.clone(),
                        content: ip.clone(),
                        ttl: current.ttl,
                        proxied: current.proxied,
                    };
                    if current.content == *ip && current.name.eq_ignore_ascii_case(&name) {
                        report.unchanged += 1;
                        report.records.push(current.clone());
                        continue;
                    }
                    let result = self.update(zone_id, current, &payload).await.map(Some);
                    (Operation::Update, result)
                }
                (None, Some(ip)) => {
                    let payload = RecordPayload {
                        record_type: self.defaults.record_type.clone(),
                        name: name.clone(),
                        content: ip.clone(),
                        ttl: self.defaults.ttl,
                        proxied: self.defaults.proxied,
                    };
                    (Operation::Create, self.create(zone_id, &payload).await.map(Some))
                }
                (Some(current), None) => {
                    let result: Result<Option<DnsRecord>> = match current.id.as_deref() {
                        Some(id) => self.delete_record(zone_id, id).await.map(|_| None),
                        None => Err(Error::provider(
                            self.client.provider_name(),
                            format!("record {} has no id", current.name),
                        )),
                    };
                    if result.is_ok() {
                        info!("Deleted {}", current.name);
                    }
                    (Operation::Delete, result)
                }
                (None, None) => continue,
            };

            match result {
                Ok(Some(record)) => {
                    match operation {
                        Operation::Create => report.created += 1,
                        _ => report.updated += 1,
                    }
                    report.records.push(record);
                }
                Ok(None) => report.deleted += 1,
                Err(e) if aborts_batch(&e) => {
                    error!("Aborting reconciliation at {}: {}", name, e);
                    return Err(e);
                }
                Err(e) => {
                    let target = current.map_or(name.as_str(), |r| r.name.as_str());
                    error!("Failed to {:?} {}: {}", operation, target, e);
                    report.failed.push(FailedOperation {
                        operation,
                        name: target.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Reconciled {}N.{}: {} created, {} updated, {} unchanged, {} deleted, {} failed",
            prefix,
            domain,
            report.created,
            report.updated,
            report.unchanged,
            report.deleted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Delete every `{prefix}{N}.{domain}` record of any type
    ///
    /// Returns the number deleted; individual failures are logged and not
    /// counted.
    pub async fn delete_by_prefix(&self, zone_id: &str, prefix: &str) -> Result<usize> {
        let matches = self.list_by_prefix(zone_id, prefix, None).await?;

        let mut deleted = 0;
        for (_, record) in &matches {
            let Some(id) = record.id.as_deref() else {
                warn!("Skipping {}: no record id", record.name);
                continue;
            };
            match self.delete_record(zone_id, id).await {
                Ok(()) => {
                    info!("Deleted {}", record.name);
                    deleted += 1;
                }
                Err(e) if aborts_batch(&e) => return Err(e),
                Err(e) => error!("Failed to delete {}: {}", record.name, e),
            }
        }

        info!("Deleted {}/{} records with prefix {}", deleted, matches.len(), prefix);
        Ok(deleted)
    }
}

/// Fill fields the provider response left out with what was sent
fn fill_from_payload(record: &mut DnsRecord, payload: &RecordPayload) {
    if record.name.is_empty() {
        record.name = payload.name.clone();
    }
    if record.content.is_empty() {
        record.content = payload.content.clone();
    }
}
