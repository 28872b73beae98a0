//! Zone resolution
//!
//! Maps a domain to the provider zone that contains it. The exact name is
//! tried first; on a miss the leftmost label is stripped and the parent is
//! tried, down to the two-label root. Zones are looked up on every call and
//! never cached here.

use std::sync::Arc;

use tracing::{debug, info};

use super::record::Zone;
use crate::config::validate_domain;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::traits::DnsClient;

/// Resolves domains to zones
pub struct ZoneResolver {
    client: Arc<dyn DnsClient>,
    retry: RetryPolicy,
}

impl ZoneResolver {
    pub fn new(client: Arc<dyn DnsClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Zone id for `domain`
    pub async fn resolve(&self, domain: &str) -> Result<String> {
        self.resolve_zone(domain).await.map(|zone| zone.id)
    }

    /// Zone for `domain`, falling back to parent domains
    ///
    /// Fails with `ZoneNotFound` when no level matches, `ZoneLookupFailed`
    /// when transient errors outlast the retry budget, and `Authentication`
    /// immediately on credential problems.
    pub async fn resolve_zone(&self, domain: &str) -> Result<Zone> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        validate_domain(&domain)?;

        let mut candidate = domain.as_str();
        loop {
            debug!("Looking up zone {}", candidate);
            if let Some(zone) = self.lookup(&domain, candidate).await? {
                info!("Resolved {} to zone {} ({})", domain, zone.name, zone.id);
                return Ok(zone);
            }

            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return Err(Error::ZoneNotFound(domain)),
            }
        }
    }

    async fn lookup(&self, domain: &str, candidate: &str) -> Result<Option<Zone>> {
        let zones = self
            .retry
            .run("zone lookup", || self.client.list_zones(Some(candidate)))
            .await;

        let zones = match zones {
            Ok(zones) => zones,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) if e.is_transient() => {
                return Err(Error::ZoneLookupFailed {
                    domain: domain.to_string(),
                    source: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        };

        Ok(zones
            .iter()
            .map(Zone::from_provider)
            .find(|zone| zone.name.eq_ignore_ascii_case(candidate) && !zone.id.is_empty()))
    }

    /// Fetch a zone by id
    pub async fn get_zone(&self, zone_id: &str) -> Result<Zone> {
        let value = self
            .retry
            .run("zone fetch", || self.client.get_zone(zone_id))
            .await?;
        let mut zone = Zone::from_provider(&value);
        if zone.id.is_empty() {
            zone.id = zone_id.to_string();
        }
        Ok(zone)
    }

    /// Every zone visible to the credentials
    pub async fn list_zones(&self) -> Result<Vec<Zone>> {
        let zones = self
            .retry
            .run("zone list", || self.client.list_zones(None))
            .await?;
        Ok(zones.iter().map(Zone::from_provider).collect())
    }
}
