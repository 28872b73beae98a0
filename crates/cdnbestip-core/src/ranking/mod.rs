//! Ranking engine
//!
//! Pure filtering, sorting and selection over [`ResultRecord`]s. Nothing here
//! performs I/O or mutates its input; every operation returns a new list.
//!
//! The standard rank is speed descending, then latency ascending. Records
//! that tie on both keep their input order (all sorts are stable).

mod policy;

pub use policy::{RankingMode, SelectionPolicy};

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::ResultRecord;

/// Default weight of the speed component in weighted scoring
pub const DEFAULT_SPEED_WEIGHT: f64 = 0.7;

/// Default weight of the latency component in weighted scoring
pub const DEFAULT_LATENCY_WEIGHT: f64 = 0.3;

/// Latency ceiling used to normalize the latency score component (ms)
const LATENCY_CEILING_MS: f64 = 1000.0;

fn rank_order(a: &ResultRecord, b: &ResultRecord) -> Ordering {
    b.speed
        .total_cmp(&a.speed)
        .then_with(|| a.latency.total_cmp(&b.latency))
}

/// Keep records with `speed >= threshold`
pub fn filter_by_speed(records: &[ResultRecord], threshold: f64) -> Vec<ResultRecord> {
    records
        .iter()
        .filter(|r| r.speed >= threshold)
        .cloned()
        .collect()
}

/// Keep records with `latency <= threshold`
pub fn filter_by_latency(records: &[ResultRecord], threshold: f64) -> Vec<ResultRecord> {
    records
        .iter()
        .filter(|r| r.latency <= threshold)
        .cloned()
        .collect()
}

/// Keep records whose region is listed; an empty list keeps everything
pub fn filter_by_region(records: &[ResultRecord], allowed_regions: &[String]) -> Vec<ResultRecord> {
    if allowed_regions.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| allowed_regions.iter().any(|region| *region == r.region))
        .cloned()
        .collect()
}

/// Sort by speed
///
/// Descending uses the standard rank (latency ascending breaks ties).
/// Ascending is a plain stable sort on speed.
pub fn sort_by_speed(records: &[ResultRecord], descending: bool) -> Vec<ResultRecord> {
    let mut sorted = records.to_vec();
    if descending {
        sorted.sort_by(rank_order);
    } else {
        sorted.sort_by(|a, b| a.speed.total_cmp(&b.speed));
    }
    sorted
}

/// `speed * speed_weight + ((1000 - latency) / 1000) * latency_weight`
pub fn get_weighted_score(record: &ResultRecord, speed_weight: f64, latency_weight: f64) -> f64 {
    let latency_score = (LATENCY_CEILING_MS - record.latency) / LATENCY_CEILING_MS;
    record.speed * speed_weight + latency_score * latency_weight
}

/// Keep at most `max_per_datacenter` best records per data center (0 = no cap)
pub fn diversify(records: &[ResultRecord], max_per_datacenter: usize) -> Vec<ResultRecord> {
    let mut groups: BTreeMap<&str, Vec<&ResultRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(&record.data_center).or_default().push(record);
    }

    let cap = if max_per_datacenter == 0 {
        usize::MAX
    } else {
        max_per_datacenter
    };

    let mut merged: Vec<ResultRecord> = groups
        .into_values()
        .flat_map(|mut group| {
            group.sort_by(|a, b| rank_order(a, b));
            group.into_iter().take(cap).cloned()
        })
        .collect();
    merged.sort_by(rank_order);
    merged
}

/// Aggregate statistics over a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_results: usize,
    pub results_above_threshold: usize,
    pub min_speed: f64,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub avg_latency: f64,
}

/// Threshold and quantity applied by the ranking operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingEngine {
    speed_threshold: f64,
    quantity: usize,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(2.0, 0)
    }
}

impl RankingEngine {
    /// Create an engine
    ///
    /// `quantity` of 0 means "no limit" when a call also passes a count of 0.
    pub fn new(speed_threshold: f64, quantity: usize) -> Self {
        Self {
            speed_threshold,
            quantity,
        }
    }

    /// Configured speed threshold (MB/s)
    pub fn speed_threshold(&self) -> f64 {
        self.speed_threshold
    }

    /// Configured quantity
    pub fn quantity(&self) -> usize {
        self.quantity
    }

    /// Result length for a requested `count`
    fn limit(&self, count: usize) -> usize {
        match (count, self.quantity) {
            (0, 0) => usize::MAX,
            (0, quantity) => quantity,
            (count, _) => count,
        }
    }

    /// Records at or above threshold, ranked and truncated
    pub fn get_top_results(&self, records: &[ResultRecord], count: usize) -> Vec<ResultRecord> {
        let mut ranked = filter_by_speed(records, self.speed_threshold);
        ranked.sort_by(rank_order);
        ranked.truncate(self.limit(count));
        ranked
    }

    /// IPs at or above threshold in rank order
    pub fn get_top_ips(&self, records: &[ResultRecord], count: usize) -> Vec<String> {
        self.get_top_results(records, count)
            .into_iter()
            .map(|r| r.ip)
            .collect()
    }

    /// Records at or above threshold ranked by weighted score
    pub fn get_top_results_weighted(
        &self,
        records: &[ResultRecord],
        count: usize,
        speed_weight: f64,
        latency_weight: f64,
    ) -> Vec<ResultRecord> {
        let mut scored: Vec<(f64, ResultRecord)> = filter_by_speed(records, self.speed_threshold)
            .into_iter()
            .map(|r| (get_weighted_score(&r, speed_weight, latency_weight), r))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| a.latency.total_cmp(&b.latency))
        });
        scored
            .into_iter()
            .take(self.limit(count))
            .map(|(_, r)| r)
            .collect()
    }

    /// IPs ranked by weighted score
    pub fn get_top_ips_weighted(
        &self,
        records: &[ResultRecord],
        count: usize,
        speed_weight: f64,
        latency_weight: f64,
    ) -> Vec<String> {
        self.get_top_results_weighted(records, count, speed_weight, latency_weight)
            .into_iter()
            .map(|r| r.ip)
            .collect()
    }

    /// IPs spread across data centers
    ///
    /// `count` of 0 returns every record that survives the per-data-center cap.
    pub fn get_diverse_ips(
        &self,
        records: &[ResultRecord],
        count: usize,
        max_per_datacenter: usize,
    ) -> Vec<String> {
        let candidates = filter_by_speed(records, self.speed_threshold);
        let limit = if count == 0 { usize::MAX } else { count };
        diversify(&candidates, max_per_datacenter)
            .into_iter()
            .take(limit)
            .map(|r| r.ip)
            .collect()
    }

    /// The single best IP at or above threshold
    pub fn get_best_ip(&self, records: &[ResultRecord]) -> Result<String> {
        if records.is_empty() {
            return Err(Error::NoResults);
        }
        self.get_top_ips(records, 1)
            .into_iter()
            .next()
            .ok_or(Error::NoResultsAboveThreshold {
                threshold: self.speed_threshold,
            })
    }

    /// Whether a DNS update is worthwhile for these results
    pub fn should_update_dns(&self, records: &[ResultRecord]) -> bool {
        records.iter().any(|r| r.speed >= self.speed_threshold)
    }

    /// Statistics over `records`; all zero for empty input
    pub fn get_performance_summary(&self, records: &[ResultRecord]) -> PerformanceSummary {
        if records.is_empty() {
            return PerformanceSummary::default();
        }

        let count = records.len() as f64;
        let speeds = records.iter().map(|r| r.speed);
        let latencies = records.iter().map(|r| r.latency);

        PerformanceSummary {
            total_results: records.len(),
            results_above_threshold: records
                .iter()
                .filter(|r| r.speed >= self.speed_threshold)
                .count(),
            min_speed: speeds.clone().fold(f64::INFINITY, f64::min),
            max_speed: speeds.clone().fold(f64::NEG_INFINITY, f64::max),
            avg_speed: speeds.sum::<f64>() / count,
            min_latency: latencies.clone().fold(f64::INFINITY, f64::min),
            max_latency: latencies.clone().fold(f64::NEG_INFINITY, f64::max),
            avg_latency: latencies.sum::<f64>() / count,
        }
    }
}
