//! Selection policy
//!
//! Composes the ranking operations into one selection in a fixed order:
//!
//! 1. filter: speed threshold, latency ceiling, region allow-list
//! 2. diversify: cap records per data center
//! 3. rank: standard or weighted
//! 4. truncate: quantity, then only-one keeps the head

use serde::{Deserialize, Serialize};

use super::{RankingEngine, diversify, filter_by_latency, filter_by_region};
use crate::config::SelectionConfig;
use crate::models::ResultRecord;

/// How candidates are ordered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RankingMode {
    /// Speed descending, latency ascending
    Speed,
    /// Weighted score descending
    Weighted {
        speed_weight: f64,
        latency_weight: f64,
    },
}

/// A complete selection policy
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    engine: RankingEngine,
    max_latency: Option<f64>,
    allowed_regions: Vec<String>,
    max_per_datacenter: Option<usize>,
    mode: RankingMode,
    only_one: bool,
}

impl SelectionPolicy {
    /// Build from configuration
    pub fn from_config(config: &SelectionConfig) -> Self {
        let mode = if config.weighted {
            RankingMode::Weighted {
                speed_weight: config.speed_weight,
                latency_weight: config.latency_weight,
            }
        } else {
            RankingMode::Speed
        };

        Self {
            engine: RankingEngine::new(config.speed_threshold, config.quantity),
            max_latency: config.max_latency,
            allowed_regions: config.allowed_regions.clone(),
            max_per_datacenter: config.max_per_datacenter,
            mode,
            only_one: config.only_one,
        }
    }

    /// The engine carrying threshold and quantity
    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    /// Whether selection keeps a single record
    pub fn only_one(&self) -> bool {
        self.only_one
    }

    /// Select records in rank order
    pub fn select(&self, records: &[ResultRecord]) -> Vec<ResultRecord> {
        let mut candidates = records.to_vec();
        if let Some(max_latency) = self.max_latency {
            candidates = filter_by_latency(&candidates, max_latency);
        }
        candidates = filter_by_region(&candidates, &self.allowed_regions);
        if let Some(per_dc) = self.max_per_datacenter {
            candidates = diversify(&candidates, per_dc);
        }

        // Ranking applies the speed threshold and quantity
        let mut selected = match self.mode {
            RankingMode::Speed => self.engine.get_top_results(&candidates, 0),
            RankingMode::Weighted {
                speed_weight,
                latency_weight,
            } => self
                .engine
                .get_top_results_weighted(&candidates, 0, speed_weight, latency_weight),
        };

        if self.only_one {
            selected.truncate(1);
        }
        selected
    }
}
