// # cdnbestip-core
//
// Core library for picking the fastest CDN edge IPs and publishing them as
// DNS records.
//
// ## Architecture Overview
//
// - **Results parser**: speed test output (several layouts) to `ResultRecord`s
// - **Ranking**: threshold, latency, region, diversity and weighted selection
// - **DNS**: record entity, zone resolution, and the record reconciler
// - **Retry**: bounded retry for transient provider failures
// - **Workflow**: IP list → speed test → selection → DNS, as one pass
//
// ## External Collaborators
//
// The speed test binary, the DNS provider API and the IP list are reached
// through the traits in [`traits`], so each can be swapped or mocked:
// - **SpeedTester**: `cdnbestip-speedtest` crate
// - **DnsClient**: `cdnbestip-provider-cloudflare` crate
// - **IpSource**: [`traits::LocalIpFile`]

pub mod config;
pub mod dns;
pub mod error;
pub mod models;
pub mod ranking;
pub mod results;
pub mod retry;
pub mod traits;
pub mod workflow;

// Re-export core types for convenience
pub use config::{CdnBestIpConfig, DnsConfig, RetryConfig, SelectionConfig, SpeedTestConfig};
pub use dns::{DnsRecord, ReconcileReport, Reconciler, UpsertOptions, Zone, ZoneResolver};
pub use error::{Error, Result};
pub use models::ResultRecord;
pub use ranking::{PerformanceSummary, RankingEngine, SelectionPolicy};
pub use retry::{Backoff, RetryPolicy};
pub use traits::{DnsClient, IpSource, SpeedTester};
pub use workflow::{Workflow, WorkflowEvent, WorkflowReport};
