//! Workflow orchestrator
//!
//! Runs one pass of the pipeline:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌────────┐   ┌───────────┐   ┌────────────┐
//! │ IpSource │──►│ SpeedTester │──►│ parser │──►│ selection │──►│ Reconciler │
//! └──────────┘   └─────────────┘   └────────┘   └───────────┘   └────────────┘
//!                       │                                              │
//!                       └──────────── WorkflowEvent channel ◄──────────┘
//! ```
//!
//! ## Steps
//!
//! 1. Validate configuration (no I/O before this passes)
//! 2. Reuse a fresh results file, or prepare the IP file and run the speed test
//! 3. Parse and validate results, apply the selection policy
//! 4. Publish to DNS when enabled: verify credentials, resolve the zone, then
//!    upsert (only-one), reconcile (prune excess) or batch upsert
//! 5. Log the summary and return a [`WorkflowReport`]
//!
//! Steps run sequentially. There is no cancellation inside a run; callers
//! that need a deadline wrap [`Workflow::execute`] in `tokio::time::timeout`.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::CdnBestIpConfig;
use crate::dns::{DnsRecord, Reconciler, RecordDefaults, UpsertOptions};
use crate::error::{Error, Result};
use crate::models::ResultRecord;
use crate::ranking::{PerformanceSummary, SelectionPolicy};
use crate::results::{self, files};
use crate::traits::{DnsClient, IpSource, SpeedTester};

/// Events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// Run started
    Started,

    /// A fresh results file is reused instead of re-measuring
    SpeedTestSkipped { results_file: PathBuf },

    /// Speed test started
    SpeedTestStarted { ip_file: PathBuf },

    /// Speed test wrote its results
    SpeedTestFinished { results_file: PathBuf },

    /// Results parsed and validated
    ResultsParsed { total: usize, valid: usize },

    /// Selection finished
    Selected { ips: Vec<String> },

    /// DNS publication started
    DnsUpdateStarted { zone_id: String, records: usize },

    /// DNS publication finished
    DnsUpdated { succeeded: usize, failed: usize },

    /// DNS publication skipped
    DnsSkipped { reason: String },

    /// Run finished
    Finished { selected: usize },

    /// Run failed
    Failed { error: String },
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    /// Results file the selection came from
    pub results_file: PathBuf,
    /// Whether an existing results file was reused
    pub reused_results: bool,
    /// Statistics over all valid results
    pub summary: PerformanceSummary,
    /// Selected records in rank order
    pub selected: Vec<ResultRecord>,
    /// Zone the records were written to
    pub zone_id: Option<String>,
    /// Records written or confirmed
    pub dns_records: Vec<DnsRecord>,
    /// DNS operations that failed
    pub dns_failures: usize,
}

impl WorkflowReport {
    /// Selected IPs in rank order
    pub fn selected_ips(&self) -> Vec<String> {
        self.selected.iter().map(|r| r.ip.clone()).collect()
    }
}

/// One-shot pipeline runner
pub struct Workflow {
    config: CdnBestIpConfig,
    policy: SelectionPolicy,
    ip_source: Box<dyn IpSource>,
    speed_tester: Box<dyn SpeedTester>,
    dns_client: Option<Arc<dyn DnsClient>>,
    event_tx: mpsc::Sender<WorkflowEvent>,
}

impl Workflow {
    /// Create a workflow
    ///
    /// Validates the configuration before anything else. Returns the
    /// workflow and the receiving end of its event channel.
    pub fn new(
        config: CdnBestIpConfig,
        ip_source: Box<dyn IpSource>,
        speed_tester: Box<dyn SpeedTester>,
        dns_client: Option<Arc<dyn DnsClient>>,
    ) -> Result<(Self, mpsc::Receiver<WorkflowEvent>)> {
        config.validate()?;
        if config.dns.update_dns && dns_client.is_none() {
            return Err(Error::config(
                "DNS updates are enabled but no DNS client is configured",
            ));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let workflow = Self {
            policy: SelectionPolicy::from_config(&config.selection),
            config,
            ip_source,
            speed_tester,
            dns_client,
            event_tx: tx,
        };
        Ok((workflow, rx))
    }

    /// Run the pipeline once
    pub async fn execute(&self) -> Result<WorkflowReport> {
        self.emit_event(WorkflowEvent::Started);
        match self.execute_inner().await {
            Ok(report) => {
                self.emit_event(WorkflowEvent::Finished {
                    selected: report.selected.len(),
                });
                Ok(report)
            }
            Err(e) => {
                error!("Workflow failed: {}", e);
                if let Some(hint) = e.suggestion() {
                    info!("Suggestion: {}", hint);
                }
                self.emit_event(WorkflowEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute_inner(&self) -> Result<WorkflowReport> {
        let (results_file, reused_results) = self.obtain_results().await?;

        let parsed = results::parse_file(&results_file).await?;
        let total = parsed.len();
        let valid = results::validate_results(parsed);
        self.emit_event(WorkflowEvent::ResultsParsed {
            total,
            valid: valid.len(),
        });

        let summary = self.policy.engine().get_performance_summary(&valid);
        let selected = self.policy.select(&valid);
        let ips: Vec<String> = selected.iter().map(|r| r.ip.clone()).collect();
        self.emit_event(WorkflowEvent::Selected { ips: ips.clone() });

        let mut report = WorkflowReport {
            results_file,
            reused_results,
            summary,
            selected,
            zone_id: None,
            dns_records: Vec::new(),
            dns_failures: 0,
        };

        if !self.config.dns.update_dns {
            self.emit_event(WorkflowEvent::DnsSkipped {
                reason: "DNS updates disabled".to_string(),
            });
        } else if ips.is_empty() {
            warn!("No results met the performance criteria, DNS left unchanged");
            self.emit_event(WorkflowEvent::DnsSkipped {
                reason: "no results met the performance criteria".to_string(),
            });
        } else {
            self.publish(&ips, &mut report).await?;
        }

        self.log_summary(&report);
        Ok(report)
    }

    /// Results file to read, and whether it was reused
    async fn obtain_results(&self) -> Result<(PathBuf, bool)> {
        let settings = &self.config.speed_test;
        let output = settings.output_file.clone();

        if !settings.refresh
            && !files::should_refresh_results(&output, settings.max_result_age_hours).await
            && files::is_results_file_valid(&output).await
        {
            info!("Using existing results file {}", output.display());
            self.emit_event(WorkflowEvent::SpeedTestSkipped {
                results_file: output.clone(),
            });
            return Ok((output, true));
        }

        let ip_file = self.ip_source.prepare().await?;
        debug!(
            "IP list from {} at {}",
            self.ip_source.source_name(),
            ip_file.display()
        );

        info!("Running speed test ({})", self.speed_tester.name());
        self.emit_event(WorkflowEvent::SpeedTestStarted {
            ip_file: ip_file.clone(),
        });
        let results_file = self.speed_tester.run(&ip_file, &output).await?;
        self.emit_event(WorkflowEvent::SpeedTestFinished {
            results_file: results_file.clone(),
        });
        Ok((results_file, false))
    }

    async fn publish(&self, ips: &[String], report: &mut WorkflowReport) -> Result<()> {
        let client = self
            .dns_client
            .clone()
            .ok_or_else(|| Error::config("No DNS client configured"))?;
        let dns = &self.config.dns;
        let record_type = dns.record_type()?;

        let reconciler = Reconciler::new(client, self.config.retry.policy()).with_defaults(
            RecordDefaults {
                record_type: record_type.to_string(),
                ttl: dns.ttl,
                proxied: dns.proxied,
            },
        );

        reconciler.verify_credentials().await?;
        let zone_id = reconciler.zones().resolve(&dns.domain).await?;
        self.emit_event(WorkflowEvent::DnsUpdateStarted {
            zone_id: zone_id.clone(),
            records: ips.len(),
        });

        let (records, failed) = if self.policy.only_one() {
            let options = UpsertOptions::new()
                .with_type(record_type)
                .with_ttl(dns.ttl)
                .with_proxied(dns.proxied);
            let record = reconciler
                .upsert(&zone_id, &dns.single_record_name(), &ips[0], &options)
                .await?;
            (vec![record], 0)
        } else if dns.prune_excess {
            let outcome = reconciler
                .reconcile_by_prefix(&zone_id, &dns.prefix, ips)
                .await?;
            let failed = outcome.failed.len();
            (outcome.records, failed)
        } else {
            let records = reconciler
                .batch_upsert(&zone_id, &dns.prefix, ips, record_type)
                .await?;
            let failed = ips.len() - records.len();
            (records, failed)
        };

        self.emit_event(WorkflowEvent::DnsUpdated {
            succeeded: records.len(),
            failed,
        });
        report.zone_id = Some(zone_id);
        report.dns_records = records;
        report.dns_failures = failed;
        Ok(())
    }

    fn log_summary(&self, report: &WorkflowReport) {
        let s = &report.summary;
        info!("WORKFLOW SUMMARY");
        info!(
            "Performance Results: {} tested, {} above {} MB/s",
            s.total_results,
            s.results_above_threshold,
            self.policy.engine().speed_threshold()
        );
        info!(
            "Speed: min {:.2} / avg {:.2} / max {:.2} MB/s, latency: min {:.2} / avg {:.2} / max {:.2} ms",
            s.min_speed, s.avg_speed, s.max_speed, s.min_latency, s.avg_latency, s.max_latency
        );
        match report.selected.first() {
            Some(best) => info!(
                "Best Result: {} ({}) {:.2} MB/s, {:.2} ms",
                best.ip, best.data_center, best.speed, best.latency
            ),
            None => info!("No results met the performance criteria"),
        }
        if report.zone_id.is_some() {
            info!(
                "DNS: {} records written, {} failed",
                report.dns_records.len(),
                report.dns_failures
            );
        }
    }

    fn emit_event(&self, event: WorkflowEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
