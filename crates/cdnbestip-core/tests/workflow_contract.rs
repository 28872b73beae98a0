//! Contract Test: Workflow Pipeline
//!
//! Constraints verified:
//! - Configuration is validated before any I/O
//! - A fresh results file is reused unless a refresh is forced
//! - Events arrive in pipeline order
//! - DNS publication follows the selected mode (batch, only-one, prune)
//! - An empty selection leaves DNS untouched and is not an error

mod common;

use cdnbestip_core::config::CdnBestIpConfig;
use cdnbestip_core::error::Error;
use cdnbestip_core::traits::{DnsClient, LocalIpFile};
use cdnbestip_core::workflow::{Workflow, WorkflowEvent};
use common::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

struct Fixture {
    dir: TempDir,
    config: CdnBestIpConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ip_file = dir.path().join("ip.txt");
        std::fs::write(&ip_file, "1.1.1.0/24\n1.0.0.0/24\n").unwrap();

        let mut config = CdnBestIpConfig::new();
        config.speed_test.ip_file = ip_file;
        config.speed_test.output_file = dir.path().join("result.csv");
        Self { dir, config }
    }

    fn with_dns(mut self) -> Self {
        self.config.dns.update_dns = true;
        self.config.dns.domain = "example.com".to_string();
        self.config.dns.prefix = "cf".to_string();
        self
    }

    fn output(&self) -> PathBuf {
        self.config.speed_test.output_file.clone()
    }

    fn ip_source(&self) -> Box<LocalIpFile> {
        Box::new(LocalIpFile::new(&self.config.speed_test.ip_file))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

async fn drain(rx: mpsc::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    ReceiverStream::new(rx).collect().await
}

fn writer() -> ScriptedSpeedTester {
    ScriptedSpeedTester::new(SpeedTestScript::Write(SAMPLE_RESULTS.to_string()))
}

#[tokio::test]
async fn measures_and_selects_without_dns() {
    let fixture = Fixture::new();
    let tester = writer();
    let (workflow, rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(ScriptedSpeedTester::sharing_counters_with(&tester)),
        None,
    )
    .unwrap();

    let report = workflow.execute().await.unwrap();
    drop(workflow);

    assert_eq!(report.selected_ips(), vec!["1.1.1.1", "1.0.0.1"]);
    assert!(!report.reused_results);
    assert_eq!(report.summary.total_results, 3);
    assert_eq!(report.summary.results_above_threshold, 2);
    assert_eq!(tester.run_count(), 1);
    assert_eq!(tester.seen_ip_files(), vec![fixture.config.speed_test.ip_file.clone()]);

    let events = drain(rx).await;
    assert_eq!(
        events,
        vec![
            WorkflowEvent::Started,
            WorkflowEvent::SpeedTestStarted {
                ip_file: fixture.config.speed_test.ip_file.clone()
            },
            WorkflowEvent::SpeedTestFinished {
                results_file: fixture.output()
            },
            WorkflowEvent::ResultsParsed { total: 3, valid: 3 },
            WorkflowEvent::Selected {
                ips: ips(&["1.1.1.1", "1.0.0.1"])
            },
            WorkflowEvent::DnsSkipped {
                reason: "DNS updates disabled".to_string()
            },
            WorkflowEvent::Finished { selected: 2 },
        ]
    );
}

#[tokio::test]
async fn fresh_results_file_is_reused() {
    let mut fixture = Fixture::new();
    tokio::fs::write(fixture.output(), SAMPLE_RESULTS).await.unwrap();
    // a missing IP list proves the source was never prepared
    fixture.config.speed_test.ip_file = fixture.path("missing.txt");
    let tester = writer();

    let (workflow, rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(ScriptedSpeedTester::sharing_counters_with(&tester)),
        None,
    )
    .unwrap();
    let report = workflow.execute().await.unwrap();
    drop(workflow);

    assert!(report.reused_results);
    assert_eq!(tester.run_count(), 0);
    let events = drain(rx).await;
    assert_eq!(
        events[1],
        WorkflowEvent::SpeedTestSkipped {
            results_file: fixture.output()
        }
    );
}

#[tokio::test]
async fn refresh_forces_a_new_measurement() {
    let mut fixture = Fixture::new();
    tokio::fs::write(fixture.output(), SAMPLE_RESULTS).await.unwrap();
    fixture.config.speed_test.refresh = true;
    let tester = writer();

    let (workflow, _rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(ScriptedSpeedTester::sharing_counters_with(&tester)),
        None,
    )
    .unwrap();
    let report = workflow.execute().await.unwrap();

    assert!(!report.reused_results);
    assert_eq!(tester.run_count(), 1);
}

#[tokio::test]
async fn batch_mode_publishes_indexed_records() {
    let fixture = Fixture::new().with_dns();
    let client = Arc::new(MockDnsClient::with_example_zone());

    let (workflow, _rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        Some(client.clone() as Arc<dyn DnsClient>),
    )
    .unwrap();
    let report = workflow.execute().await.unwrap();

    assert_eq!(report.zone_id.as_deref(), Some("zone-1"));
    assert_eq!(report.dns_records.len(), 2);
    assert_eq!(report.dns_failures, 0);
    assert_eq!(MockDnsClient::count(&client.verify_calls), 1);
    assert_eq!(
        client.snapshot(),
        vec![
            ("cf1.example.com".to_string(), "1.1.1.1".to_string()),
            ("cf2.example.com".to_string(), "1.0.0.1".to_string()),
        ]
    );
}

#[tokio::test]
async fn only_one_publishes_the_best_ip_unindexed() {
    let mut fixture = Fixture::new().with_dns();
    fixture.config.selection.only_one = true;
    let client = Arc::new(MockDnsClient::with_example_zone());

    let (workflow, _rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        Some(client.clone() as Arc<dyn DnsClient>),
    )
    .unwrap();
    let report = workflow.execute().await.unwrap();

    assert_eq!(report.selected_ips(), vec!["1.1.1.1"]);
    assert_eq!(
        client.snapshot(),
        vec![("cf.example.com".to_string(), "1.1.1.1".to_string())]
    );
}

#[tokio::test]
async fn prune_mode_removes_stale_records() {
    let mut fixture = Fixture::new().with_dns();
    fixture.config.dns.prune_excess = true;
    let client = Arc::new(MockDnsClient::with_example_zone());
    for (i, ip) in ["9.9.9.1", "9.9.9.2", "9.9.9.3"].iter().enumerate() {
        client.add_record("zone-1", &format!("cf{}.example.com", i + 1), ip);
    }

    let (workflow, _rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        Some(client.clone() as Arc<dyn DnsClient>),
    )
    .unwrap();
    workflow.execute().await.unwrap();

    assert_eq!(
        client.snapshot(),
        vec![
            ("cf1.example.com".to_string(), "1.1.1.1".to_string()),
            ("cf2.example.com".to_string(), "1.0.0.1".to_string()),
        ]
    );
    assert_eq!(MockDnsClient::count(&client.delete_calls), 1);
}

#[tokio::test]
async fn empty_selection_leaves_dns_alone() {
    let mut fixture = Fixture::new().with_dns();
    fixture.config.selection.speed_threshold = 100.0;
    let client = Arc::new(MockDnsClient::with_example_zone());

    let (workflow, rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        Some(client.clone() as Arc<dyn DnsClient>),
    )
    .unwrap();
    let report = workflow.execute().await.unwrap();
    drop(workflow);

    assert!(report.selected.is_empty());
    assert!(report.zone_id.is_none());
    assert_eq!(MockDnsClient::count(&client.verify_calls), 0);
    assert!(client.snapshot().is_empty());
    assert!(
        drain(rx)
            .await
            .iter()
            .any(|e| matches!(e, WorkflowEvent::DnsSkipped { .. }))
    );
}

#[tokio::test]
async fn authentication_failure_fails_the_run() {
    let fixture = Fixture::new().with_dns();
    let client = Arc::new(MockDnsClient::with_example_zone());
    client.fail_everything(Fault::Auth);

    let (workflow, rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        Some(client.clone() as Arc<dyn DnsClient>),
    )
    .unwrap();
    let err = workflow.execute().await.unwrap_err();
    drop(workflow);

    assert!(err.is_authentication());
    assert_eq!(MockDnsClient::count(&client.list_zones_calls), 0);
    let events = drain(rx).await;
    assert!(matches!(events.last(), Some(WorkflowEvent::Failed { .. })));
}

#[tokio::test]
async fn speed_test_timeout_carries_a_suggestion() {
    let fixture = Fixture::new();
    let (workflow, _rx) = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(ScriptedSpeedTester::new(SpeedTestScript::Timeout)),
        None,
    )
    .unwrap();

    let err = workflow.execute().await.unwrap_err();

    assert!(matches!(err, Error::SpeedTestTimeout { .. }));
    assert!(err.suggestion().is_some());
}

#[tokio::test]
async fn invalid_config_is_rejected_before_io() {
    let mut fixture = Fixture::new();
    fixture.config.selection.speed_threshold = -1.0;
    let tester = writer();

    let result = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(ScriptedSpeedTester::sharing_counters_with(&tester)),
        None,
    );

    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(tester.run_count(), 0);
    assert!(!Path::new(&fixture.output()).exists());
}

#[tokio::test]
async fn dns_enabled_without_client_is_rejected() {
    let fixture = Fixture::new().with_dns();

    let result = Workflow::new(
        fixture.config.clone(),
        fixture.ip_source(),
        Box::new(writer()),
        None,
    );

    assert!(matches!(result, Err(Error::Config(_))));
}
