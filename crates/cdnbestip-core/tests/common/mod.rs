//! Test doubles and common utilities for contract tests
//!
//! `MockDnsClient` keeps zones and records in memory, counts every call, and
//! can be told to fail specific calls. `ScriptedSpeedTester` writes canned
//! output instead of spawning a process.

#![allow(dead_code)]

use cdnbestip_core::error::{Error, Result};
use cdnbestip_core::traits::{DnsClient, RecordPayload, RecordQuery, SpeedTester};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Provider failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Auth,
    NotFound,
    RateLimited,
    Server,
    BadRequest,
}

impl Fault {
    pub fn to_error(self) -> Error {
        match self {
            Fault::Auth => Error::auth("Invalid API token"),
            Fault::NotFound => Error::not_found("resource"),
            Fault::RateLimited => Error::rate_limited("Too many requests"),
            Fault::Server => Error::server(503, "Service unavailable"),
            Fault::BadRequest => Error::bad_request("Invalid content"),
        }
    }
}

#[derive(Default)]
pub(crate) struct Faults {
    /// Next N zone lookups fail with this fault
    zone_lookups: VecDeque<Fault>,
    /// Create/update calls whose content matches fail every time
    by_content: HashMap<String, Fault>,
    /// Delete calls for these record ids fail every time
    by_delete_id: HashMap<String, Fault>,
    /// Fail every call with this fault
    everything: Option<Fault>,
}

/// An in-memory DNS provider
pub struct MockDnsClient {
    pub(crate) zones: Mutex<Vec<Value>>,
    pub(crate) records: Mutex<Vec<Value>>,
    pub(crate) faults: Mutex<Faults>,
    pub(crate) next_id: AtomicUsize,
    /// Strip zone_id/zone_name from record responses
    pub omit_zone_fields: bool,

    pub verify_calls: AtomicUsize,
    pub list_zones_calls: AtomicUsize,
    pub get_zone_calls: AtomicUsize,
    pub list_records_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Zone names passed to list_zones, in order
    pub zone_queries: Mutex<Vec<Option<String>>>,
}

impl MockDnsClient {
    pub fn new() -> Self {
        Self {
            zones: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            next_id: AtomicUsize::new(1),
            omit_zone_fields: false,
            verify_calls: AtomicUsize::new(0),
            list_zones_calls: AtomicUsize::new(0),
            get_zone_calls: AtomicUsize::new(0),
            list_records_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            zone_queries: Mutex::new(Vec::new()),
        }
    }

    /// Mock with one zone `example.com` (id `zone-1`)
    pub fn with_example_zone() -> Self {
        let client = Self::new();
        client.add_zone("zone-1", "example.com");
        client
    }

    pub fn add_zone(&self, id: &str, name: &str) {
        self.zones.lock().unwrap().push(json!({
            "id": id,
            "name": name,
            "status": "active",
            "paused": false,
            "type": "full"
        }));
    }

    /// Seed a record; returns its id
    pub fn add_record(&self, zone_id: &str, name: &str, content: &str) -> String {
        self.add_typed_record(zone_id, name, content, "A")
    }

    pub fn add_typed_record(&self, zone_id: &str, name: &str, content: &str, kind: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.records.lock().unwrap().push(json!({
            "id": id,
            "zone_id": zone_id,
            "zone_name": "example.com",
            "name": name,
            "content": content,
            "type": kind,
            "ttl": 1,
            "proxied": false
        }));
        id
    }

    pub fn fail_zone_lookups(&self, times: usize, fault: Fault) {
        let mut faults = self.faults.lock().unwrap();
        for _ in 0..times {
            faults.zone_lookups.push_back(fault);
        }
    }

    pub fn fail_content(&self, content: &str, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .by_content
            .insert(content.to_string(), fault);
    }

    pub fn fail_delete(&self, record_id: &str, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .by_delete_id
            .insert(record_id.to_string(), fault);
    }

    pub fn fail_everything(&self, fault: Fault) {
        self.faults.lock().unwrap().everything = Some(fault);
    }

    /// Current records as (name, content), sorted by name
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r["name"].as_str().unwrap_or_default().to_string(),
                    r["content"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        out.sort();
        out
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check_global(&self) -> Result<()> {
        match self.faults.lock().unwrap().everything {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn check_content(&self, content: &str) -> Result<()> {
        match self.faults.lock().unwrap().by_content.get(content) {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn response(&self, record: &Value) -> Value {
        let mut record = record.clone();
        if self.omit_zone_fields {
            if let Some(obj) = record.as_object_mut() {
                obj.remove("zone_id");
                obj.remove("zone_name");
            }
        }
        record
    }
}

#[async_trait::async_trait]
impl DnsClient for MockDnsClient {
    async fn verify_credentials(&self) -> Result<()> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()
    }

    async fn list_zones(&self, name: Option<&str>) -> Result<Vec<Value>> {
        self.list_zones_calls.fetch_add(1, Ordering::SeqCst);
        self.zone_queries
            .lock()
            .unwrap()
            .push(name.map(str::to_string));
        self.check_global()?;
        if let Some(fault) = self.faults.lock().unwrap().zone_lookups.pop_front() {
            return Err(fault.to_error());
        }

        Ok(self
            .zones
            .lock()
            .unwrap()
            .iter()
            .filter(|z| name.is_none_or(|n| z["name"] == n))
            .cloned()
            .collect())
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Value> {
        self.get_zone_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()?;
        self.zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z["id"] == zone_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("zone {}", zone_id)))
    }

    async fn list_records(&self, zone_id: &str, query: &RecordQuery) -> Result<Vec<Value>> {
        self.list_records_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["zone_id"] == zone_id)
            .filter(|r| query.name.as_deref().is_none_or(|n| r["name"] == n))
            .filter(|r| query.record_type.as_deref().is_none_or(|t| r["type"] == t))
            .map(|r| self.response(r))
            .collect())
    }

    async fn create_record(&self, zone_id: &str, record: &RecordPayload) -> Result<Value> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()?;
        self.check_content(&record.content)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let value = json!({
            "id": id,
            "zone_id": zone_id,
            "zone_name": "example.com",
            "name": record.name,
            "content": record.content,
            "type": record.record_type,
            "ttl": record.ttl,
            "proxied": record.proxied
        });
        self.records.lock().unwrap().push(value.clone());
        Ok(self.response(&value))
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordPayload,
    ) -> Result<Value> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()?;
        self.check_content(&record.content)?;

        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r["id"] == record_id && r["zone_id"] == zone_id)
            .ok_or_else(|| Error::not_found(format!("record {}", record_id)))?;
        existing["name"] = json!(record.name);
        existing["content"] = json!(record.content);
        existing["type"] = json!(record.record_type);
        existing["ttl"] = json!(record.ttl);
        existing["proxied"] = json!(record.proxied);
        let updated = existing.clone();
        drop(records);
        Ok(self.response(&updated))
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_global()?;
        if let Some(fault) = self.faults.lock().unwrap().by_delete_id.get(record_id) {
            return Err(fault.to_error());
        }

        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !(r["id"] == record_id && r["zone_id"] == zone_id));
        if records.len() == before {
            return Err(Error::not_found(format!("record {}", record_id)));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// What a scripted speed test run does
#[derive(Debug, Clone)]
pub enum SpeedTestScript {
    /// Write this text to the output path
    Write(String),
    /// Fail as if the process timed out
    Timeout,
    /// Exit non-zero
    Exit(i32),
}

/// A SpeedTester that writes canned results
pub struct ScriptedSpeedTester {
    script: SpeedTestScript,
    run_count: Arc<AtomicUsize>,
    seen_ip_files: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedSpeedTester {
    pub fn new(script: SpeedTestScript) -> Self {
        Self {
            script,
            run_count: Arc::new(AtomicUsize::new(0)),
            seen_ip_files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the number of times run() was called
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    pub fn seen_ip_files(&self) -> Vec<PathBuf> {
        self.seen_ip_files.lock().unwrap().clone()
    }

    /// Create a tester that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            script: other.script.clone(),
            run_count: Arc::clone(&other.run_count),
            seen_ip_files: Arc::clone(&other.seen_ip_files),
        }
    }
}

#[async_trait::async_trait]
impl SpeedTester for ScriptedSpeedTester {
    async fn run(&self, ip_file: &Path, output: &Path) -> Result<PathBuf> {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        self.seen_ip_files
            .lock()
            .unwrap()
            .push(ip_file.to_path_buf());

        match &self.script {
            SpeedTestScript::Write(text) => {
                tokio::fs::write(output, text).await?;
                Ok(output.to_path_buf())
            }
            SpeedTestScript::Timeout => Err(Error::SpeedTestTimeout { secs: 1 }),
            SpeedTestScript::Exit(code) => Err(Error::SpeedTestFailed {
                exit_code: *code,
                stderr: "scripted failure".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Two-row English results used across tests
pub const SAMPLE_RESULTS: &str = "IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)\n\
1.1.1.1,443,LAX,US,Los Angeles,15.5,25.3\n\
1.0.0.1,443,NYC,US,New York,12.8,30.1\n\
1.0.0.2,443,SJC,US,San Jose,0.5,10.0\n";

pub fn ips(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
