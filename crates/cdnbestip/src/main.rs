// # cdnbestip
//
// Thin entry point over `cdnbestip-core`:
// 1. Read configuration from environment variables
// 2. Initialize logging and the runtime
// 3. Wire the IP file, speed test runner and DNS client
// 4. Run the workflow once and print the selected IPs
//
// Selection, DNS and retry logic live in the library.
//
// ## Configuration
//
// ### Selection
// - `CDNBESTIP_SPEED_THRESHOLD`: minimum speed in MB/s (default 2.0)
// - `CDNBESTIP_QUANTITY`: maximum number of IPs (0 = all)
// - `CDNBESTIP_ONLY_ONE`: publish only the best IP as `{prefix}.{domain}`
// - `CDNBESTIP_MAX_LATENCY`: latency ceiling in ms
// - `CDNBESTIP_REGIONS`: comma-separated region allow-list
// - `CDNBESTIP_WEIGHTED`: rank by weighted speed/latency score
// - `CDNBESTIP_MAX_PER_DATACENTER`: cap per data center
//
// ### Speed Test
// - `CDNBESTIP_BINARY`: speed test binary (default `cfst`)
// - `CDNBESTIP_IP_FILE`: candidate IP list (default `ip.txt`)
// - `CDNBESTIP_OUTPUT_FILE`: results file (default `result.csv`)
// - `CDNBESTIP_SPEED_PORT`, `CDNBESTIP_SPEED_URL`
// - `CDNBESTIP_TIMEOUT_SECS`: wall-clock limit (default 600)
// - `CDNBESTIP_EXTRA_ARGS`: whitespace-separated extra arguments
// - `CDNBESTIP_REFRESH`: re-run even with a fresh results file
// - `CDNBESTIP_MAX_RESULT_AGE_HOURS`: results file freshness (default 24)
//
// ### DNS
// - `CDNBESTIP_UPDATE_DNS`, `CDNBESTIP_DOMAIN`, `CDNBESTIP_PREFIX`
// - `CDNBESTIP_RECORD_TYPE` (A or AAAA), `CDNBESTIP_TTL`, `CDNBESTIP_PROXIED`
// - `CDNBESTIP_PRUNE`: delete indexed records beyond the selection
// - `CLOUDFLARE_API_TOKEN`, or `CLOUDFLARE_API_KEY` with `CLOUDFLARE_EMAIL`
//
// ### Runtime
// - `CDNBESTIP_RETRY_ATTEMPTS`, `CDNBESTIP_RETRY_DELAY_MS`
// - `CDNBESTIP_LOG_LEVEL` (default info), `CDNBESTIP_DEBUG=true` forces debug
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
// export CDNBESTIP_UPDATE_DNS=true
// export CDNBESTIP_DOMAIN=example.com
// export CDNBESTIP_PREFIX=cf
// export CDNBESTIP_QUANTITY=3
//
// cdnbestip
// ```

use anyhow::{Context, Result};
use cdnbestip_core::traits::{DnsClient, LocalIpFile};
use cdnbestip_core::{CdnBestIpConfig, Workflow, WorkflowEvent, WorkflowReport};
use cdnbestip_speedtest::CfstRunner;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different outcomes
///
/// - 0: Run completed
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CdnBestIpExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<CdnBestIpExitCode> for ExitCode {
    fn from(code: CdnBestIpExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// CloudFlare credentials as read from the environment
#[derive(Default, Clone, PartialEq, Eq)]
struct CloudflareEnv {
    api_token: Option<String>,
    api_key: Option<String>,
    email: Option<String>,
}

impl CloudflareEnv {
    fn is_empty(&self) -> bool {
        self.api_token.is_none() && self.api_key.is_none()
    }
}

/// Application configuration
struct Settings {
    config: CdnBestIpConfig,
    cloudflare: CloudflareEnv,
    log_level: String,
}

/// Read `key` and parse it, naming the variable on failure
fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("{} must be true or false. Got: {}", key, v),
        },
    }
}

impl Settings {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CdnBestIpConfig::new();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let selection = &mut config.selection;
        if let Some(v) = parsed(&lookup, "CDNBESTIP_SPEED_THRESHOLD")? {
            selection.speed_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "CDNBESTIP_QUANTITY")? {
            selection.quantity = v;
        }
        if let Some(v) = flag(&lookup, "CDNBESTIP_ONLY_ONE")? {
            selection.only_one = v;
        }
        selection.max_latency = parsed(&lookup, "CDNBESTIP_MAX_LATENCY")?;
        if let Some(regions) = text("CDNBESTIP_REGIONS") {
            selection.allowed_regions = regions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = flag(&lookup, "CDNBESTIP_WEIGHTED")? {
            selection.weighted = v;
        }
        selection.max_per_datacenter = parsed(&lookup, "CDNBESTIP_MAX_PER_DATACENTER")?;

        let speed_test = &mut config.speed_test;
        if let Some(v) = text("CDNBESTIP_BINARY") {
            speed_test.binary = v.into();
        }
        if let Some(v) = text("CDNBESTIP_IP_FILE") {
            speed_test.ip_file = v.into();
        }
        if let Some(v) = text("CDNBESTIP_OUTPUT_FILE") {
            speed_test.output_file = v.into();
        }
        speed_test.port = parsed(&lookup, "CDNBESTIP_SPEED_PORT")?;
        speed_test.url = text("CDNBESTIP_SPEED_URL");
        if let Some(v) = parsed(&lookup, "CDNBESTIP_TIMEOUT_SECS")? {
            speed_test.timeout_secs = v;
        }
        if let Some(v) = text("CDNBESTIP_EXTRA_ARGS") {
            speed_test.extra_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = flag(&lookup, "CDNBESTIP_REFRESH")? {
            speed_test.refresh = v;
        }
        if let Some(v) = parsed(&lookup, "CDNBESTIP_MAX_RESULT_AGE_HOURS")? {
            speed_test.max_result_age_hours = v;
        }

        let dns = &mut config.dns;
        if let Some(v) = flag(&lookup, "CDNBESTIP_UPDATE_DNS")? {
            dns.update_dns = v;
        }
        if let Some(v) = text("CDNBESTIP_DOMAIN") {
            dns.domain = v;
        }
        if let Some(v) = text("CDNBESTIP_PREFIX") {
            dns.prefix = v;
        }
        if let Some(v) = text("CDNBESTIP_RECORD_TYPE") {
            dns.record_type = v;
        }
        if let Some(v) = parsed(&lookup, "CDNBESTIP_TTL")? {
            dns.ttl = v;
        }
        if let Some(v) = flag(&lookup, "CDNBESTIP_PROXIED")? {
            dns.proxied = v;
        }
        if let Some(v) = flag(&lookup, "CDNBESTIP_PRUNE")? {
            dns.prune_excess = v;
        }

        if let Some(v) = parsed(&lookup, "CDNBESTIP_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "CDNBESTIP_RETRY_DELAY_MS")? {
            config.retry.delay_ms = v;
        }

        let debug = flag(&lookup, "CDNBESTIP_DEBUG")?.unwrap_or(false);
        let log_level = if debug {
            "debug".to_string()
        } else {
            text("CDNBESTIP_LOG_LEVEL").unwrap_or_else(|| "info".to_string())
        };

        Ok(Self {
            config,
            cloudflare: CloudflareEnv {
                api_token: text("CLOUDFLARE_API_TOKEN"),
                api_key: text("CLOUDFLARE_API_KEY"),
                email: text("CLOUDFLARE_EMAIL"),
            },
            log_level,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.config
            .validate()
            .context("Invalid CDNBESTIP_* configuration")?;

        if self.config.dns.update_dns {
            if self.cloudflare.is_empty() {
                anyhow::bail!(
                    "DNS updates need CloudFlare credentials. \
                    Set CLOUDFLARE_API_TOKEN, or CLOUDFLARE_API_KEY and CLOUDFLARE_EMAIL"
                );
            }
            if self.cloudflare.api_token.is_none() && self.cloudflare.email.is_none() {
                anyhow::bail!("CLOUDFLARE_API_KEY requires CLOUDFLARE_EMAIL");
            }
        }

        log_level(&self.log_level)?;
        Ok(())
    }
}

fn log_level(name: &str) -> Result<Level> {
    Ok(match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => anyhow::bail!(
            "CDNBESTIP_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            name
        ),
    })
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CdnBestIpExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CdnBestIpExitCode::ConfigError.into();
    }

    let level = log_level(&settings.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CdnBestIpExitCode::ConfigError.into();
    }

    info!("Starting cdnbestip");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CdnBestIpExitCode::RuntimeError.into();
        }
    };

    let verbose = level >= Level::DEBUG;
    let code = rt.block_on(async {
        match run(settings).await {
            Ok(report) => {
                for ip in report.selected_ips() {
                    println!("{}", ip);
                }
                CdnBestIpExitCode::Success
            }
            Err(e) => {
                report_failure(&e, verbose);
                exit_code_for(&e)
            }
        }
    });

    code.into()
}

fn exit_code_for(e: &anyhow::Error) -> CdnBestIpExitCode {
    match e.downcast_ref::<cdnbestip_core::Error>() {
        Some(cdnbestip_core::Error::Config(_)) => CdnBestIpExitCode::ConfigError,
        _ => CdnBestIpExitCode::RuntimeError,
    }
}

fn report_failure(e: &anyhow::Error, verbose: bool) {
    error!("{:#}", e);
    eprintln!("Error: {:#}", e);
    if let Some(core) = e.downcast_ref::<cdnbestip_core::Error>() {
        if let Some(hint) = core.suggestion() {
            eprintln!("Suggestion: {}", hint);
        }
        if verbose {
            if let Some(payload) = core.provider_payload() {
                eprintln!("Provider response: {}", payload);
            }
        }
    }
}

#[cfg(feature = "cloudflare")]
fn dns_client(settings: &Settings) -> Result<Option<Arc<dyn DnsClient>>> {
    use cdnbestip_provider_cloudflare::{CloudflareClient, Credentials};

    if !settings.config.dns.update_dns {
        return Ok(None);
    }
    let cf = &settings.cloudflare;
    let credentials =
        Credentials::from_parts(cf.api_token.clone(), cf.api_key.clone(), cf.email.clone())?;
    info!("Using CloudFlare DNS client");
    Ok(Some(Arc::new(CloudflareClient::new(credentials)?)))
}

#[cfg(not(feature = "cloudflare"))]
fn dns_client(settings: &Settings) -> Result<Option<Arc<dyn DnsClient>>> {
    if settings.config.dns.update_dns {
        anyhow::bail!("DNS updates need the `cloudflare` feature");
    }
    Ok(None)
}

/// Run the workflow once
async fn run(settings: Settings) -> Result<WorkflowReport> {
    let config = settings.config.clone();
    let ip_source = Box::new(LocalIpFile::new(&config.speed_test.ip_file));
    let speed_tester = Box::new(CfstRunner::from_config(
        &config.speed_test,
        &config.selection,
    ));
    let client = dns_client(&settings)?;

    let (workflow, mut events) = Workflow::new(config, ip_source, speed_tester, client)?;

    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                WorkflowEvent::Failed { .. } => {}
                other => debug!("Workflow event: {:?}", other),
            }
        }
    });

    let result = workflow.execute().await;
    // Closing the sender ends the logger
    drop(workflow);
    let _ = logger.await;

    Ok(result?)
}
