//! RapidCMDB SNMP discovery scanner.
//!
//! Walks a CIDR, pre-filters hosts with a TCP probe, collects SNMP facts
//! with v3/v2c fallback, classifies each device through the YAML rule
//! engine and writes a scan document.

mod config;
mod fingerprint;
mod oid;
mod oids;
mod output;
mod probe;
mod progress;
mod rules;
mod scanner;
mod snmp;
mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use rapidcmdb_common::init_tracing;

use crate::config::ScannerConfig;
use crate::fingerprint::FingerprintEngine;
use crate::rules::FingerprintRules;
use crate::scanner::ScanOrchestrator;

#[derive(Parser, Debug)]
#[command(about = "SNMP network discovery scanner with vendor fingerprinting")]
struct Args {
    /// Network CIDR to scan (e.g. 192.168.1.0/24).
    #[arg(long)]
    cidr: String,

    /// Path to configuration file (JSON5).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fingerprint rules file (YAML); overrides the config value.
    #[arg(long)]
    rules: Option<String>,

    /// Output scan file.
    #[arg(long, default_value = "scan_results.json")]
    output: PathBuf,

    /// Concurrent host scans; overrides the config value.
    #[arg(long)]
    concurrent: Option<usize>,

    /// Skip TCP pre-filtering.
    #[arg(long)]
    skip_tcp_probe: bool,

    /// TCP probe ports; overrides the config list.
    #[arg(long, num_args = 1..)]
    tcp_ports: Option<Vec<u16>>,

    /// TCP probe timeout in seconds.
    #[arg(long)]
    tcp_timeout: Option<u64>,

    /// SNMP request timeout in seconds.
    #[arg(long)]
    snmp_timeout: Option<u64>,

    /// v2c community strings to try, in order; overrides the config list.
    #[arg(long, num_args = 1..)]
    communities: Option<Vec<String>>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path).map_err(|e| anyhow::anyhow!("{}", e))?,
        None => ScannerConfig::parse("{}").map_err(|e| anyhow::anyhow!("{}", e))?,
    };

    if let Some(rules) = &args.rules {
        config.rules_file = rules.clone();
    }
    if let Some(concurrent) = args.concurrent {
        config.scan.concurrency = concurrent;
    }
    if args.skip_tcp_probe {
        config.scan.skip_tcp_probe = true;
    }
    if let Some(ports) = &args.tcp_ports {
        config.scan.tcp_probe_ports = ports.clone();
    }
    if let Some(timeout) = args.tcp_timeout {
        config.scan.tcp_probe_timeout_secs = timeout;
    }
    if let Some(timeout) = args.snmp_timeout {
        config.snmp.timeout_secs = timeout;
    }
    if let Some(communities) = &args.communities {
        config.snmp.communities = communities
            .iter()
            .map(|c| config::CommunityConfig {
                name: c.clone(),
                community: c.clone(),
            })
            .collect();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;

    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;

    let rules = FingerprintRules::load(&config.rules_file).map_err(|e| anyhow::anyhow!("{}", e))?;
    let engine = FingerprintEngine::new(rules).map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(
        cidr = %args.cidr,
        rules = %config.rules_file,
        output = %args.output.display(),
        "Scanner starting"
    );

    // Cooperative cancellation on Ctrl+C: no new hosts are dispatched and
    // partial results are still written.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received shutdown signal, finishing in-flight hosts");
            signal_cancel.cancel();
        }
    });

    let orchestrator = ScanOrchestrator::new(config, engine);
    let document = orchestrator
        .scan(&args.cidr, cancel)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    output::write_scan_document(&args.output, &document).map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(
        devices = document.total_devices,
        output = %args.output.display(),
        "Scan results saved"
    );

    Ok(())
}
