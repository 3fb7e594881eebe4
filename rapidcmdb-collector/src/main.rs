//! RapidCMDB device collector.
//!
//! Loads devices from a scan file or the inventory store, opens one
//! session per device with credential fallback, collects the enabled
//! methods sequentially and writes per-device capture files plus a
//! consolidated run summary.

mod collector;
mod config;
mod credcache;
mod driver;
mod inventory;
mod stats;
mod writer;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use rapidcmdb_common::{init_tracing, load_credentials};

use crate::collector::DeviceCollector;
use crate::config::{CollectorConfig, RuntimeFilters};
use crate::driver::DriverRegistry;
use crate::inventory::{InventorySource, ScanFileSource, StoreSource, apply_runtime_filters};
use crate::writer::ResultWriter;

#[derive(Parser, Debug)]
#[command(about = "Concurrent device telemetry collector with credential fallback")]
struct Args {
    /// Path to configuration file (JSON5).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collect the devices listed in a scan file.
    #[arg(long, conflicts_with = "db")]
    scan_file: Option<PathBuf>,

    /// Collect the devices listed in the inventory store.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Worker pool size; overrides the config value.
    #[arg(long)]
    workers: Option<usize>,

    /// Filter devices by name substring (repeatable).
    #[arg(long)]
    name: Vec<String>,

    /// Filter devices by site code substring (repeatable).
    #[arg(long)]
    site: Vec<String>,

    /// Filter devices by vendor substring (repeatable).
    #[arg(long)]
    vendor: Vec<String>,

    /// Filter devices by role substring (repeatable).
    #[arg(long)]
    role: Vec<String>,

    /// Filter devices by model substring (repeatable).
    #[arg(long)]
    model: Vec<String>,

    /// Filter devices by IP substring (repeatable).
    #[arg(long)]
    ip: Vec<String>,

    /// Legacy filter matching any string field (repeatable).
    #[arg(long = "filter")]
    legacy_filter: Vec<String>,

    /// Path for the consolidated run summary.
    #[arg(long, default_value = "collection_summary.json")]
    summary: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CollectorConfig::load(path).map_err(|e| anyhow::anyhow!("{}", e))?,
        None => CollectorConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;

    let credentials = load_credentials(config.credentials.clone(), &config.credential_env_prefix);
    if credentials.is_empty() {
        anyhow::bail!("No valid credentials configured (config_invalid)");
    }

    let (source, scan_type, source_label): (Box<dyn InventorySource>, &str, String) =
        match (&args.scan_file, &args.db) {
            (Some(path), _) => (
                Box::new(ScanFileSource::new(path)),
                "scan_file_collection",
                path.display().to_string(),
            ),
            (None, Some(path)) => (
                Box::new(StoreSource::new(path)),
                "database_collection",
                path.display().to_string(),
            ),
            (None, None) => {
                anyhow::bail!("Either --scan-file or --db is required (config_invalid)");
            }
        };

    let devices = source
        .list_devices(&config.device_filters)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!(devices = devices.len(), source = %source_label, "Loaded devices");

    let runtime_filters = RuntimeFilters {
        name: args.name,
        site: args.site,
        vendor: args.vendor,
        role: args.role,
        model: args.model,
        ip: args.ip,
        legacy: args.legacy_filter,
    };
    let devices = apply_runtime_filters(devices, &runtime_filters);

    if devices.is_empty() {
        tracing::warn!("No devices matched the filters, nothing to collect");
    }

    let started_at = Utc::now();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received shutdown signal, finishing in-flight devices");
            signal_cancel.cancel();
        }
    });

    // Vendor transports are registered from outside the core; the registry
    // starts with selection rules only.
    let registry = DriverRegistry::new(config.vendor_overrides.clone());

    let writer = ResultWriter::new(&config.capture_directory);
    let max_workers = config.max_workers;
    let capture_directory = config.capture_directory.clone();
    let device_collector = DeviceCollector::new(config, registry, credentials);

    tracing::info!(
        devices = devices.len(),
        workers = max_workers,
        capture_dir = %capture_directory,
        "Starting collection"
    );

    let results = device_collector.collect_all(devices.clone(), cancel).await;

    for run in &results {
        // Writer failures are logged; the run still counts toward stats.
        if let Err(e) = writer.save(run) {
            tracing::error!(device = %run.device_name, error = %e, "Failed to save device output");
        }
    }

    device_collector.cache().log_stats();

    let summary = stats::build_summary(
        results,
        &devices,
        scan_type,
        &source_label,
        started_at,
        max_workers,
    );

    let summary_json = serde_json::to_vec_pretty(&summary)?;
    if let Some(parent) = args.summary.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&args.summary, summary_json)?;

    tracing::info!(
        total = summary.collection_summary.total_devices,
        successful = summary.collection_summary.successful_collections,
        failed = summary.collection_summary.failed_collections,
        avg_device_seconds = summary.collection_summary.average_device_time,
        summary = %args.summary.display(),
        "Collection complete"
    );

    Ok(())
}
