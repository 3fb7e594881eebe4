//! Shared scan progress counters and periodic reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::snmp::SnmpVersion;

/// Progress milestones that always produce a report.
const MILESTONES: &[u64] = &[1, 5, 10, 25];

/// Atomic counters shared by every scan worker.
pub struct ScanProgress {
    total: u64,
    interval: u64,
    started: Instant,
    completed: AtomicU64,
    tcp_responsive: AtomicU64,
    tcp_failed: AtomicU64,
    snmp_successful: AtomicU64,
    snmp_failed: AtomicU64,
    v3_successful: AtomicU64,
    v2c_successful: AtomicU64,
    probe_anomalies: AtomicU64,
}

impl ScanProgress {
    pub fn new(total: u64, interval: u64) -> Self {
        Self {
            total,
            interval: interval.max(1),
            started: Instant::now(),
            completed: AtomicU64::new(0),
            tcp_responsive: AtomicU64::new(0),
            tcp_failed: AtomicU64::new(0),
            snmp_successful: AtomicU64::new(0),
            snmp_failed: AtomicU64::new(0),
            v3_successful: AtomicU64::new(0),
            v2c_successful: AtomicU64::new(0),
            probe_anomalies: AtomicU64::new(0),
        }
    }

    pub fn record_tcp_responsive(&self) {
        self.tcp_responsive.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tcp_failed(&self) {
        self.tcp_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_anomalies(&self, count: u64) {
        if count > 0 {
            self.probe_anomalies.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_snmp_failed(&self) {
        self.snmp_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snmp_success(&self, version: SnmpVersion) {
        self.snmp_successful.fetch_add(1, Ordering::Relaxed);
        match version {
            SnmpVersion::V3 => self.v3_successful.fetch_add(1, Ordering::Relaxed),
            SnmpVersion::V2c => self.v2c_successful.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Mark one host complete and emit a progress event at the configured
    /// interval and at the early milestones.
    pub fn complete_one(&self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;

        let at_milestone = MILESTONES.contains(&completed);
        let at_interval = completed % self.interval == 0;
        let at_end = completed == self.total;
        if !(at_milestone || at_interval || at_end) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(completed);
        let eta = if rate > 0.0 && remaining > 0 {
            let eta_seconds = remaining as f64 / rate;
            format!("{}m {}s", (eta_seconds as u64) / 60, (eta_seconds as u64) % 60)
        } else {
            "complete".to_string()
        };

        let percent = if self.total > 0 {
            completed as f64 / self.total as f64 * 100.0
        } else {
            100.0
        };

        tracing::info!(
            progress = format!("{:.1}%", percent),
            completed,
            total = self.total,
            tcp_ok = self.tcp_responsive.load(Ordering::Relaxed),
            tcp_failed = self.tcp_failed.load(Ordering::Relaxed),
            snmp_ok = self.snmp_successful.load(Ordering::Relaxed),
            v3 = self.v3_successful.load(Ordering::Relaxed),
            v2c = self.v2c_successful.load(Ordering::Relaxed),
            eta = %eta,
            "Scan progress"
        );
    }

    pub fn v3_successful(&self) -> u64 {
        self.v3_successful.load(Ordering::Relaxed)
    }

    pub fn v2c_successful(&self) -> u64 {
        self.v2c_successful.load(Ordering::Relaxed)
    }

    pub fn tcp_responsive(&self) -> u64 {
        self.tcp_responsive.load(Ordering::Relaxed)
    }

    pub fn tcp_failed(&self) -> u64 {
        self.tcp_failed.load(Ordering::Relaxed)
    }

    pub fn snmp_successful(&self) -> u64 {
        self.snmp_successful.load(Ordering::Relaxed)
    }

    pub fn snmp_failed(&self) -> u64 {
        self.snmp_failed.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let progress = ScanProgress::new(10, 50);

        progress.record_tcp_responsive();
        progress.record_snmp_success(SnmpVersion::V3);
        progress.record_snmp_success(SnmpVersion::V2c);
        progress.record_snmp_success(SnmpVersion::V2c);
        progress.record_tcp_failed();
        progress.complete_one();

        assert_eq!(progress.tcp_responsive(), 1);
        assert_eq!(progress.tcp_failed(), 1);
        assert_eq!(progress.snmp_successful(), 3);
        assert_eq!(progress.v3_successful(), 1);
        assert_eq!(progress.v2c_successful(), 2);
        assert_eq!(progress.completed(), 1);
    }
}
