//! Thread-safe metrics collection
//!
//! Atomic counters for the per-message hot path and mutex-protected
//! collections for timing data and per-kind mediator statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Measurements kept for percentile calculation
const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    messages_received: AtomicU64,
    messages_in_flight: AtomicU64,
    messages_completed: AtomicU64,
    messages_faulted: AtomicU64,
    max_in_flight: AtomicU64,

    reinjections: AtomicU64,
    loop_limit_faults: AtomicU64,
    fault_recoveries: AtomicU64,
    audit_failures: AtomicU64,

    config_reloads: AtomicU64,
    config_reload_failures: AtomicU64,
    active_generation: AtomicU64,

    // milliseconds
    processing_times: Mutex<Vec<u64>>,
    mediator_stats: Mutex<HashMap<String, MediatorExecutionStats>>,

    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_in_flight: AtomicU64::new(0),
            messages_completed: AtomicU64::new(0),
            messages_faulted: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
            reinjections: AtomicU64::new(0),
            loop_limit_faults: AtomicU64::new(0),
            fault_recoveries: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
            config_reload_failures: AtomicU64::new(0),
            active_generation: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            mediator_stats: Mutex::new(HashMap::new()),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    // Message lifecycle
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.messages_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    pub fn message_completed(&self, duration: Duration) {
        self.messages_completed.fetch_add(1, Ordering::Relaxed);
        self.messages_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    pub fn message_faulted(&self, duration: Duration) {
        self.messages_faulted.fetch_add(1, Ordering::Relaxed);
        self.messages_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);
            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Pipeline mechanics
    pub fn reinjection(&self) {
        self.reinjections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn loop_limit_exceeded(&self) {
        self.loop_limit_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fault_recovered(&self) {
        self.fault_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audit_failed(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mediator_executed(&self, kind: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.mediator_stats.lock() {
            let entry = stats
                .entry(kind.to_string())
                .or_insert_with(|| MediatorExecutionStats::new(kind));
            entry.record(duration, success);
        }
    }

    // Configuration
    pub fn config_reloaded(&self, generation: u64) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
        self.active_generation.store(generation, Ordering::Relaxed);
    }

    pub fn config_reload_failed(&self) {
        self.config_reload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_generation(&self, generation: u64) {
        self.active_generation.store(generation, Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.messages_in_flight,
            &self.messages_completed,
            &self.messages_faulted,
            &self.max_in_flight,
            &self.reinjections,
            &self.loop_limit_faults,
            &self.fault_recoveries,
            &self.audit_failures,
            &self.config_reloads,
            &self.config_reload_failures,
            &self.active_generation,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.started_at.store(current_timestamp(), Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.mediator_stats.lock() {
            stats.clear();
        }
    }

    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    fn mediator_snapshots(&self) -> HashMap<String, MediatorStatsSnapshot> {
        self.mediator_stats
            .lock()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(kind, stats)| (kind.clone(), stats.snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95, p99) = self.processing_time_statistics();

        MetricsSnapshot {
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                in_flight: self.messages_in_flight.load(Ordering::Relaxed),
                max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
                completed: self.messages_completed.load(Ordering::Relaxed),
                faulted: self.messages_faulted.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            pipeline: PipelineMetrics {
                reinjections: self.reinjections.load(Ordering::Relaxed),
                loop_limit_faults: self.loop_limit_faults.load(Ordering::Relaxed),
                fault_recoveries: self.fault_recoveries.load(Ordering::Relaxed),
                audit_failures: self.audit_failures.load(Ordering::Relaxed),
                mediators: self.mediator_snapshots(),
            },
            configuration: ConfigurationMetrics {
                reloads: self.config_reloads.load(Ordering::Relaxed),
                reload_failures: self.config_reload_failures.load(Ordering::Relaxed),
                active_generation: self.active_generation.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct MediatorExecutionStats {
    kind: String,
    executions: u64,
    failures: u64,
    execution_times: Vec<u64>,
}

impl MediatorExecutionStats {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            executions: 0,
            failures: 0,
            execution_times: Vec::new(),
        }
    }

    fn record(&mut self, duration: Duration, success: bool) {
        self.executions += 1;
        if !success {
            self.failures += 1;
        }
        self.execution_times.push(duration.as_micros() as u64);
        if self.execution_times.len() > MAX_TIMING_SAMPLES {
            self.execution_times.remove(0);
        }
    }

    fn snapshot(&self) -> MediatorStatsSnapshot {
        let avg_execution_time_us = if self.execution_times.is_empty() {
            0.0
        } else {
            self.execution_times.iter().sum::<u64>() as f64 / self.execution_times.len() as f64
        };

        MediatorStatsSnapshot {
            kind: self.kind.clone(),
            executions: self.executions,
            failures: self.failures,
            avg_execution_time_us,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub pipeline: PipelineMetrics,
    pub configuration: ConfigurationMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub in_flight: u64,
    pub max_in_flight: u64,
    pub completed: u64,
    pub faulted: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct PipelineMetrics {
    pub reinjections: u64,
    pub loop_limit_faults: u64,
    pub fault_recoveries: u64,
    pub audit_failures: u64,
    pub mediators: HashMap<String, MediatorStatsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct MediatorStatsSnapshot {
    pub kind: String,
    pub executions: u64,
    pub failures: u64,
    pub avg_execution_time_us: f64,
}

#[derive(Debug, Serialize)]
pub struct ConfigurationMetrics {
    pub reloads: u64,
    pub reload_failures: u64,
    pub active_generation: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}
