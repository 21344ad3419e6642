// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics for notification delivery.
//!
//! Lightweight in-process counters: per-channel delivery attempts and
//! latencies, timed registry operations, and callback lifecycle transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Delivery metrics by channel ("call", "email", "chat", "batch_email").
    channels: RwLock<HashMap<String, ChannelMetrics>>,

    /// Timed operations by name.
    operations: RwLock<HashMap<String, OperationMetrics>>,

    transitions: TransitionCounters,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            transitions: TransitionCounters::default(),
            start_time: Instant::now(),
        }
    }

    /// Record one delivery attempt on a channel.
    pub fn record_delivery(&self, channel: &str, duration: Duration, success: bool) {
        if let Ok(mut channels) = self.channels.write() {
            channels
                .entry(channel.to_string())
                .or_insert_with(ChannelMetrics::new)
                .record(duration, success);
        }
    }

    pub fn record_operation(&self, name: &str, duration: Duration) {
        if let Ok(mut ops) = self.operations.write() {
            ops.entry(name.to_string())
                .or_insert_with(OperationMetrics::new)
                .record(duration);
        }
    }

    /// Count a lifecycle transition.
    pub fn record_transition(&self, transition: Transition) {
        self.transitions.counter(transition).fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_metrics(&self, channel: &str) -> Option<ChannelMetrics> {
        self.channels.read().ok()?.get(channel).cloned()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations.read().ok()?.get(name).cloned()
    }

    pub fn transition_count(&self, transition: Transition) -> u64 {
        self.transitions.counter(transition).load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let channels = self.channels.read().map(|c| c.clone()).unwrap_or_default();
        let operations = self.operations.read().map(|o| o.clone()).unwrap_or_default();

        MetricsSnapshot {
            channels,
            operations,
            registered: self.transition_count(Transition::Registered),
            completed: self.transition_count(Transition::Completed),
            failed: self.transition_count(Transition::Failed),
            orphaned: self.transition_count(Transition::Orphaned),
            cancelled: self.transition_count(Transition::Cancelled),
            uptime: self.uptime(),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut channels) = self.channels.write() {
            channels.clear();
        }
        if let Ok(mut ops) = self.operations.write() {
            ops.clear();
        }
        self.transitions.reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback lifecycle transitions that are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Registered,
    Completed,
    Failed,
    Orphaned,
    Cancelled,
}

#[derive(Debug, Default)]
struct TransitionCounters {
    registered: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    orphaned: AtomicU64,
    cancelled: AtomicU64,
}

impl TransitionCounters {
    fn counter(&self, transition: Transition) -> &AtomicU64 {
        match transition {
            Transition::Registered => &self.registered,
            Transition::Completed => &self.completed,
            Transition::Failed => &self.failed,
            Transition::Orphaned => &self.orphaned,
            Transition::Cancelled => &self.cancelled,
        }
    }

    fn reset(&self) {
        for counter in [
            &self.registered,
            &self.completed,
            &self.failed,
            &self.orphaned,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Delivery metrics for a single channel.
#[derive(Debug, Clone)]
pub struct ChannelMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl ChannelMetrics {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.attempts == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.attempts as u32
        }
    }

    /// Success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing for a named operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub channels: HashMap<String, ChannelMetrics>,
    pub operations: HashMap<String, OperationMetrics>,
    pub registered: u64,
    pub completed: u64,
    pub failed: u64,
    pub orphaned: u64,
    pub cancelled: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Delivery Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Callbacks: {} registered, {} completed, {} failed, {} orphaned, {} cancelled\n\n",
            self.registered, self.completed, self.failed, self.orphaned, self.cancelled
        ));

        if !self.channels.is_empty() {
            report.push_str("Channels:\n");
            let mut names: Vec<_> = self.channels.keys().collect();
            names.sort();
            for name in names {
                let m = &self.channels[name];
                report.push_str(&format!(
                    "  {}: {} attempts, {:.1}% success, avg {:.2?}\n",
                    name,
                    m.attempts,
                    m.success_rate() * 100.0,
                    m.avg_duration()
                ));
            }
            report.push('\n');
        }

        if !self.operations.is_empty() {
            report.push_str("Operations:\n");
            let mut names: Vec<_> = self.operations.keys().collect();
            names.sort();
            for name in names {
                let m = &self.operations[name];
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, max {:.2?}\n",
                    name,
                    m.count,
                    m.avg_duration(),
                    m.max_duration
                ));
            }
        }

        report
    }
}
