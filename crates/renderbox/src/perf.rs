//! Render performance measurement.
//!
//! Spans are sampled at a configurable rate; an unsampled render costs one
//! random draw and nothing else. A span carries a name shared by every
//! measurement of the same operation plus per-span metadata identifying the
//! subject. Closed spans land in a bounded ring buffer and threshold
//! breaches raise alerts, graded by how far past the threshold the
//! measurement landed.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RendererConfig;

/// Opaque handle for an in-flight measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

/// Per-span key/value annotations.
pub type SpanMetadata = Vec<(&'static str, String)>;

#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub metadata: SpanMetadata,
    pub duration: Duration,
    /// Resident-set growth across the span, when readable.
    pub memory_delta_kb: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Notice,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub name: String,
    pub metadata: SpanMetadata,
    pub message: String,
}

/// Aggregate duration statistics over the retained window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerfStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
}

/// Stats plus plain-language advice derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct PerfReport {
    pub stats: PerfStats,
    pub recommendations: Vec<&'static str>,
}

struct OpenSpan {
    name: String,
    metadata: SpanMetadata,
    started: Instant,
    rss_start_kb: Option<u64>,
}

/// Sampling monitor for render spans.
pub struct PerfMonitor {
    sample_rate: f64,
    buffer_size: usize,
    flush_interval: Duration,
    alert_duration: Duration,
    alert_memory_kb: u64,
    next_id: u64,
    open: HashMap<SpanId, OpenSpan>,
    closed: VecDeque<Metric>,
    alerts: Vec<Alert>,
    last_flush: Instant,
}

impl PerfMonitor {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            buffer_size: config.perf_buffer_size.max(1),
            flush_interval: config.perf_flush_interval,
            alert_duration: config.alert_render_duration,
            alert_memory_kb: config.alert_memory_ceiling_kb,
            next_id: 0,
            open: HashMap::new(),
            closed: VecDeque::new(),
            alerts: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Begin a measurement. Returns `None` when the span is not sampled;
    /// callers thread the handle through unchanged either way.
    pub fn start_measurement(&mut self, name: &str, metadata: SpanMetadata) -> Option<SpanId> {
        if self.sample_rate < 1.0 && rand::random::<f64>() >= self.sample_rate {
            return None;
        }
        self.next_id += 1;
        let id = SpanId(self.next_id);
        self.open.insert(
            id,
            OpenSpan {
                name: name.to_string(),
                metadata,
                started: Instant::now(),
                rss_start_kb: current_rss_kb(),
            },
        );
        Some(id)
    }

    /// Close a measurement. A `None` handle is a no-op.
    pub fn end_measurement(&mut self, span: Option<SpanId>) {
        let Some(open) = span.and_then(|id| self.open.remove(&id)) else {
            return;
        };
        let duration = open.started.elapsed();
        let memory_delta_kb = match (open.rss_start_kb, current_rss_kb()) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };
        self.check_thresholds(&open.name, &open.metadata, duration, memory_delta_kb);
        if self.closed.len() == self.buffer_size {
            self.closed.pop_front();
        }
        self.closed.push_back(Metric {
            name: open.name,
            metadata: open.metadata,
            duration,
            memory_delta_kb,
        });
    }

    /// Discard an in-flight measurement without recording it.
    pub fn cancel(&mut self, span: Option<SpanId>) {
        if let Some(id) = span {
            self.open.remove(&id);
        }
    }

    fn check_thresholds(
        &mut self,
        name: &str,
        metadata: &SpanMetadata,
        duration: Duration,
        memory_delta_kb: Option<i64>,
    ) {
        let threshold = self.alert_duration;
        if !threshold.is_zero() && duration >= threshold {
            let ratio = duration.as_secs_f64() / threshold.as_secs_f64();
            let severity = severity_for(ratio);
            tracing::warn!(
                name,
                ?metadata,
                duration_ms = duration.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                ?severity,
                "slow render"
            );
            self.alerts.push(Alert {
                severity,
                name: name.to_string(),
                metadata: metadata.clone(),
                message: format!(
                    "render took {:.0} ms (threshold {:.0} ms)",
                    duration.as_secs_f64() * 1000.0,
                    threshold.as_secs_f64() * 1000.0
                ),
            });
        }

        if let Some(delta) = memory_delta_kb {
            if self.alert_memory_kb > 0 && delta > self.alert_memory_kb as i64 {
                let ratio = delta as f64 / self.alert_memory_kb as f64;
                let severity = severity_for(ratio);
                tracing::warn!(name, ?metadata, delta_kb = delta, ?severity, "render memory growth");
                self.alerts.push(Alert {
                    severity,
                    name: name.to_string(),
                    metadata: metadata.clone(),
                    message: format!(
                        "resident memory grew {delta} KiB (ceiling {} KiB)",
                        self.alert_memory_kb
                    ),
                });
            }
        }
    }

    /// Drain pending alerts.
    pub fn take_alerts(&mut self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts)
    }

    /// Duration statistics over the retained window.
    pub fn get_stats(&self) -> PerfStats {
        self.stats_where(|_| true)
    }

    /// Duration statistics for spans with a specific name.
    pub fn get_stats_for(&self, name: &str) -> PerfStats {
        self.stats_where(|m| m.name == name)
    }

    fn stats_where(&self, keep: impl Fn(&Metric) -> bool) -> PerfStats {
        let mut ms: Vec<f64> = self
            .closed
            .iter()
            .filter(|m| keep(m))
            .map(|m| m.duration.as_secs_f64() * 1000.0)
            .collect();
        if ms.is_empty() {
            return PerfStats::default();
        }
        ms.sort_by(|a, b| a.total_cmp(b));
        let count = ms.len();
        let sum: f64 = ms.iter().sum();
        PerfStats {
            count,
            min_ms: ms[0],
            max_ms: ms[count - 1],
            avg_ms: sum / count as f64,
            median_ms: percentile(&ms, 0.50),
            p95_ms: percentile(&ms, 0.95),
        }
    }

    pub fn get_report(&self) -> PerfReport {
        let stats = self.get_stats();
        let mut recommendations = Vec::new();
        let threshold_ms = self.alert_duration.as_secs_f64() * 1000.0;
        if stats.count > 0 && threshold_ms > 0.0 {
            if stats.p95_ms >= threshold_ms {
                recommendations
                    .push("most renders exceed the duration threshold; simplify artifacts");
            } else if stats.max_ms >= threshold_ms {
                recommendations.push("occasional renders exceed the duration threshold");
            }
        }
        if stats.count == 0 && self.sample_rate < 1.0 {
            recommendations.push("no samples in the window; consider raising the sample rate");
        }
        PerfReport {
            stats,
            recommendations,
        }
    }

    /// Drop every open span, closed metric and pending alert.
    pub fn destroy(&mut self) {
        self.open.clear();
        self.closed.clear();
        self.alerts.clear();
    }

    /// Log a summary and reset the window if the flush interval elapsed.
    pub fn maybe_flush(&mut self) {
        if self.last_flush.elapsed() < self.flush_interval {
            return;
        }
        self.flush();
    }

    pub fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.closed.is_empty() {
            return;
        }
        let stats = self.get_stats();
        tracing::info!(
            count = stats.count,
            avg_ms = stats.avg_ms,
            p95_ms = stats.p95_ms,
            max_ms = stats.max_ms,
            "render performance window"
        );
        self.closed.clear();
    }
}

fn severity_for(ratio: f64) -> AlertSeverity {
    if ratio >= 2.0 {
        AlertSeverity::Critical
    } else if ratio >= 1.5 {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Notice
    }
}

fn percentile(sorted_ms: &[f64], q: f64) -> f64 {
    let idx = ((sorted_ms.len() as f64 - 1.0) * q).round() as usize;
    sorted_ms[idx.min(sorted_ms.len() - 1)]
}

/// Resident set size of the current process in KiB.
#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<u64> {
    None
}
