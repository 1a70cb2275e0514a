//! Engine configuration.
//!
//! `RendererConfig` covers every tunable the engine recognizes; defaults are
//! chosen so `RendererConfig::default()` is usable as-is.
//!
//! ## Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `pool_max_size` | 3 contexts |
//! | `handshake_timeout` | 30 seconds |
//! | `render_timeout` | 10 seconds |
//! | `init_timeout` | 10 seconds |
//! | `init_max_attempts` | 3 |
//! | `init_backoff` | 500 ms base, doubling |
//! | `cache_max_entries` | 100 |
//! | `cache_ttl` | 5 minutes |
//! | `sample_rate` | 1.0 (measure everything) |
//! | `pending_queue_capacity` | 10 |
//! | `max_content_bytes` | 2 MiB |

use std::path::PathBuf;
use std::time::Duration;

use renderbox_sandbox::MAX_CONTENT_BYTES;

/// Configuration for [`RendererManager`](crate::manager::RendererManager).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Bootstrap resource loaded into every new context. `None` uses the
    /// builtin shell.
    pub bootstrap_path: Option<PathBuf>,

    /// Hard maximum of concurrently live contexts.
    pub pool_max_size: usize,
    /// Readiness handshake timeout for the blocking warm-up path.
    pub handshake_timeout: Duration,

    /// Per-render completion deadline.
    pub render_timeout: Duration,
    /// Per-attempt initialization deadline driven by the watchdog.
    pub init_timeout: Duration,
    /// Initialization attempts before giving up for good.
    pub init_max_attempts: u32,
    /// Base backoff between initialization attempts; doubles per attempt.
    pub init_backoff: Duration,

    /// Maximum render-cache entries; 0 disables caching.
    pub cache_max_entries: usize,
    /// Time-to-live for cache entries.
    pub cache_ttl: Duration,
    /// Values larger than this are candidates for compression.
    pub cache_compress_threshold: usize,
    /// Interval between expired-entry sweeps.
    pub cache_sweep_interval: Duration,
    /// Persist cache contents to this file across runs, if set.
    pub persist_path: Option<PathBuf>,

    /// Probability a render is measured, in `[0, 1]`.
    pub sample_rate: f64,
    /// Closed-metric ring buffer capacity.
    pub perf_buffer_size: usize,
    /// Interval between metric flushes.
    pub perf_flush_interval: Duration,
    /// Alert when a measured span runs longer than this.
    pub alert_render_duration: Duration,
    /// Alert when a measured span grows resident memory by more than this.
    pub alert_memory_ceiling_kb: u64,

    /// Pending renders retained per artifact while its context initializes.
    pub pending_queue_capacity: usize,
    /// Upper bound on artifact content size.
    pub max_content_bytes: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            bootstrap_path: None,
            pool_max_size: 3,
            handshake_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(10),
            init_timeout: Duration::from_secs(10),
            init_max_attempts: 3,
            init_backoff: Duration::from_millis(500),
            cache_max_entries: 100,
            cache_ttl: Duration::from_secs(300),
            cache_compress_threshold: 8 * 1024,
            cache_sweep_interval: Duration::from_secs(60),
            persist_path: None,
            sample_rate: 1.0,
            perf_buffer_size: 256,
            perf_flush_interval: Duration::from_secs(30),
            alert_render_duration: Duration::from_secs(5),
            alert_memory_ceiling_kb: 64 * 1024,
            pending_queue_capacity: 10,
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bootstrap resource path.
    pub fn bootstrap_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_path = Some(path.into());
        self
    }

    /// Set the hard maximum of concurrent contexts.
    pub fn pool_max_size(mut self, max: usize) -> Self {
        self.pool_max_size = max;
        self
    }

    /// Set the per-render completion deadline.
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Set the per-attempt initialization deadline.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the initialization attempt budget.
    pub fn init_max_attempts(mut self, attempts: u32) -> Self {
        self.init_max_attempts = attempts;
        self
    }

    /// Set cache capacity and time-to-live.
    pub fn cache(mut self, max_entries: usize, ttl: Duration) -> Self {
        self.cache_max_entries = max_entries;
        self.cache_ttl = ttl;
        self
    }

    /// Persist the cache to `path` across runs.
    pub fn persist_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Set the measurement sample rate, clamped to `[0, 1]`.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the alert thresholds for render duration and memory growth.
    pub fn alert_thresholds(mut self, duration: Duration, memory_kb: u64) -> Self {
        self.alert_render_duration = duration;
        self.alert_memory_ceiling_kb = memory_kb;
        self
    }
}
