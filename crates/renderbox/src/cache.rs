//! Render-result cache.
//!
//! Rendered documents are cached under a fingerprint of `(content, kind)` so
//! an unchanged artifact never makes a second trip through a context. The
//! cache is bounded two ways: least-recently-used eviction at the entry cap,
//! and a per-entry time-to-live checked lazily on lookup plus swept
//! periodically so idle entries do not pin memory until the next hit.
//!
//! Large values are deflate-compressed above a configurable threshold.
//! A capacity of zero turns the cache into a pass-through; every lookup
//! misses and inserts are dropped.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use renderbox_sandbox::ArtifactKind;

use crate::config::RendererConfig;

/// Fingerprint of a render input. Identical content and kind always hash to
/// the same key within one build of the engine.
pub fn fingerprint(content: &str, kind: ArtifactKind) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    kind.as_str().hash(&mut hasher);
    hasher.finish()
}

/// Cached value, compressed when it crossed the size threshold on insert.
enum StoredValue {
    Raw(String),
    Compressed(Vec<u8>),
}

impl StoredValue {
    fn encode(value: String, threshold: usize) -> Self {
        if value.len() < threshold {
            return StoredValue::Raw(value);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        match encoder
            .write_all(value.as_bytes())
            .and_then(|_| encoder.finish())
        {
            Ok(bytes) if bytes.len() < value.len() => StoredValue::Compressed(bytes),
            _ => StoredValue::Raw(value),
        }
    }

    fn decode(&self) -> Option<String> {
        match self {
            StoredValue::Raw(s) => Some(s.clone()),
            StoredValue::Compressed(bytes) => {
                let mut decoder = GzDecoder::new(bytes.as_slice());
                let mut out = String::new();
                decoder.read_to_string(&mut out).ok()?;
                Some(out)
            }
        }
    }
}

struct CacheEntry {
    value: StoredValue,
    created: Instant,
    created_unix_ms: u64,
    // Each entry carries its own lifetime; most inherit the configured
    // default, pinned or short-lived artifacts can deviate.
    ttl: Duration,
    access_count: u64,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= self.ttl
    }
}

/// Cumulative cache counters. Hit rate is derived, not stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Point-in-time cache report for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub entries: usize,
    pub max_entries: usize,
    pub hit_rate: f64,
    #[serde(flatten)]
    pub stats: CacheStats,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: u64,
    value: String,
    created_unix_ms: u64,
    ttl_ms: u64,
    access_count: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    cache: Vec<PersistedEntry>,
    stats: CacheStats,
    timestamp: u64,
}

/// Bounded LRU+TTL cache of rendered documents.
pub struct RenderCache {
    // None when the configured capacity is zero.
    entries: Option<LruCache<u64, CacheEntry>>,
    default_ttl: Duration,
    compress_threshold: usize,
    sweep_interval: Duration,
    last_sweep: Instant,
    persist_path: Option<PathBuf>,
    stats: CacheStats,
}

impl RenderCache {
    pub fn new(config: &RendererConfig) -> Self {
        let entries = match NonZeroUsize::new(config.cache_max_entries) {
            Some(cap) => Some(LruCache::new(cap)),
            None => {
                tracing::warn!("cache capacity is zero, caching disabled");
                None
            }
        };
        let mut cache = Self {
            entries,
            default_ttl: config.cache_ttl,
            compress_threshold: config.cache_compress_threshold,
            sweep_interval: config.cache_sweep_interval,
            last_sweep: Instant::now(),
            persist_path: config.persist_path.clone(),
            stats: CacheStats::default(),
        };
        if let Err(e) = cache.load() {
            tracing::warn!(error = %e, "failed to load persisted cache, starting empty");
        }
        cache
    }

    /// Look up a rendered document. Expired entries are purged on contact
    /// and every hit bumps the entry's access counter.
    pub fn get(&mut self, key: u64) -> Option<String> {
        let now = Instant::now();
        let Some(entries) = self.entries.as_mut() else {
            self.stats.misses += 1;
            return None;
        };

        if entries.peek(&key).is_some_and(|e| e.expired(now)) {
            entries.pop(&key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        let decoded = entries.get_mut(&key).and_then(|e| {
            e.access_count += 1;
            e.value.decode()
        });
        match decoded {
            Some(value) => {
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                // Undecodable entry, drop it.
                entries.pop(&key);
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a rendered document under the default lifetime.
    pub fn insert(&mut self, key: u64, value: String) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert a rendered document with its own lifetime, evicting the least
    /// recently used entry if the cache is at capacity.
    pub fn insert_with_ttl(&mut self, key: u64, value: String, ttl: Duration) {
        let threshold = self.compress_threshold;
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        let now_ms = unix_millis();
        let entry = CacheEntry {
            value: StoredValue::encode(value, threshold),
            created: Instant::now(),
            created_unix_ms: now_ms,
            ttl,
            access_count: 0,
        };
        if let Some((evicted_key, _)) = entries.push(key, entry) {
            if evicted_key != key {
                self.stats.evictions += 1;
                tracing::debug!(key = evicted_key, "evicted cache entry at capacity");
            }
        }
        self.stats.insertions += 1;
    }

    /// TTL-aware presence check that does not disturb recency order.
    pub fn contains(&self, key: u64) -> bool {
        let now = Instant::now();
        self.entries
            .as_ref()
            .and_then(|e| e.peek(&key))
            .is_some_and(|entry| !entry.expired(now))
    }

    /// How many times a live entry has been served. Does not disturb
    /// recency order.
    pub fn access_count(&self, key: u64) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .as_ref()
            .and_then(|e| e.peek(&key))
            .filter(|entry| !entry.expired(now))
            .map(|entry| entry.access_count)
    }

    /// Drop a single entry, if present.
    pub fn invalidate(&mut self, key: u64) {
        if let Some(entries) = self.entries.as_mut() {
            entries.pop(&key);
        }
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            entries: self.len(),
            max_entries: self.entries.as_ref().map_or(0, |e| e.cap().get()),
            hit_rate: self.stats.hit_rate(),
            stats: self.stats,
        }
    }

    /// Sweep expired entries if the sweep interval has elapsed.
    pub fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() < self.sweep_interval {
            return;
        }
        self.sweep();
    }

    /// Unconditionally purge every expired entry.
    pub fn sweep(&mut self) {
        self.last_sweep = Instant::now();
        let now = Instant::now();
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        let expired: Vec<u64> = entries
            .iter()
            .filter(|(_, e)| e.expired(now))
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        if !expired.is_empty() {
            self.stats.expirations += expired.len() as u64;
            tracing::debug!(count = expired.len(), "swept expired cache entries");
        }
    }

    /// Write live entries and counters to the configured persistence file.
    pub fn persist(&self) -> io::Result<()> {
        let Some(path) = self.persist_path.as_ref() else {
            return Ok(());
        };
        let Some(entries) = self.entries.as_ref() else {
            return Ok(());
        };
        let now = Instant::now();
        let cache: Vec<PersistedEntry> = entries
            .iter()
            .filter(|(_, e)| !e.expired(now))
            .filter_map(|(k, e)| {
                Some(PersistedEntry {
                    key: *k,
                    value: e.value.decode()?,
                    created_unix_ms: e.created_unix_ms,
                    ttl_ms: e.ttl.as_millis() as u64,
                    access_count: e.access_count,
                })
            })
            .collect();
        let snapshot = PersistedCache {
            cache,
            stats: self.stats,
            timestamp: unix_millis(),
        };
        let json = serde_json::to_vec(&snapshot).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    fn load(&mut self) -> io::Result<()> {
        let Some(path) = self.persist_path.clone() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&path)?;
        let snapshot: PersistedCache =
            serde_json::from_slice(&bytes).map_err(io::Error::other)?;
        let now_ms = unix_millis();
        let now = Instant::now();
        let mut restored = 0usize;
        for entry in snapshot.cache {
            let age = Duration::from_millis(now_ms.saturating_sub(entry.created_unix_ms));
            let ttl = Duration::from_millis(entry.ttl_ms);
            if age >= ttl {
                continue;
            }
            let threshold = self.compress_threshold;
            if let Some(entries) = self.entries.as_mut() {
                entries.push(
                    entry.key,
                    CacheEntry {
                        value: StoredValue::encode(entry.value, threshold),
                        created: now - age,
                        created_unix_ms: entry.created_unix_ms,
                        ttl,
                        access_count: entry.access_count,
                    },
                );
                restored += 1;
            }
        }
        self.stats = snapshot.stats;
        tracing::info!(restored, path = %path.display(), "restored persisted cache");
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, ttl: Duration) -> RendererConfig {
        RendererConfig::new().cache(max, ttl)
    }

    #[test]
    fn fingerprint_is_stable_and_kind_sensitive() {
        let a = fingerprint("<p>hi</p>", ArtifactKind::Markup);
        let b = fingerprint("<p>hi</p>", ArtifactKind::Markup);
        let c = fingerprint("<p>hi</p>", ArtifactKind::Code);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hit_after_insert() {
        let mut cache = RenderCache::new(&config(10, Duration::from_secs(60)));
        let key = fingerprint("x", ArtifactKind::Markup);
        cache.insert(key, "<html>x</html>".into());
        assert_eq!(cache.get(key).as_deref(), Some("<html>x</html>"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn capacity_bound_holds_under_eviction() {
        let mut cache = RenderCache::new(&config(3, Duration::from_secs(60)));
        for i in 0..10u64 {
            cache.insert(i, format!("doc-{i}"));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 7);
        // Oldest entries evicted, newest retained.
        assert!(cache.get(0).is_none());
        assert_eq!(cache.get(9).as_deref(), Some("doc-9"));
    }

    #[test]
    fn lru_keeps_recently_used_entry() {
        let mut cache = RenderCache::new(&config(2, Duration::from_secs(60)));
        cache.insert(1, "one".into());
        cache.insert(2, "two".into());
        assert!(cache.get(1).is_some());
        cache.insert(3, "three".into());
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn contains_respects_ttl_without_touching_order() {
        let mut cache = RenderCache::new(&config(10, Duration::from_secs(60)));
        cache.insert(1, "a".into());
        assert!(cache.contains(1));
        assert!(!cache.contains(2));

        let mut stale = RenderCache::new(&config(10, Duration::ZERO));
        stale.insert(1, "a".into());
        assert!(!stale.contains(1));
    }

    #[test]
    fn entry_ttl_overrides_the_default() {
        let mut cache = RenderCache::new(&config(10, Duration::from_secs(60)));
        cache.insert(1, "default".into());
        cache.insert_with_ttl(2, "ephemeral".into(), Duration::ZERO);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.get(2).is_none());
        assert_eq!(cache.get(1).as_deref(), Some("default"));
    }

    #[test]
    fn hits_bump_the_access_counter() {
        let mut cache = RenderCache::new(&config(10, Duration::from_secs(60)));
        cache.insert(1, "a".into());
        assert_eq!(cache.access_count(1), Some(0));
        cache.get(1);
        cache.get(1);
        assert_eq!(cache.access_count(1), Some(2));
        assert_eq!(cache.access_count(99), None);
    }

    #[test]
    fn expired_entry_misses() {
        let mut cache = RenderCache::new(&config(10, Duration::ZERO));
        cache.insert(7, "stale".into());
        assert!(cache.get(7).is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn sweep_purges_expired_entries() {
        let mut cache = RenderCache::new(&config(10, Duration::ZERO));
        cache.insert(1, "a".into());
        cache.insert(2, "b".into());
        cache.sweep();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 2);
    }

    #[test]
    fn zero_capacity_bypasses() {
        let mut cache = RenderCache::new(&config(0, Duration::from_secs(60)));
        cache.insert(1, "dropped".into());
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn large_value_round_trips_through_compression() {
        let mut cache = RenderCache::new(&config(4, Duration::from_secs(60)));
        let big = "render ".repeat(4096);
        let key = fingerprint(&big, ArtifactKind::Markdown);
        cache.insert(key, big.clone());
        assert_eq!(cache.get(key).as_deref(), Some(big.as_str()));
    }

    #[test]
    fn persistence_round_trip_discards_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let config = RendererConfig::new()
            .cache(10, Duration::from_secs(300))
            .persist_cache(&path);
        let mut cache = RenderCache::new(&config);
        cache.insert(1, "kept".into());
        cache.persist().unwrap();

        // Rewrite the file with one fresh and one ancient entry.
        let mut snapshot: PersistedCache =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        snapshot.cache.push(PersistedEntry {
            key: 2,
            value: "ancient".into(),
            created_unix_ms: 1,
            ttl_ms: 300_000,
            access_count: 0,
        });
        fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let mut restored = RenderCache::new(&config);
        assert_eq!(restored.get(1).as_deref(), Some("kept"));
        assert!(restored.get(2).is_none());
    }

    #[test]
    fn report_reflects_counters() {
        let mut cache = RenderCache::new(&config(5, Duration::from_secs(60)));
        cache.insert(1, "a".into());
        cache.get(1);
        cache.get(99);
        let report = cache.report();
        assert_eq!(report.entries, 1);
        assert_eq!(report.max_entries, 5);
        assert!((report.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
