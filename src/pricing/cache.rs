//! Two-tier quote cache: a bounded in-process map backed by JSON files on
//! disk. Every failure path degrades to a cache miss; the cache is never
//! allowed to fail a quote.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::pricing::domain::{BoardDimensions, ManufacturingParameters};
use crate::pricing::models::PriceResult;

const KEY_PREFIX: &str = "price:v2:";

/// Content-addressed cache key over the canonical parameters, dimensions
/// and tenant. serde_json maps serialize with sorted keys, so the digest is
/// stable across processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    key: String,
    digest: String,
}

impl CacheKey {
    pub fn build(
        params: &ManufacturingParameters,
        dims: &BoardDimensions,
        tenant_id: Option<&str>,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::json!({
            "params": serde_json::to_value(params)?,
            "dimensions": {
                "width_mm": dims.width_mm,
                "height_mm": dims.height_mm,
            },
            "tenant_id": tenant_id,
        });
        let serialized = serde_json::to_string(&payload)?;
        let digest = hex_digest(serialized.as_bytes());
        Ok(Self {
            key: format!("{KEY_PREFIX}{digest}"),
            digest,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    fn file_name(&self) -> String {
        format!("{}.json", self.digest)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub ttl: Duration,
    pub memory_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("cache/pricing"),
            ttl: Duration::from_secs(3600),
            memory_capacity: 1000,
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    memory_hits: AtomicU64,
    file_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub file_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub memory_entries: usize,
}

struct MemoryEntry {
    result: PriceResult,
    cached_at: Instant,
}

/// On-disk entry layout. The result fields are flattened next to the cache
/// metadata so entries stay greppable during incident work.
#[derive(Serialize, Deserialize)]
struct FileEntry {
    cached_at: f64,
    cache_ttl: f64,
    #[serde(flatten)]
    result: PriceResult,
}

pub struct PricingCache {
    settings: CacheSettings,
    memory: Mutex<HashMap<String, MemoryEntry>>,
    counters: CacheCounters,
}

impl PricingCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            memory: Mutex::new(HashMap::new()),
            counters: CacheCounters::default(),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<PriceResult> {
        if !self.settings.enabled {
            return None;
        }
        if let Some(result) = self.memory_get(key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            counter!("pricing_cache_hits_total", "tier" => "memory").increment(1);
            return Some(result);
        }
        if let Some(result) = self.file_get(key).await {
            self.counters.file_hits.fetch_add(1, Ordering::Relaxed);
            counter!("pricing_cache_hits_total", "tier" => "file").increment(1);
            self.memory_set(key, &result);
            return Some(result);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("pricing_cache_misses_total").increment(1);
        None
    }

    pub async fn set(&self, key: &CacheKey, result: &PriceResult) {
        if !self.settings.enabled {
            return;
        }
        self.memory_set(key, result);
        self.file_set(key, result).await;
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one tier, or both when no tier is given.
    pub async fn clear(&self, tier: Option<CacheTier>) {
        if matches!(tier, None | Some(CacheTier::Memory)) {
            if let Ok(mut memory) = self.memory.lock() {
                memory.clear();
            }
        }
        if matches!(tier, None | Some(CacheTier::File)) {
            if let Ok(mut entries) = tokio::fs::read_dir(&self.settings.directory).await {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        if let Err(err) = tokio::fs::remove_file(&path).await {
                            warn!(path = %path.display(), error = %err, "failed to clear cache file");
                        }
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.memory.lock().map(|m| m.len()).unwrap_or(0);
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            file_hits: self.counters.file_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            memory_entries,
        }
    }

    fn memory_get(&self, key: &CacheKey) -> Option<PriceResult> {
        let mut memory = self.memory.lock().ok()?;
        match memory.get(key.as_str()) {
            Some(entry) if entry.cached_at.elapsed() <= self.settings.ttl => {
                Some(entry.result.clone())
            }
            Some(_) => {
                memory.remove(key.as_str());
                None
            }
            None => None,
        }
    }

    fn memory_set(&self, key: &CacheKey, result: &PriceResult) {
        let Ok(mut memory) = self.memory.lock() else {
            return;
        };
        if memory.len() >= self.settings.memory_capacity
            && !memory.contains_key(key.as_str())
        {
            self.evict_oldest(&mut memory);
        }
        memory.insert(
            key.as_str().to_owned(),
            MemoryEntry {
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Evicts the oldest tenth of the tier to amortize the scan.
    fn evict_oldest(&self, memory: &mut HashMap<String, MemoryEntry>) {
        let count = (self.settings.memory_capacity / 10).max(1);
        let mut by_age: Vec<(String, Instant)> = memory
            .iter()
            .map(|(k, v)| (k.clone(), v.cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);
        for (key, _) in by_age.into_iter().take(count) {
            memory.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        counter!("pricing_cache_evictions_total").increment(count as u64);
    }

    async fn file_get(&self, key: &CacheKey) -> Option<PriceResult> {
        let path = self.settings.directory.join(key.file_name());
        let bytes = tokio::fs::read(&path).await.ok()?;
        let entry: FileEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache entry, discarding");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };
        if unix_now() > entry.cached_at + entry.cache_ttl {
            debug!(path = %path.display(), "cache entry expired");
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.result)
    }

    async fn file_set(&self, key: &CacheKey, result: &PriceResult) {
        let entry = FileEntry {
            cached_at: unix_now(),
            cache_ttl: self.settings.ttl.as_secs_f64(),
            result: result.clone(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(err) = tokio::fs::create_dir_all(&self.settings.directory).await {
            warn!(error = %err, "failed to create cache directory");
            return;
        }
        let path = self.settings.directory.join(key.file_name());
        if let Err(err) = tokio::fs::write(&path, bytes).await {
            warn!(path = %path.display(), error = %err, "failed to write cache entry");
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
