// =============================================================================
// Tick Cache
// =============================================================================
//
// The hottest read path in the engine: last-trade-price lookup and
// freshness checks for the risk loop, backed by an owned hot cache (never a
// global singleton, per spec §9 Design Notes) that falls through to the KV
// store on miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::kv::KvStore;
use crate::types::Tick;

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

const HOT_CACHE_TTL_SECS: i64 = 1;
const KV_TTL_SECS: u64 = 300;

/// Invoked by `ltp()` on a cold cache; e.g. a one-shot REST quote call.
#[async_trait]
pub trait FallbackFetcher: Send + Sync {
    async fn fetch_ltp(&self, segment: &str, security_id: &str) -> Result<Option<f64>, EngineError>;
}

struct HotEntry {
    tick: Tick,
    cached_at: i64,
}

/// Bounded in-process map, owned by `TickCache`.
struct HotCache {
    entries: RwLock<HashMap<(String, String), HotEntry>>,
}

impl HotCache {
    fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    fn put(&self, tick: Tick) {
        let key = (tick.segment.clone(), tick.security_id.clone());
        self.entries.write().insert(key, HotEntry { tick, cached_at: now_secs() });
    }

    fn get_fresh(&self, segment: &str, security_id: &str) -> Option<Tick> {
        let entries = self.entries.read();
        let entry = entries.get(&(segment.to_string(), security_id.to_string()))?;
        if now_secs() - entry.cached_at <= HOT_CACHE_TTL_SECS {
            Some(entry.tick.clone())
        } else {
            None
        }
    }

    fn get_any(&self, segment: &str, security_id: &str) -> Option<Tick> {
        self.entries.read().get(&(segment.to_string(), security_id.to_string())).map(|e| e.tick.clone())
    }
}

pub struct TickCache {
    hot: HotCache,
    kv: Arc<dyn KvStore>,
    ns: String,
    fallback: Option<Arc<dyn FallbackFetcher>>,
}

impl TickCache {
    pub fn new(ns: impl Into<String>, kv: Arc<dyn KvStore>, fallback: Option<Arc<dyn FallbackFetcher>>) -> Self {
        Self { hot: HotCache::new(), kv, ns: ns.into(), fallback }
    }

    fn tick_key(&self, segment: &str, security_id: &str) -> String {
        format!("{}:ticks:{}:{}", self.ns, segment, security_id)
    }

    /// Store the tick with a wall-clock timestamp; updates hot cache and KV.
    /// Ticks missing `segment` or `security_id` are dropped silently.
    pub async fn put(&self, mut tick: Tick) -> Result<(), EngineError> {
        if tick.segment.is_empty() || tick.security_id.is_empty() {
            return Ok(());
        }
        if tick.ts == 0 {
            tick.ts = now_secs();
        }
        self.hot.put(tick.clone());

        let key = self.tick_key(&tick.segment, &tick.security_id);
        for (field, value) in [
            ("ltp", tick.ltp.to_string()),
            ("ts", tick.ts.to_string()),
            ("day_high", tick.day_high.map(|v| v.to_string()).unwrap_or_default()),
            ("day_low", tick.day_low.map(|v| v.to_string()).unwrap_or_default()),
            ("atp", tick.atp.map(|v| v.to_string()).unwrap_or_default()),
            ("volume", tick.volume.map(|v| v.to_string()).unwrap_or_default()),
        ] {
            self.kv.hset(&key, field, &value).await?;
        }
        self.kv.set(&format!("{key}:ttl_marker"), "1", Some(KV_TTL_SECS)).await?;
        Ok(())
    }

    /// Last price, else invoke the fallback fetcher once and cache its
    /// result. Returns `None` only if the fallback also fails or is absent.
    pub async fn ltp(&self, segment: &str, security_id: &str, use_fallback: bool) -> Result<Option<f64>, EngineError> {
        if let Some(tick) = self.hot.get_fresh(segment, security_id) {
            return Ok(Some(tick.ltp));
        }

        let key = self.tick_key(segment, security_id);
        if let Some(raw) = self.kv.hget(&key, "ltp").await? {
            if let Ok(ltp) = raw.parse::<f64>() {
                return Ok(Some(ltp));
            }
        }

        if use_fallback {
            if let Some(fallback) = &self.fallback {
                if let Some(ltp) = fallback.fetch_ltp(segment, security_id).await? {
                    let ts = now_secs();
                    self.put(Tick {
                        segment: segment.to_string(),
                        security_id: security_id.to_string(),
                        ltp,
                        ts,
                        day_high: None,
                        day_low: None,
                        atp: None,
                        volume: None,
                    })
                    .await?;
                    return Ok(Some(ltp));
                }
            }
        }
        Ok(None)
    }

    /// True iff a tick exists and `now - tick.ts <= max_age`.
    pub fn is_fresh(&self, segment: &str, security_id: &str, max_age_secs: i64) -> bool {
        match self.hot.get_any(segment, security_id) {
            Some(tick) => now_secs() - tick.ts <= max_age_secs,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKvStore;

    fn tick(segment: &str, sid: &str, ltp: f64, ts: i64) -> Tick {
        Tick { segment: segment.to_string(), security_id: sid.to_string(), ltp, ts, day_high: None, day_low: None, atp: None, volume: None }
    }

    #[tokio::test]
    async fn put_then_ltp_hits_hot_cache() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = TickCache::new("ns", kv, None);
        cache.put(tick("NSE_FNO", "1", 123.45, now_secs())).await.unwrap();
        assert_eq!(cache.ltp("NSE_FNO", "1", false).await.unwrap(), Some(123.45));
    }

    #[tokio::test]
    async fn missing_ids_dropped_silently() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = TickCache::new("ns", kv, None);
        cache.put(tick("", "1", 1.0, 0)).await.unwrap();
        assert_eq!(cache.ltp("", "1", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fresh_check_respects_max_age() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = TickCache::new("ns", kv, None);
        cache.put(tick("NSE_FNO", "1", 1.0, now_secs() - 100)).await.unwrap();
        assert!(!cache.is_fresh("NSE_FNO", "1", 30));
        assert!(cache.is_fresh("NSE_FNO", "1", 3600));
    }

    struct StaticFallback(f64);
    #[async_trait]
    impl FallbackFetcher for StaticFallback {
        async fn fetch_ltp(&self, _segment: &str, _security_id: &str) -> Result<Option<f64>, EngineError> {
            Ok(Some(self.0))
        }
    }

    #[tokio::test]
    async fn fallback_used_on_full_miss() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = TickCache::new("ns", kv, Some(Arc::new(StaticFallback(42.0))));
        assert_eq!(cache.ltp("NSE_FNO", "9", true).await.unwrap(), Some(42.0));
        // second call now hits cache, not fallback again, but result is same
        assert_eq!(cache.ltp("NSE_FNO", "9", true).await.unwrap(), Some(42.0));
    }
}
