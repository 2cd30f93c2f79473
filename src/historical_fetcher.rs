// =============================================================================
// Historical Fetcher
// =============================================================================
//
// Periodic per-symbol OHLC pull with staggered schedule, a token-bucket rate
// limiter, and result caching (spec §2, §4.3, §5). The rate limiter mirrors
// the teacher's `binance/rate_limit.rs` `RateLimitTracker`: atomic counters
// reset on a rolling window rather than a leaky-bucket timer task.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::candle::{Candle, CandleSeries};
use crate::error::EngineError;
use crate::retry::RetryPolicy;

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Token bucket of `capacity` requests per 60-second window.
pub struct RateLimiter {
    capacity: u32,
    used: AtomicU32,
    window_start: AtomicU64,
}

impl RateLimiter {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, used: AtomicU32::new(0), window_start: AtomicU64::new(now_secs()) }
    }

    fn maybe_reset_window(&self) {
        let start = self.window_start.load(Ordering::SeqCst);
        if now_secs().saturating_sub(start) >= 60 {
            self.window_start.store(now_secs(), Ordering::SeqCst);
            self.used.store(0, Ordering::SeqCst);
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.maybe_reset_window();
        let current = self.used.fetch_add(1, Ordering::SeqCst);
        if current < self.capacity {
            true
        } else {
            self.used.fetch_sub(1, Ordering::SeqCst);
            false
        }
    }
}

/// Raw OHLC rows as they might arrive from the wire: either array-of-records
/// or columnar-by-field. Normalisation happens once, here.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum RawOhlc {
    Records(Vec<RawRecord>),
    Columnar(RawColumns),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawRecord {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawColumns {
    pub ts: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

fn normalise(raw: RawOhlc) -> Vec<Candle> {
    match raw {
        RawOhlc::Records(rows) => rows
            .into_iter()
            .map(|r| Candle { ts: r.ts, open: r.open, high: r.high, low: r.low, close: r.close, volume: r.volume })
            .collect(),
        RawOhlc::Columnar(cols) => (0..cols.ts.len())
            .map(|i| Candle {
                ts: cols.ts[i],
                open: cols.open[i],
                high: cols.high[i],
                low: cols.low[i],
                close: cols.close[i],
                volume: cols.volume[i],
            })
            .collect(),
    }
}

/// External source of raw OHLC rows; the broker's HTTP/WS wire protocol is
/// out of scope, so this trait is the seam a concrete client implements.
#[async_trait]
pub trait OhlcSource: Send + Sync {
    async fn fetch(&self, segment: &str, security_id: &str, interval_minutes: u32) -> Result<RawOhlc, EngineError>;
}

pub struct HistoricalFetcher {
    source: Arc<dyn OhlcSource>,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    cache: RwLock<std::collections::HashMap<(String, String, u32), CandleSeries>>,
}

impl HistoricalFetcher {
    pub fn new(source: Arc<dyn OhlcSource>, requests_per_minute: u32) -> Self {
        Self {
            source,
            rate_limiter: RateLimiter::new(requests_per_minute),
            retry_policy: RetryPolicy::historical_fetch(),
            cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// `interval_minutes = 5` fetches 1-minute data and resamples locally,
    /// per spec §4.3's special case.
    pub async fn load_from_source(&self, segment: &str, security_id: &str, interval_minutes: u32) -> Result<CandleSeries, EngineError> {
        if interval_minutes == 5 {
            let one_minute = self.fetch_and_cache(segment, security_id, 1).await?;
            return one_minute.resample_to(5);
        }
        self.fetch_and_cache(segment, security_id, interval_minutes).await
    }

    async fn fetch_and_cache(&self, segment: &str, security_id: &str, interval_minutes: u32) -> Result<CandleSeries, EngineError> {
        let key = (segment.to_string(), security_id.to_string(), interval_minutes);
        if let Some(cached) = self.cache.read().get(&key) {
            return Ok(cached.clone());
        }

        if !self.rate_limiter.try_acquire() {
            return Err(EngineError::RateLimited(format!("{segment}:{security_id}:{interval_minutes}")));
        }

        let source = self.source.clone();
        let segment_owned = segment.to_string();
        let sid_owned = security_id.to_string();
        let raw = self
            .retry_policy
            .run(|| {
                let source = source.clone();
                let segment = segment_owned.clone();
                let sid = sid_owned.clone();
                async move { source.fetch(&segment, &sid, interval_minutes).await }
            })
            .await?;

        let candles = normalise(raw);
        let series = CandleSeries::from_candles(security_id, interval_minutes, candles);
        self.cache.write().insert(key, series.clone());
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource;
    #[async_trait]
    impl OhlcSource for StaticSource {
        async fn fetch(&self, _segment: &str, _security_id: &str, interval_minutes: u32) -> Result<RawOhlc, EngineError> {
            let rows: Vec<RawRecord> = (0..10)
                .map(|i| RawRecord {
                    ts: i * (interval_minutes as i64) * 60,
                    open: 100.0 + i as f64,
                    high: 101.0 + i as f64,
                    low: 99.0 + i as f64,
                    close: 100.5 + i as f64,
                    volume: 10.0,
                })
                .collect();
            Ok(RawOhlc::Records(rows))
        }
    }

    #[tokio::test]
    async fn loads_and_caches() {
        let fetcher = HistoricalFetcher::new(Arc::new(StaticSource), 60);
        let series = fetcher.load_from_source("NSE_FNO", "1", 1).await.unwrap();
        assert_eq!(series.len(), 10);
        // second call hits cache, not the rate limiter
        let again = fetcher.load_from_source("NSE_FNO", "1", 1).await.unwrap();
        assert_eq!(again.len(), 10);
    }

    #[tokio::test]
    async fn five_minute_request_resamples_from_one_minute() {
        let fetcher = HistoricalFetcher::new(Arc::new(StaticSource), 60);
        let series = fetcher.load_from_source("NSE_FNO", "1", 5).await.unwrap();
        assert!(series.interval_minutes == 5);
        assert!(series.len() <= 10);
    }

    #[test]
    fn rate_limiter_blocks_after_capacity() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn columnar_shape_normalises() {
        struct ColumnarSource;
        #[async_trait]
        impl OhlcSource for ColumnarSource {
            async fn fetch(&self, _s: &str, _id: &str, _i: u32) -> Result<RawOhlc, EngineError> {
                Ok(RawOhlc::Columnar(RawColumns {
                    ts: vec![0, 60],
                    open: vec![1.0, 2.0],
                    high: vec![1.5, 2.5],
                    low: vec![0.5, 1.5],
                    close: vec![1.2, 2.2],
                    volume: vec![5.0, 5.0],
                }))
            }
        }
        let fetcher = HistoricalFetcher::new(Arc::new(ColumnarSource), 60);
        let series = fetcher.load_from_source("NSE_FNO", "1", 1).await.unwrap();
        assert_eq!(series.len(), 2);
    }
}
