// =============================================================================
// Candle & CandleSeries
// =============================================================================
//
// A lazy-ish OHLCV container tagged by `(symbol, interval_minutes)`, with
// resampling to coarser timeframes. Index-aligned indicator helpers live
// alongside the series so callers don't juggle raw `&[f64]` slices at every
// call site (the teacher's `CandleBuffer` does the same: store once, derive
// many views).

use crate::error::EngineError;
use crate::indicators::{adx, atr, bollinger, ema, roc, rsi};

/// One OHLCV bar. `ts` is the bucket-start, unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_valid(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

/// Ordered sequence of candles for one `(symbol, interval_minutes)` pair.
///
/// Iteration via [`CandleSeries::cursor`] is restartable: the cursor is a
/// cheap value the caller can reset and replay independently of others
/// walking the same series.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    pub symbol: String,
    pub interval_minutes: u32,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, interval_minutes: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval_minutes,
            candles: Vec::new(),
        }
    }

    pub fn from_candles(symbol: impl Into<String>, interval_minutes: u32, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            interval_minutes,
            candles,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn cursor(&self) -> CandleCursor<'_> {
        CandleCursor { series: self, pos: 0 }
    }

    /// Resample this series from its current interval to a coarser one.
    ///
    /// `m` must be a positive multiple of `interval_minutes`; buckets are
    /// `floor(ts / (m*60))`, first open / max high / min low / last close /
    /// summed volume per spec §4.3.
    pub fn resample_to(&self, m: u32) -> Result<CandleSeries, EngineError> {
        if m == 0 || self.interval_minutes == 0 || m % self.interval_minutes != 0 || m <= self.interval_minutes {
            return Err(EngineError::ConfigurationInvalid(format!(
                "resample target {m} must be a multiple of current interval {} greater than it",
                self.interval_minutes
            )));
        }
        let bucket_secs = (m as i64) * 60;
        let mut out: Vec<Candle> = Vec::new();
        for c in &self.candles {
            let bucket_start = (c.ts / bucket_secs) * bucket_secs;
            match out.last_mut() {
                Some(last) if last.ts == bucket_start => {
                    last.high = last.high.max(c.high);
                    last.low = last.low.min(c.low);
                    last.close = c.close;
                    last.volume += c.volume;
                }
                _ => out.push(Candle {
                    ts: bucket_start,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                }),
            }
        }
        Ok(CandleSeries::from_candles(self.symbol.clone(), m, out))
    }

    pub fn ema(&self, n: usize) -> Vec<f64> {
        ema::calculate_ema(&self.closes(), n)
    }

    pub fn sma(&self, n: usize) -> Vec<f64> {
        crate::indicators::sma::calculate_sma(&self.closes(), n)
    }

    pub fn rsi(&self, n: usize) -> Vec<f64> {
        rsi::calculate_rsi(&self.closes(), n)
    }

    pub fn macd(&self, fast: usize, slow: usize, signal: usize) -> Option<crate::indicators::macd::MacdResult> {
        crate::indicators::macd::calculate_macd(&self.closes(), fast, slow, signal)
    }

    pub fn atr(&self, n: usize) -> Option<f64> {
        atr::calculate_atr(&self.candles, n)
    }

    pub fn bollinger(&self, n: usize) -> Option<bollinger::BollingerResult> {
        bollinger::calculate_bollinger(&self.closes(), n, 2.0)
    }

    pub fn donchian(&self, n: usize) -> Option<crate::indicators::donchian::DonchianResult> {
        crate::indicators::donchian::calculate_donchian(&self.candles, n)
    }

    pub fn rate_of_change(&self, n: usize) -> Vec<f64> {
        roc::calculate_roc(&self.closes(), n)
    }

    pub fn adx(&self, n: usize) -> Option<f64> {
        adx::calculate_adx(&self.candles, n)
    }

    pub fn supertrend(&self, period: usize, multiplier: f64) -> Option<crate::indicators::supertrend::SupertrendResult> {
        crate::indicators::supertrend::calculate_supertrend(&self.candles, period, multiplier)
    }

    pub fn holy_grail(&self) -> Option<crate::indicators::holy_grail::HolyGrail> {
        crate::indicators::holy_grail::calculate(self)
    }
}

/// A restartable cursor over a [`CandleSeries`]. Cheap to clone/reset so
/// multiple consumers (e.g. a 1m and a 5m view) can walk the same backing
/// series independently.
pub struct CandleCursor<'a> {
    series: &'a CandleSeries,
    pos: usize,
}

impl<'a> CandleCursor<'a> {
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl<'a> Iterator for CandleCursor<'a> {
    type Item = &'a Candle;

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.series.candles.get(self.pos)?;
        self.pos += 1;
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle { ts, open: o, high: h, low: l, close: c, volume: v }
    }

    #[test]
    fn resample_basic_5_from_1() {
        // closes [10, 11, 12, 13, 14], one-minute bars starting at ts=0
        let mut s = CandleSeries::new("NIFTY", 1);
        s.push(candle(0, 10.0, 10.5, 9.5, 10.0, 100.0));
        s.push(candle(60, 10.0, 11.2, 9.8, 11.0, 100.0));
        s.push(candle(120, 11.0, 12.1, 10.9, 12.0, 100.0));
        s.push(candle(180, 12.0, 13.3, 11.8, 13.0, 100.0));
        s.push(candle(240, 13.0, 14.4, 12.9, 14.0, 100.0));

        let r = s.resample_to(5).unwrap();
        assert_eq!(r.len(), 1);
        let bar = &r.as_slice()[0];
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.close, 14.0);
        assert_eq!(bar.high, 14.4);
        assert_eq!(bar.low, 9.5);
        assert_eq!(bar.volume, 500.0);
    }

    #[test]
    fn resample_rejects_non_multiple() {
        let s = CandleSeries::new("NIFTY", 3);
        assert!(s.resample_to(7).is_err());
    }

    #[test]
    fn resample_rejects_non_coarsening() {
        let s = CandleSeries::new("NIFTY", 5);
        assert!(s.resample_to(5).is_err());
        assert!(s.resample_to(1).is_err());
    }

    #[test]
    fn cursor_is_restartable() {
        let mut s = CandleSeries::new("NIFTY", 1);
        s.push(candle(0, 1.0, 1.0, 1.0, 1.0, 1.0));
        s.push(candle(60, 2.0, 2.0, 2.0, 2.0, 1.0));
        let mut cur = s.cursor();
        assert_eq!(cur.next().unwrap().close, 1.0);
        cur.reset();
        assert_eq!(cur.next().unwrap().close, 1.0);
    }

    #[test]
    fn candle_validity() {
        let c = candle(0, 10.0, 11.0, 9.0, 10.5, 1.0);
        assert!(c.is_valid());
        let bad = candle(0, 10.0, 9.5, 9.0, 10.5, 1.0);
        assert!(!bad.is_valid());
    }
}
