// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow); signal line = EMA(signal) of the MACD
// line; histogram = macd - signal.

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub hist: f64,
}

/// Compute the most recent MACD reading for the given closes.
///
/// Returns `None` until enough history exists to seed both the slow EMA and
/// the signal-line EMA of the MACD series.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
        return None;
    }
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return None;
    }

    // ema_fast is longer than ema_slow by (slow - fast) leading values; align
    // both series to the tail shared by the slower EMA.
    let offset = ema_fast.len() - ema_slow.len();
    let macd_series: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, &slow_v)| ema_fast[i + offset] - slow_v)
        .collect();

    if macd_series.len() < signal {
        return None;
    }
    let signal_series = calculate_ema(&macd_series, signal);
    let signal_last = *signal_series.last()?;
    let macd_last = *macd_series.last()?;
    let hist = macd_last - signal_last;
    if !hist.is_finite() {
        return None;
    }
    Some(MacdResult { macd: macd_last, signal: signal_last, hist })
}
