// =============================================================================
// Supertrend
// =============================================================================
//
// ATR-band trend indicator. Basic bands are `mid ± multiplier * atr` where
// `mid = (high + low) / 2`, `atr` is Wilder-smoothed. The final band trails:
// while pinned to the upper band, it only ratchets down (`min(new, prior)`)
// and flips to the lower band once price closes above it; symmetric on the
// lower side.

use crate::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendResult {
    pub value: f64,
    pub trend: Trend,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Upper,
    Lower,
}

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    (1..candles.len())
        .map(|i| {
            let h = candles[i].high;
            let l = candles[i].low;
            let pc = candles[i - 1].close;
            (h - l).max((h - pc).abs()).max((l - pc).abs())
        })
        .collect()
}

fn wilder_atr_series(trs: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || trs.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    let mut atr: f64 = trs[..period].iter().sum::<f64>() / period as f64;
    out.push(atr);
    let period_f = period as f64;
    for &tr in &trs[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        out.push(atr);
    }
    out
}

/// Compute the latest Supertrend reading over the whole candle history.
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Option<SupertrendResult> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let trs = true_ranges(candles);
    let atr_series = wilder_atr_series(&trs, period);
    if atr_series.is_empty() {
        return None;
    }

    // atr_series[j] aligns with candles[period + j] (trs[k] aligns with
    // candles[k+1], and the wilder series starts at trs[period-1]).
    let mut side = Side::Upper;
    let mut final_band = 0.0_f64;
    let mut initialised = false;

    for (j, &atr) in atr_series.iter().enumerate() {
        let idx = period + j;
        let c = &candles[idx];
        let mid = (c.high + c.low) / 2.0;
        let basic_upper = mid + multiplier * atr;
        let basic_lower = mid - multiplier * atr;

        if !initialised {
            side = if c.close <= basic_upper { Side::Upper } else { Side::Lower };
            final_band = if side == Side::Upper { basic_upper } else { basic_lower };
            initialised = true;
            continue;
        }

        match side {
            Side::Upper => {
                if c.close <= basic_upper {
                    final_band = basic_upper.min(final_band);
                } else {
                    side = Side::Lower;
                    final_band = basic_lower;
                }
            }
            Side::Lower => {
                if c.close >= basic_lower {
                    final_band = basic_lower.max(final_band);
                } else {
                    side = Side::Upper;
                    final_band = basic_upper;
                }
            }
        }
    }

    if !final_band.is_finite() {
        return None;
    }
    let trend = match side {
        Side::Upper => Trend::Down,
        Side::Lower => Trend::Up,
    };
    Some(SupertrendResult { value: final_band, trend })
}
