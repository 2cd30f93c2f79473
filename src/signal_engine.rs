// =============================================================================
// Signal Engine
// =============================================================================
//
// Per-symbol, multi-timeframe decision returning `{none, long_ce, long_pe}`
// (spec §4.4). Fallbacks apply in fixed order; the first that produces a
// non-none directional answer wins.

use crate::candle::CandleSeries;
use crate::indicators::holy_grail::{Bias, HolyGrail, Momentum, OptionsSignal};
use crate::indicators::supertrend::Trend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDecision {
    None,
    LongCe,
    LongPe,
}

const SUPERTREND_PERIOD: usize = 10;
const SUPERTREND_MULTIPLIER: f64 = 3.0;
const EMA_FAST: usize = 9;
const EMA_SLOW: usize = 21;
const RSI_PERIOD: usize = 14;

pub fn decide(primary: &CandleSeries, secondary: &CandleSeries) -> SignalDecision {
    let hg1 = primary.holy_grail();
    let hg2 = secondary.holy_grail();

    if let (Some(a), Some(b)) = (&hg1, &hg2) {
        if both_bullish_proceeding(a, b) {
            return SignalDecision::LongCe;
        }
        if both_bearish_proceeding(a, b) {
            return SignalDecision::LongPe;
        }
        if let Some(d) = combined_signal_agreement(a, b) {
            return d;
        }
    }

    if let Some(d) = supertrend_agreement(primary, secondary) {
        return d;
    }

    if let Some(d) = ema_rsi_agreement(primary, secondary) {
        return d;
    }

    SignalDecision::None
}

fn both_bullish_proceeding(a: &HolyGrail, b: &HolyGrail) -> bool {
    a.bias == Bias::Bullish && a.momentum == Momentum::Up && a.proceed && b.bias == Bias::Bullish && b.momentum == Momentum::Up && b.proceed
}

fn both_bearish_proceeding(a: &HolyGrail, b: &HolyGrail) -> bool {
    a.bias == Bias::Bearish && a.momentum == Momentum::Down && a.proceed && b.bias == Bias::Bearish && b.momentum == Momentum::Down && b.proceed
}

fn is_ce(signal: OptionsSignal) -> bool {
    matches!(signal, OptionsSignal::BuyCe | OptionsSignal::BuyCeWeak)
}

fn is_pe(signal: OptionsSignal) -> bool {
    matches!(signal, OptionsSignal::BuyPe | OptionsSignal::BuyPeWeak)
}

fn combined_signal_agreement(a: &HolyGrail, b: &HolyGrail) -> Option<SignalDecision> {
    if is_ce(a.options_signal) && is_ce(b.options_signal) {
        Some(SignalDecision::LongCe)
    } else if is_pe(a.options_signal) && is_pe(b.options_signal) {
        Some(SignalDecision::LongPe)
    } else {
        None
    }
}

fn supertrend_agreement(primary: &CandleSeries, secondary: &CandleSeries) -> Option<SignalDecision> {
    let a = primary.supertrend(SUPERTREND_PERIOD, SUPERTREND_MULTIPLIER)?;
    let b = secondary.supertrend(SUPERTREND_PERIOD, SUPERTREND_MULTIPLIER)?;
    match (a.trend, b.trend) {
        (Trend::Up, Trend::Up) => Some(SignalDecision::LongCe),
        (Trend::Down, Trend::Down) => Some(SignalDecision::LongPe),
        _ => None,
    }
}

fn ema_rsi_agreement(primary: &CandleSeries, secondary: &CandleSeries) -> Option<SignalDecision> {
    let direction = |series: &CandleSeries| -> Option<SignalDecision> {
        let ema_fast = *series.ema(EMA_FAST).last()?;
        let ema_slow = *series.ema(EMA_SLOW).last()?;
        let rsi = *series.rsi(RSI_PERIOD).last()?;
        if ema_fast > ema_slow && rsi > 50.0 {
            Some(SignalDecision::LongCe)
        } else if ema_fast < ema_slow && rsi < 50.0 {
            Some(SignalDecision::LongPe)
        } else {
            None
        }
    };
    let a = direction(primary)?;
    let b = direction(secondary)?;
    if a == b {
        Some(a)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;

    fn trending_series(interval: u32, start: f64, step: f64, n: i64) -> CandleSeries {
        let mut s = CandleSeries::new("NIFTY", interval);
        for i in 0..n {
            let base = start + i as f64 * step;
            s.push(Candle { ts: i * (interval as i64) * 60, open: base, high: base + 5.0, low: base - 5.0, close: base + 3.0, volume: 1000.0 });
        }
        s
    }

    #[test]
    fn both_timeframes_bullish_gives_long_ce() {
        let primary = trending_series(1, 15000.0, 2.0, 300);
        let secondary = trending_series(5, 15000.0, 10.0, 300);
        assert_eq!(decide(&primary, &secondary), SignalDecision::LongCe);
    }

    #[test]
    fn both_timeframes_bearish_gives_long_pe() {
        let primary = trending_series(1, 20000.0, -2.0, 300);
        let secondary = trending_series(5, 20000.0, -10.0, 300);
        assert_eq!(decide(&primary, &secondary), SignalDecision::LongPe);
    }

    #[test]
    fn insufficient_history_returns_none() {
        let primary = trending_series(1, 15000.0, 2.0, 5);
        let secondary = trending_series(5, 15000.0, 2.0, 5);
        assert_eq!(decide(&primary, &secondary), SignalDecision::None);
    }

    #[test]
    fn flat_market_returns_none() {
        let primary = trending_series(1, 15000.0, 0.0, 300);
        let secondary = trending_series(5, 15000.0, 0.0, 300);
        assert_eq!(decide(&primary, &secondary), SignalDecision::None);
    }
}
