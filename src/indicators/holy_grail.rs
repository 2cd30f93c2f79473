// =============================================================================
// Holy Grail composite signal
// =============================================================================
//
// Aggregates SMA/EMA bias, MACD+RSI momentum, and ADX trend strength into a
// single directional read, gated by a timeframe-dependent ADX threshold.

use crate::candle::CandleSeries;
use crate::indicators::macd::MacdResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsSignal {
    None,
    BuyCe,
    BuyCeWeak,
    BuyPe,
    BuyPeWeak,
}

#[derive(Debug, Clone, Copy)]
pub struct HolyGrail {
    pub bias: Bias,
    pub momentum: Momentum,
    pub adx: f64,
    pub rsi14: f64,
    pub atr14: f64,
    pub macd: MacdResult,
    pub sma50: f64,
    pub ema200: f64,
    pub proceed: bool,
    pub options_signal: OptionsSignal,
    pub signal_strength: f64,
    pub adx_threshold: f64,
}

/// ADX threshold as a function of bar interval per spec §4.3.
pub fn adx_threshold_for_interval(interval_minutes: u32) -> f64 {
    match interval_minutes {
        1 => 10.0,
        2..=5 => 15.0,
        _ => 20.0,
    }
}

pub fn calculate(series: &CandleSeries) -> Option<HolyGrail> {
    let closes = series.closes();
    let sma50 = *series.sma(50).last()?;
    let ema200 = *series.ema(200).last()?;
    let rsi14 = *series.rsi(14).last()?;
    let atr14 = series.atr(14)?;
    let adx = series.adx(14)?;
    let macd = series.macd(12, 26, 9)?;
    let _ = closes;

    let bias = if sma50 > ema200 {
        Bias::Bullish
    } else if sma50 < ema200 {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    let macd_up = macd.macd > macd.signal;
    let rsi_up = rsi14 > 50.0;
    let momentum = if macd_up && rsi_up {
        Momentum::Up
    } else if !macd_up && !rsi_up {
        Momentum::Down
    } else {
        Momentum::Flat
    };

    let adx_threshold = adx_threshold_for_interval(series.interval_minutes);
    let bias_aligned_momentum = (bias == Bias::Bullish && momentum == Momentum::Up)
        || (bias == Bias::Bearish && momentum == Momentum::Down);
    let proceed = adx >= adx_threshold && bias_aligned_momentum;

    let (rsi_alignment, macd_alignment, momentum_alignment) = match bias {
        Bias::Bullish => (
            if rsi_up { 1.0 } else { 0.0 },
            if macd_up { 1.0 } else { 0.0 },
            if momentum == Momentum::Up { 1.0 } else { 0.0 },
        ),
        Bias::Bearish => (
            if !rsi_up { 1.0 } else { 0.0 },
            if !macd_up { 1.0 } else { 0.0 },
            if momentum == Momentum::Down { 1.0 } else { 0.0 },
        ),
        Bias::Neutral => (0.0, 0.0, 0.0),
    };

    let signal_strength = 0.3 * (adx / 50.0).min(1.0)
        + 0.2 * rsi_alignment
        + 0.3 * macd_alignment
        + 0.2 * momentum_alignment;

    let options_signal = if !proceed || bias == Bias::Neutral {
        OptionsSignal::None
    } else if bias == Bias::Bullish {
        if signal_strength >= 0.6 {
            OptionsSignal::BuyCe
        } else if signal_strength >= 0.4 {
            OptionsSignal::BuyCeWeak
        } else {
            OptionsSignal::None
        }
    } else if signal_strength >= 0.6 {
        OptionsSignal::BuyPe
    } else if signal_strength >= 0.4 {
        OptionsSignal::BuyPeWeak
    } else {
        OptionsSignal::None
    };

    Some(HolyGrail {
        bias,
        momentum,
        adx,
        rsi14,
        atr14,
        macd,
        sma50,
        ema200,
        proceed,
        options_signal,
        signal_strength,
        adx_threshold,
    })
}
