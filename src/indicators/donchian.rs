// =============================================================================
// Donchian Channel
// =============================================================================
//
// Upper = highest high over `period` bars; lower = lowest low; middle is
// their average.

use crate::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonchianResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn calculate_donchian(candles: &[Candle], period: usize) -> Option<DonchianResult> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let upper = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lower = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if !upper.is_finite() || !lower.is_finite() {
        return None;
    }
    Some(DonchianResult { upper, middle: (upper + lower) / 2.0, lower })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64) -> Candle {
        Candle { ts: 0, open: (h + l) / 2.0, high: h, low: l, close: (h + l) / 2.0, volume: 1.0 }
    }

    #[test]
    fn donchian_basic() {
        let candles = vec![candle(10.0, 5.0), candle(12.0, 6.0), candle(9.0, 4.0)];
        let r = calculate_donchian(&candles, 3).unwrap();
        assert_eq!(r.upper, 12.0);
        assert_eq!(r.lower, 4.0);
        assert_eq!(r.middle, 8.0);
    }

    #[test]
    fn donchian_insufficient_data() {
        let candles = vec![candle(10.0, 5.0)];
        assert!(calculate_donchian(&candles, 3).is_none());
    }
}
