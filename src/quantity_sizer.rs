// =============================================================================
// Quantity Sizer
// =============================================================================
//
// `lots = floor((available * allocation_pct * (1 - slippage_buffer)) /
// (premium * lot_size))`, clamped to `[1, max_lots_per_trade]`. Returns 0
// only when premium is below the configured floor; otherwise a trade always
// sizes to at least one lot and leaves an unaffordable budget for the
// broker's balance check to reject (spec §4.6).

use crate::money::Money;

pub struct SizerConfig {
    pub allocation_pct: f64,
    pub slippage_buffer_pct: f64,
    pub max_lots_per_trade: u32,
    pub min_premium_price: f64,
}

pub struct Sizing {
    pub lots: u32,
    pub quantity: u32,
}

pub fn size(config: &SizerConfig, available: Money, premium: f64, lot_size: u32) -> Sizing {
    if premium < config.min_premium_price {
        return Sizing { lots: 0, quantity: 0 };
    }
    let usable = available.to_f64() * config.allocation_pct * (1.0 - config.slippage_buffer_pct);
    let denom = premium * lot_size as f64;
    if denom <= 0.0 {
        return Sizing { lots: 0, quantity: 0 };
    }
    let raw_lots = (usable / denom).floor();
    let lots = (raw_lots.max(0.0) as u32).clamp(1, config.max_lots_per_trade);
    Sizing { lots, quantity: lots * lot_size }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SizerConfig {
        SizerConfig { allocation_pct: 0.1, slippage_buffer_pct: 0.01, max_lots_per_trade: 5, min_premium_price: 5.0 }
    }

    #[test]
    fn below_min_premium_returns_zero() {
        let sizing = size(&config(), Money::from_f64(200000.0), 4.0, 50);
        assert_eq!(sizing.lots, 0);
        assert_eq!(sizing.quantity, 0);
    }

    #[test]
    fn computes_lots_within_budget() {
        let sizing = size(&config(), Money::from_f64(200000.0), 100.0, 50);
        // usable = 200000*0.1*0.99 = 19800; denom = 5000; floor(3.96) = 3
        assert_eq!(sizing.lots, 3);
        assert_eq!(sizing.quantity, 150);
    }

    #[test]
    fn clamped_to_max_lots() {
        let sizing = size(&config(), Money::from_f64(2_000_000.0), 10.0, 50);
        assert_eq!(sizing.lots, 5);
    }

    #[test]
    fn small_budget_still_floors_to_one_lot() {
        let sizing = size(&config(), Money::from_f64(1000.0), 100.0, 50);
        assert_eq!(sizing.lots, 1);
        assert_eq!(sizing.quantity, 50);
    }
}
