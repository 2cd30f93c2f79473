// =============================================================================
// Domain types
// =============================================================================
//
// Tick, Instrument, Order, Position and the small enums that tag them.
// Money fields use `rust_decimal::Decimal` (see `money.rs`); everything else
// uses plain numeric/string types matching the wire shapes in spec §3.

use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Ce,
    Pe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    Index,
    Optidx,
    Optfut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeSegment {
    IdxI,
    NseEq,
    BseEq,
    NseFno,
    BseFno,
    NseCurrency,
    BseCurrency,
    McxComm,
}

/// Exit reasons recognised by the risk manager, in their fixed evaluation
/// order (spec §4.10 step 3e).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeStop,
    TrailingStop,
    DailyLossCap,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TimeStop => "TIME_STOP",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::DailyLossCap => "DAILY_LOSS_CAP",
        }
    }
}

/// A single live market tick. `ltp` is the last traded price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub segment: String,
    pub security_id: String,
    pub ltp: f64,
    pub ts: i64,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub atp: Option<f64>,
    pub volume: Option<f64>,
}

impl Tick {
    pub fn is_valid(&self) -> bool {
        !self.segment.is_empty() && !self.security_id.is_empty() && self.ltp >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub security_id: String,
    pub underlying: String,
    pub segment: String,
    pub instrument_type: InstrumentType,
    pub strike: Option<f64>,
    pub option_type: Option<OptionType>,
    pub expiry: Option<String>,
    pub lot_size: u32,
    pub exchange_segment: ExchangeSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub security_id: String,
    pub segment: String,
    pub side: Side,
    pub quantity: u32,
    pub avg_price: Money,
    pub status: OrderStatus,
    pub timestamp: i64,
    pub idempotency_key: Option<String>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.status != OrderStatus::Pending
    }
}

/// Position key: `(segment, security_id, side)`.
pub type PositionKey = (String, String, Side);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub segment: String,
    pub security_id: String,
    pub side: Side,
    pub buy_avg: Money,
    pub net_qty: u32,
    pub entry_time: i64,
    pub current_price: Money,
    pub pnl: Money,
    pub pnl_pct: f64,
    pub option_type: Option<OptionType>,
    pub strike: Option<f64>,
    pub expiry: Option<String>,
    pub exit_price: Option<Money>,
    pub exit_reason: Option<ExitReason>,
    pub exit_time: Option<i64>,
    /// Highest price observed since the position opened (long-only peak
    /// tracking per spec §9 Open Questions; undefined for SELL-side).
    pub high_water_mark: Money,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        (self.segment.clone(), self.security_id.clone(), self.side)
    }

    pub fn is_closed(&self) -> bool {
        self.net_qty == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_missing_ids_invalid() {
        let t = Tick { segment: String::new(), security_id: "1".into(), ltp: 1.0, ts: 0, day_high: None, day_low: None, atp: None, volume: None };
        assert!(!t.is_valid());
    }

    #[test]
    fn tick_negative_ltp_invalid() {
        let t = Tick { segment: "NSE_FNO".into(), security_id: "1".into(), ltp: -1.0, ts: 0, day_high: None, day_low: None, atp: None, volume: None };
        assert!(!t.is_valid());
    }

    #[test]
    fn exit_reason_strings() {
        assert_eq!(ExitReason::TakeProfit.as_str(), "TAKE_PROFIT");
        assert_eq!(ExitReason::DailyLossCap.as_str(), "DAILY_LOSS_CAP");
    }
}
