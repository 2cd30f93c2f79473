// =============================================================================
// Position Tracker
// =============================================================================
//
// The sole owner of all Positions (spec §4.8, §9 Design Notes: "Mutable
// shared position lists indexed by composite keys -> a PositionTracker
// abstraction whose only external surface is operations that return
// snapshots"). Internal storage maps `(segment, security_id, side)` to an
// owning `Position` with exclusive write access via one mutex.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::balance::BalanceProvider;
use crate::error::EngineError;
use crate::money::Money;
use crate::types::{ExitReason, Order, OrderStatus, Position, PositionKey, Side};

const MAX_CLOSED_HISTORY: usize = 30;

struct Inner {
    open: HashMap<PositionKey, Position>,
    closed: Vec<Position>,
}

pub struct PositionTracker {
    inner: Mutex<Inner>,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { open: HashMap::new(), closed: Vec::new() }) }
    }

    /// Rehydrate open positions at startup; closed history is bounded to the
    /// last `MAX_CLOSED_HISTORY` entries.
    pub fn rehydrate(open: Vec<Position>, mut closed: Vec<Position>) -> Self {
        closed.truncate(MAX_CLOSED_HISTORY);
        let map = open.into_iter().map(|p| (p.key(), p)).collect();
        Self { inner: Mutex::new(Inner { open: map, closed }) }
    }

    /// Apply a filled order to the ledger. BUY opens or grows a position with
    /// a quantity-weighted average entry; SELL decrements `net_qty`, and on
    /// reaching zero closes it and releases the balance.
    pub fn apply_fill(&self, order: &Order, fee: Money, balance: &BalanceProvider, exit_reason: Option<ExitReason>, now: i64) -> Result<(), EngineError> {
        if order.status != OrderStatus::Filled {
            return Ok(());
        }
        // Keyed on the BUY side regardless of the order's own side: this is
        // an options-buying engine (spec §3, "Side is LONG for options
        // buying"), so SELL orders close out the existing BUY-side position.
        let lookup_key: PositionKey = (order.segment.clone(), order.security_id.clone(), Side::Buy);
        let mut inner = self.inner.lock();

        match order.side {
            Side::Buy => {
                let entry = inner.open.entry(lookup_key).or_insert_with(|| Position {
                    segment: order.segment.clone(),
                    security_id: order.security_id.clone(),
                    side: Side::Buy,
                    buy_avg: Money::ZERO,
                    net_qty: 0,
                    entry_time: now,
                    current_price: order.avg_price,
                    pnl: Money::ZERO,
                    pnl_pct: 0.0,
                    option_type: None,
                    strike: None,
                    expiry: None,
                    exit_price: None,
                    exit_reason: None,
                    exit_time: None,
                    high_water_mark: order.avg_price,
                });
                let prior_qty = entry.net_qty as f64;
                let new_qty = order.quantity as f64;
                let total_qty = prior_qty + new_qty;
                if total_qty > 0.0 {
                    let weighted = (entry.buy_avg.to_f64() * prior_qty + order.avg_price.to_f64() * new_qty) / total_qty;
                    entry.buy_avg = Money::from_f64(weighted);
                }
                entry.net_qty += order.quantity;
                balance.debit(order.avg_price * order.quantity + fee)?;
            }
            Side::Sell => {
                let position = inner
                    .open
                    .get_mut(&lookup_key)
                    .ok_or_else(|| EngineError::OversellAttempt { attempted: order.quantity.to_string(), held: "0".to_string() })?;
                if order.quantity > position.net_qty {
                    return Err(EngineError::OversellAttempt {
                        attempted: order.quantity.to_string(),
                        held: position.net_qty.to_string(),
                    });
                }
                position.net_qty -= order.quantity;
                let proceeds = order.avg_price * order.quantity;
                balance.credit(proceeds - fee)?;

                if position.net_qty == 0 {
                    position.exit_price = Some(order.avg_price);
                    position.exit_reason = exit_reason;
                    position.exit_time = Some(now);
                    let closed = inner.open.remove(&lookup_key).expect("position present");
                    inner.closed.insert(0, closed);
                    inner.closed.truncate(MAX_CLOSED_HISTORY);
                }
            }
        }
        Ok(())
    }

    /// Mark-to-market: recompute `pnl`/`pnl_pct` for the given position.
    pub fn update_current_price(&self, segment: &str, security_id: &str, side: Side, price: Money) {
        let mut inner = self.inner.lock();
        let key = (segment.to_string(), security_id.to_string(), side);
        if let Some(position) = inner.open.get_mut(&key) {
            position.current_price = price;
            if price.to_f64() > position.high_water_mark.to_f64() {
                position.high_water_mark = price;
            }
            let qty = Decimal::from(position.net_qty);
            position.pnl = Money::new((price.as_decimal() - position.buy_avg.as_decimal()) * qty);
            position.pnl_pct = if position.buy_avg.to_f64() != 0.0 {
                (price.to_f64() - position.buy_avg.to_f64()) / position.buy_avg.to_f64() * 100.0
            } else {
                0.0
            };
        }
    }

    pub fn get_position(&self, segment: &str, security_id: &str, side: Side) -> Option<Position> {
        self.inner.lock().open.get(&(segment.to_string(), security_id.to_string(), side)).cloned()
    }

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.inner.lock().open.values().cloned().collect()
    }

    pub fn get_closed_positions(&self, count: usize) -> Vec<Position> {
        self.inner.lock().closed.iter().take(count).cloned().collect()
    }

    pub fn get_positions(&self) -> (Vec<Position>, Vec<Position>) {
        let inner = self.inner.lock();
        (inner.open.values().cloned().collect(), inner.closed.clone())
    }

    pub fn get_total_pnl(&self) -> Money {
        let inner = self.inner.lock();
        let open_pnl = inner.open.values().fold(Money::ZERO, |acc, p| acc + p.pnl);
        let closed_pnl = inner.closed.iter().fold(Money::ZERO, |acc, p| acc + p.pnl);
        open_pnl + closed_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_order(segment: &str, sid: &str, side: Side, qty: u32, price: f64) -> Order {
        Order {
            order_id: "o1".into(),
            security_id: sid.into(),
            segment: segment.into(),
            side,
            quantity: qty,
            avg_price: Money::from_f64(price),
            status: OrderStatus::Filled,
            timestamp: 0,
            idempotency_key: None,
        }
    }

    #[test]
    fn buy_then_partial_sell_keeps_position_open() {
        let tracker = PositionTracker::new();
        let balance = BalanceProvider::new(Money::from_f64(1_000_000.0));
        let buy = filled_order("NSE_FNO", "1", Side::Buy, 75, 100.0);
        tracker.apply_fill(&buy, Money::ZERO, &balance, None, 0).unwrap();

        let sell = filled_order("NSE_FNO", "1", Side::Sell, 25, 110.0);
        tracker.apply_fill(&sell, Money::ZERO, &balance, Some(ExitReason::TakeProfit), 10).unwrap();

        let position = tracker.get_position("NSE_FNO", "1", Side::Buy).unwrap();
        assert_eq!(position.net_qty, 50);
        assert!(!position.is_closed());
    }

    #[test]
    fn full_sell_closes_position_exactly_once() {
        let tracker = PositionTracker::new();
        let balance = BalanceProvider::new(Money::from_f64(1_000_000.0));
        let buy = filled_order("NSE_FNO", "1", Side::Buy, 75, 100.0);
        tracker.apply_fill(&buy, Money::ZERO, &balance, None, 0).unwrap();
        let sell = filled_order("NSE_FNO", "1", Side::Sell, 75, 110.0);
        tracker.apply_fill(&sell, Money::ZERO, &balance, Some(ExitReason::TakeProfit), 10).unwrap();

        assert!(tracker.get_position("NSE_FNO", "1", Side::Buy).is_none());
        let closed = tracker.get_closed_positions(10);
        assert_eq!(closed.len(), 1);
        assert!(closed[0].exit_price.is_some());
        assert!(closed[0].exit_reason.is_some());
        assert!(closed[0].exit_time.is_some());
    }

    #[test]
    fn oversell_rejected() {
        let tracker = PositionTracker::new();
        let balance = BalanceProvider::new(Money::from_f64(1_000_000.0));
        let buy = filled_order("NSE_FNO", "1", Side::Buy, 25, 100.0);
        tracker.apply_fill(&buy, Money::ZERO, &balance, None, 0).unwrap();
        let sell = filled_order("NSE_FNO", "1", Side::Sell, 50, 110.0);
        let err = tracker.apply_fill(&sell, Money::ZERO, &balance, None, 10).unwrap_err();
        assert!(matches!(err, EngineError::OversellAttempt { .. }));
    }

    #[test]
    fn repeated_buys_weight_average_entry() {
        let tracker = PositionTracker::new();
        let balance = BalanceProvider::new(Money::from_f64(1_000_000.0));
        tracker.apply_fill(&filled_order("NSE_FNO", "1", Side::Buy, 50, 100.0), Money::ZERO, &balance, None, 0).unwrap();
        tracker.apply_fill(&filled_order("NSE_FNO", "1", Side::Buy, 50, 120.0), Money::ZERO, &balance, None, 0).unwrap();
        let position = tracker.get_position("NSE_FNO", "1", Side::Buy).unwrap();
        assert_eq!(position.buy_avg, Money::from_f64(110.0));
        assert_eq!(position.net_qty, 100);
    }

    #[test]
    fn mark_to_market_updates_pnl_and_high_water_mark() {
        let tracker = PositionTracker::new();
        let balance = BalanceProvider::new(Money::from_f64(1_000_000.0));
        tracker.apply_fill(&filled_order("NSE_FNO", "1", Side::Buy, 10, 100.0), Money::ZERO, &balance, None, 0).unwrap();
        tracker.update_current_price("NSE_FNO", "1", Side::Buy, Money::from_f64(120.0));
        let position = tracker.get_position("NSE_FNO", "1", Side::Buy).unwrap();
        assert_eq!(position.pnl, Money::from_f64(200.0));
        assert_eq!(position.high_water_mark, Money::from_f64(120.0));

        tracker.update_current_price("NSE_FNO", "1", Side::Buy, Money::from_f64(90.0));
        let position = tracker.get_position("NSE_FNO", "1", Side::Buy).unwrap();
        // high water mark never drops
        assert_eq!(position.high_water_mark, Money::from_f64(120.0));
    }
}
