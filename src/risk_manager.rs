// =============================================================================
// Unified Risk Manager (the heart)
// =============================================================================
//
// Independent loop at `risk_check_interval`. Per spec §4.10: daily-loss-cap
// check first, then cooldown gate, then per-position TP/SL/time-stop/
// trailing-stop evaluation in fixed order, with idempotent exit execution
// guarded by an at-most-one-in-flight-exit-per-position pending set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use crate::balance::BalanceProvider;
use crate::broker::Broker;
use crate::error::EngineError;
use crate::money::Money;
use crate::position_tracker::PositionTracker;
use crate::retry::CancelToken;
use crate::tick_cache::TickCache;
use crate::types::{ExitReason, OrderType, Position, Side};

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[derive(Clone, Copy, Debug)]
pub struct RiskConfig {
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub trail_pct: f64,
    pub time_stop_seconds: i64,
    pub enable_time_stop: bool,
    pub enable_daily_loss_cap: bool,
    pub enable_cooldown: bool,
    pub max_daily_loss: Money,
    pub cooldown_after_loss_seconds: i64,
}

/// First-match-wins exit reason for a single position, per spec §4.10 step
/// 3e. Strict inequalities at TP/SL per the boundary table in spec §8.
fn determine_exit_reason(position: &Position, price: f64, now: i64, config: &RiskConfig) -> Option<ExitReason> {
    let entry = position.buy_avg.to_f64();
    if entry <= 0.0 {
        return None;
    }
    if (price - entry) / entry >= config.tp_pct {
        return Some(ExitReason::TakeProfit);
    }
    if (entry - price) / entry >= config.sl_pct {
        return Some(ExitReason::StopLoss);
    }
    if config.enable_time_stop && now - position.entry_time >= config.time_stop_seconds {
        return Some(ExitReason::TimeStop);
    }
    let hwm = position.high_water_mark.to_f64();
    if hwm > entry && price < hwm * (1.0 - config.trail_pct) {
        return Some(ExitReason::TrailingStop);
    }
    None
}

pub struct RiskManager {
    positions: Arc<PositionTracker>,
    tick_cache: Arc<TickCache>,
    broker: Arc<dyn Broker>,
    balance: Arc<BalanceProvider>,
    config: RiskConfig,
    session_start_equity: Money,
    pending_exits: Mutex<HashSet<(String, String)>>,
    last_loss_time: Mutex<Option<i64>>,
    cancel: CancelToken,
}

impl RiskManager {
    pub fn new(
        positions: Arc<PositionTracker>,
        tick_cache: Arc<TickCache>,
        broker: Arc<dyn Broker>,
        balance: Arc<BalanceProvider>,
        config: RiskConfig,
        session_start_equity: Money,
        cancel: CancelToken,
    ) -> Self {
        Self {
            positions,
            tick_cache,
            broker,
            balance,
            config,
            session_start_equity,
            pending_exits: Mutex::new(HashSet::new()),
            last_loss_time: Mutex::new(None),
            cancel,
        }
    }

    fn current_equity(&self) -> Money {
        let snapshot = self.balance.snapshot();
        snapshot.available + snapshot.used + self.positions.get_total_pnl()
    }

    fn in_cooldown(&self, now: i64) -> bool {
        if !self.config.enable_cooldown {
            return false;
        }
        match *self.last_loss_time.lock() {
            Some(t) => now - t < self.config.cooldown_after_loss_seconds,
            None => false,
        }
    }

    /// One iteration of the loop. Cooperative: never holds a lock across an
    /// `.await`.
    pub async fn tick(&self) -> Result<(), EngineError> {
        let now = now_secs();
        let equity = self.current_equity();
        let drawdown = Money::new(self.session_start_equity.as_decimal() - equity.as_decimal());

        if self.config.enable_daily_loss_cap && drawdown.as_decimal() > self.config.max_daily_loss.as_decimal() {
            warn!(drawdown = %drawdown, "daily loss cap tripped, closing all positions");
            self.close_all_positions(ExitReason::DailyLossCap).await;
            return Ok(());
        }

        if self.in_cooldown(now) {
            return Ok(());
        }

        for position in self.positions.get_open_positions() {
            self.evaluate_position(&position, now).await?;
        }
        Ok(())
    }

    async fn evaluate_position(&self, position: &Position, now: i64) -> Result<(), EngineError> {
        let ltp = match self.tick_cache.ltp(&position.segment, &position.security_id, true).await? {
            Some(p) if p > 0.0 => p,
            _ => return Ok(()),
        };

        self.positions.update_current_price(&position.segment, &position.security_id, position.side, Money::from_f64(ltp));

        let refreshed = match self.positions.get_position(&position.segment, &position.security_id, position.side) {
            Some(p) => p,
            None => return Ok(()),
        };

        if let Some(reason) = determine_exit_reason(&refreshed, ltp, now, &self.config) {
            self.execute_exit(&refreshed, reason).await?;
        }
        Ok(())
    }

    /// Exit execution with idempotency (spec §4.10). Guaranteed cleanup of
    /// the pending marker even on error.
    async fn execute_exit(&self, position: &Position, reason: ExitReason) -> Result<(), EngineError> {
        let guard_key = (position.segment.clone(), position.security_id.clone());
        {
            let mut pending = self.pending_exits.lock();
            if pending.contains(&guard_key) {
                return Ok(());
            }
            pending.insert(guard_key.clone());
        }

        let result = self.place_exit_order(position, reason).await;

        self.pending_exits.lock().remove(&guard_key);
        result
    }

    async fn place_exit_order(&self, position: &Position, reason: ExitReason) -> Result<(), EngineError> {
        let nonce: u32 = rand::thread_rng().gen();
        let idempotency_key = format!("risk_exit_{}_{}_{}_{}", position.security_id, reason.as_str(), now_secs(), nonce);

        let order_result = self
            .broker
            .place_order(
                &position.segment,
                &position.security_id,
                Side::Sell,
                position.net_qty,
                None,
                OrderType::Market,
                Some(&idempotency_key),
                Some(reason),
            )
            .await;

        match order_result {
            Ok(order) => {
                let pnl = Money::new((order.avg_price.as_decimal() - position.buy_avg.as_decimal()) * rust_decimal::Decimal::from(position.net_qty));
                if pnl.is_negative() {
                    *self.last_loss_time.lock() = Some(now_secs());
                }
                info!(sid = %position.security_id, reason = reason.as_str(), price = %order.avg_price, "position exited");
                Ok(())
            }
            Err(EngineError::IdempotencyReplay { .. }) => Ok(()),
            Err(EngineError::BrokerRejected(msg)) => {
                warn!(sid = %position.security_id, reason = reason.as_str(), error = %msg, "exit order rejected, will retry next tick");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn close_all_positions(&self, reason: ExitReason) {
        for position in self.positions.get_open_positions() {
            if let Err(e) = self.execute_exit(&position, reason).await {
                warn!(sid = %position.security_id, error = %e, "failed to close position under daily loss cap");
            }
        }
    }

    /// Run the independent loop until cancelled. A bounded join (<=2s) on
    /// shutdown is the caller's responsibility (spec §4.10 scheduling
    /// model); this future simply respects the cancel token each iteration.
    pub async fn run(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        while !self.cancel.is_cancelled() {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "risk manager tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RiskConfig {
        RiskConfig {
            tp_pct: 0.10,
            sl_pct: 0.20,
            trail_pct: 0.12,
            time_stop_seconds: 3600,
            enable_time_stop: true,
            enable_daily_loss_cap: true,
            enable_cooldown: true,
            max_daily_loss: Money::from_f64(2_000.0),
            cooldown_after_loss_seconds: 180,
        }
    }

    fn position(entry: f64, hwm: f64, entry_time: i64) -> Position {
        Position {
            segment: "NSE_FNO".into(),
            security_id: "1".into(),
            side: Side::Buy,
            buy_avg: Money::from_f64(entry),
            net_qty: 75,
            entry_time,
            current_price: Money::from_f64(entry),
            pnl: Money::ZERO,
            pnl_pct: 0.0,
            option_type: None,
            strike: None,
            expiry: None,
            exit_price: None,
            exit_reason: None,
            exit_time: None,
            high_water_mark: Money::from_f64(hwm),
        }
    }

    #[test]
    fn ltp_equal_entry_triggers_neither() {
        let p = position(100.0, 100.0, 0);
        assert_eq!(determine_exit_reason(&p, 100.0, 0, &config()), None);
    }

    #[test]
    fn tp_triggers_at_exact_threshold() {
        let p = position(100.0, 100.0, 0);
        assert_eq!(determine_exit_reason(&p, 110.0, 0, &config()), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn sl_triggers_at_exact_threshold() {
        let p = position(100.0, 100.0, 0);
        assert_eq!(determine_exit_reason(&p, 80.0, 0, &config()), Some(ExitReason::StopLoss));
    }

    #[test]
    fn high_water_mark_equal_entry_never_trails() {
        let p = position(100.0, 100.0, 0);
        assert_eq!(determine_exit_reason(&p, 50.0, 0, &config()), Some(ExitReason::StopLoss));
    }

    #[test]
    fn trailing_stop_fires_below_hwm_band() {
        let p = position(100.0, 126.0, 0);
        // 126 * 0.88 = 110.88; price 110 should be below
        assert_eq!(determine_exit_reason(&p, 110.0, 0, &config()), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn time_stop_fires_when_disabled_is_skipped() {
        let mut cfg = config();
        cfg.enable_time_stop = false;
        let p = position(100.0, 100.0, -10_000);
        assert_eq!(determine_exit_reason(&p, 100.0, 0, &cfg), None);
    }

    #[test]
    fn fixed_order_tp_beats_trailing_stop() {
        // Both TP and trailing-stop conditions hold; TP must win (evaluated
        // first in the fixed order).
        let p = position(100.0, 130.0, 0);
        assert_eq!(determine_exit_reason(&p, 112.0, 0, &config()), Some(ExitReason::TakeProfit));
    }
}
