// =============================================================================
// Trading App
// =============================================================================
//
// Composition root (spec §4.12). Traps SIGINT/SIGTERM to request shutdown,
// owns the Scheduler, the Risk Manager (an independent worker), the Broker,
// the Position Tracker, and the Balance Provider. On start it primes the
// decision loop for each configured symbol and the risk loop; on stop it
// halts the scheduler, halts the risk manager, and persists a final
// session snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::balance::BalanceProvider;
use crate::broker::{Broker, PaperBroker};
use crate::config::Config;
use crate::error::EngineError;
use crate::historical_fetcher::HistoricalFetcher;
use crate::instrument::InstrumentMaster;
use crate::kv::memory::MemoryKvStore;
use crate::kv::KvStore;
use crate::option_picker::{self, SymbolConfig as OptionSymbolConfig};
use crate::position_tracker::PositionTracker;
use crate::quantity_sizer::{self, SizerConfig};
use crate::retry::CancelToken;
use crate::risk_manager::{RiskConfig, RiskManager};
use crate::scheduler::{Scheduler, Task};
use crate::signal_engine::{self, SignalDecision};
use crate::tick_cache::TickCache;
use crate::types::{OptionType, OrderType, Side};

/// Process-lifetime collaborators the app needs but that have no in-crate
/// default beyond the paper-trading ones (spec §1 Out-of-scope: broker wire
/// protocol, instrument-master CSV fetcher, historical OHLC source).
pub struct AppDeps {
    pub kv: Arc<dyn KvStore>,
    pub broker: Arc<dyn Broker>,
    pub historical: Arc<HistoricalFetcher>,
    pub instruments: Arc<dyn InstrumentMaster>,
}

impl AppDeps {
    /// Paper-trading defaults: in-memory KV, a `PaperBroker` filling against
    /// the shared tick cache, and whatever `historical`/`instruments` the
    /// caller supplies (these stay external oracles per spec §1).
    pub fn paper(
        config: &Config,
        tick_cache: Arc<TickCache>,
        positions: Arc<PositionTracker>,
        balance: Arc<BalanceProvider>,
        historical: Arc<HistoricalFetcher>,
        instruments: Arc<dyn InstrumentMaster>,
    ) -> Self {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let broker: Arc<dyn Broker> =
            Arc::new(PaperBroker::new("scalper", kv.clone(), tick_cache, positions, balance, config.charge_per_order_money()));
        Self { kv, broker, historical, instruments }
    }
}

pub struct TradingApp {
    config: Config,
    kv: Arc<dyn KvStore>,
    tick_cache: Arc<TickCache>,
    positions: Arc<PositionTracker>,
    balance: Arc<BalanceProvider>,
    broker: Arc<dyn Broker>,
    historical: Arc<HistoricalFetcher>,
    instruments: Arc<dyn InstrumentMaster>,
    risk_manager: Arc<RiskManager>,
    cancel: CancelToken,
}

impl TradingApp {
    pub fn new(config: Config, kv: Arc<dyn KvStore>, deps: AppDeps, tick_cache: Arc<TickCache>, positions: Arc<PositionTracker>, balance: Arc<BalanceProvider>) -> Self {
        let cancel = CancelToken::new();
        let risk_config = RiskConfig {
            tp_pct: config.global.tp_pct,
            sl_pct: config.global.sl_pct,
            trail_pct: config.global.trail_pct,
            time_stop_seconds: config.global.time_stop_seconds,
            enable_time_stop: config.global.enable_time_stop,
            enable_daily_loss_cap: config.global.enable_daily_loss_cap,
            enable_cooldown: config.global.enable_cooldown,
            max_daily_loss: crate::money::Money::from_f64(config.global.max_daily_loss_rs),
            cooldown_after_loss_seconds: config.global.cooldown_after_loss_seconds,
        };
        let risk_manager = Arc::new(RiskManager::new(
            positions.clone(),
            tick_cache.clone(),
            deps.broker.clone(),
            balance.clone(),
            risk_config,
            balance.snapshot().total,
            cancel.clone(),
        ));

        Self {
            config,
            kv,
            tick_cache,
            positions,
            balance,
            broker: deps.broker,
            historical: deps.historical,
            instruments: deps.instruments,
            risk_manager,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// One decision-loop iteration for a single symbol (spec §2 data flow:
    /// Candle Series -> Signal Engine -> Option Picker -> Quantity Sizer ->
    /// Broker).
    async fn decide_symbol(&self, name: &str, idx_sid: &str, seg_idx: &str, seg_opt: &str, strike_step: f64, lot_size: u32) -> Result<(), EngineError> {
        let primary = self.historical.load_from_source(seg_idx, idx_sid, 1).await?;
        let decision = if self.config.global.use_multi_timeframe {
            let secondary = self.historical.load_from_source(seg_idx, idx_sid, self.config.global.secondary_timeframe).await?;
            signal_engine::decide(&primary, &secondary)
        } else {
            signal_engine::decide(&primary, &primary)
        };

        if decision == SignalDecision::None {
            return Ok(());
        }

        let spot = match self.tick_cache.ltp(seg_idx, idx_sid, true).await? {
            Some(p) => p,
            None => return Ok(()),
        };

        let option_type = match decision {
            SignalDecision::LongCe => OptionType::Ce,
            SignalDecision::LongPe => OptionType::Pe,
            SignalDecision::None => unreachable!(),
        };

        let picker_config = OptionSymbolConfig { underlying: name.to_string(), strike_step };
        let strikes = option_picker::pick(&picker_config, spot, self.instruments.as_ref(), None).await?;
        let atm_strike = strikes.strikes[1];
        let strike_key = option_picker::format_strike(atm_strike);
        let security_id = match option_type {
            OptionType::Ce => strikes.ce_sid.get(&strike_key),
            OptionType::Pe => strikes.pe_sid.get(&strike_key),
        };
        let security_id = match security_id {
            Some(sid) => sid.clone(),
            None => return Ok(()),
        };

        let premium = match self.tick_cache.ltp(seg_opt, &security_id, true).await? {
            Some(p) if p > 0.0 => p,
            _ => return Ok(()),
        };

        let sizer_config = SizerConfig {
            allocation_pct: self.config.global.allocation_pct,
            slippage_buffer_pct: self.config.global.slippage_buffer_pct,
            max_lots_per_trade: self.config.global.max_lots_per_trade,
            min_premium_price: self.config.global.min_premium_price,
        };
        let sizing = quantity_sizer::size(&sizer_config, self.balance.snapshot().available, premium, lot_size);
        if sizing.quantity == 0 {
            return Ok(());
        }

        let idempotency_key = format!("entry_{seg_opt}_{security_id}_{}", spot as i64);
        match self
            .broker
            .place_order(seg_opt, &security_id, Side::Buy, sizing.quantity, None, OrderType::Market, Some(&idempotency_key), None)
            .await
        {
            Ok(order) => {
                info!(symbol = name, sid = %security_id, qty = order.quantity, price = %order.avg_price, "entry order filled");
                Ok(())
            }
            Err(e) if e.is_locally_recoverable() => {
                warn!(symbol = name, error = %e, "entry order skipped this tick");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn build_scheduler(self: &Arc<Self>) -> Scheduler {
        let mut scheduler = Scheduler::new(self.cancel.clone());

        let symbols: HashMap<String, crate::config::SymbolConfig> = self.config.symbols.clone();
        for (name, sym) in symbols {
            let app = self.clone();
            scheduler.register(Task::new(
                Box::leak(format!("decide:{name}").into_boxed_str()),
                Duration::from_secs(self.config.global.decision_interval_sec),
                true,
                move || {
                    let app = app.clone();
                    let name = name.clone();
                    let sym = sym.clone();
                    async move { app.decide_symbol(&name, &sym.idx_sid, &sym.seg_idx, &sym.seg_opt, sym.strike_step, sym.lot_size).await }
                },
            ));
        }

        scheduler
    }

    /// Runs until `cancel` fires. Spawns the scheduler and the independent
    /// risk-manager loop side by side (spec §5: "two independent workers").
    pub async fn run(self: Arc<Self>) {
        let scheduler = self.build_scheduler();
        let risk = self.risk_manager.clone();
        let risk_interval = Duration::from_secs(self.config.global.risk_loop_interval_sec);

        let risk_handle = tokio::spawn(async move { risk.run(risk_interval).await });
        let scheduler_handle = tokio::spawn(scheduler.run());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received");
            }
        }

        self.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(2), risk_handle).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), scheduler_handle).await;
    }

    /// Halts the scheduler and risk manager; leaves any in-flight exit's
    /// pending marker for the next process to reconcile at startup (spec
    /// §5 Cancellation). Persists a final session snapshot to the KV store
    /// (spec §4.12), since intra-day persistence across restarts beyond
    /// what the KV store provides is a non-goal.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let snapshot = self.balance.snapshot();
        let open = self.positions.get_open_positions().len();
        if let Err(e) = self.kv.set("scalper:session:last_equity", &snapshot.total.to_string(), None).await {
            warn!(error = %e, "failed to persist session snapshot");
        }
        info!(equity = %snapshot.total, open_positions = open, "trading app stopped");
    }
}
