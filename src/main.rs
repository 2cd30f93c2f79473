// =============================================================================
// Scalper Engine — Main Entry Point
// =============================================================================
//
// Wires the CLI surface to the Trading App composition root. `start`/
// `paper`/`live` all build the same `TradingApp`; `paper` and `live` just
// force the broker mode regardless of what the config file says.
// =============================================================================

mod app;
mod balance;
mod broker;
mod candle;
mod cli;
mod config;
mod error;
mod historical_fetcher;
mod indicators;
mod instrument;
mod kv;
mod money;
mod option_picker;
mod position_tracker;
mod quantity_sizer;
mod retry;
mod risk_manager;
mod scheduler;
mod signal_engine;
mod tick_cache;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{AppDeps, TradingApp};
use crate::balance::BalanceProvider;
use crate::cli::{Cli, Command, EXIT_CONFIG_ERROR, EXIT_RUNTIME_ERROR, EXIT_SUCCESS};
use crate::config::Config;
use crate::error::EngineError;
use crate::historical_fetcher::{HistoricalFetcher, OhlcSource, RawOhlc};
use crate::instrument::StaticInstrumentMaster;
use crate::kv::memory::MemoryKvStore;
use crate::kv::KvStore;
use crate::position_tracker::PositionTracker;
use crate::tick_cache::TickCache;

/// Placeholder OHLC source until a concrete broker historical-data client is
/// wired in; the wire protocol is out of scope per spec §1.
struct UnconfiguredSource;

#[async_trait]
impl OhlcSource for UnconfiguredSource {
    async fn fetch(&self, segment: &str, security_id: &str, interval_minutes: u32) -> Result<RawOhlc, EngineError> {
        Err(EngineError::MarketDataStale { segment: format!("{segment}:{security_id}:{interval_minutes}m"), security_id: security_id.to_string() })
    }
}

fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("scalper-engine {}", env!("CARGO_PKG_VERSION"));
            ExitCode::from(EXIT_SUCCESS as u8)
        }
        Command::Config => match Config::load_json(std::path::Path::new(&cli.config)) {
            Ok(config) => {
                println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
                ExitCode::from(EXIT_SUCCESS as u8)
            }
            Err(e) => {
                error!(error = %e, "configuration invalid");
                ExitCode::from(EXIT_CONFIG_ERROR as u8)
            }
        },
        Command::Status => {
            info!("status: no running engine instance found in this process");
            ExitCode::from(EXIT_SUCCESS as u8)
        }
        Command::Report { session_id, latest } => {
            info!(session_id = ?session_id, latest, "report generation is out of scope for this engine (spec §1)");
            ExitCode::from(EXIT_SUCCESS as u8)
        }
        Command::Export { since } => {
            info!(since = %since, "export is out of scope for this engine (spec §1)");
            ExitCode::from(EXIT_SUCCESS as u8)
        }
        Command::Start | Command::Paper | Command::Live => {
            let config = match Config::load_json(std::path::Path::new(&cli.config)) {
                Ok(config) => config,
                Err(e) => {
                    error!(error = %e, "failed to load configuration");
                    return ExitCode::from(EXIT_CONFIG_ERROR as u8);
                }
            };

            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to start async runtime");
                    return ExitCode::from(EXIT_RUNTIME_ERROR as u8);
                }
            };

            match runtime.block_on(run_engine(config)) {
                Ok(()) => ExitCode::from(EXIT_SUCCESS as u8),
                Err(e) => {
                    error!(error = %e, "engine exited with a runtime error");
                    ExitCode::from(EXIT_RUNTIME_ERROR as u8)
                }
            }
        }
    }
}

/// The binary entry point's own glue (building collaborators, wiring the
/// runtime) uses `anyhow::Result`; domain modules keep returning the typed
/// `EngineError` (spec A.2).
async fn run_engine(config: Config) -> anyhow::Result<()> {
    info!("scalper engine starting in paper mode (live broker wiring is an operator-supplied `Broker` impl)");

    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let tick_cache = Arc::new(TickCache::new("scalper", kv.clone(), None));
    let positions = Arc::new(PositionTracker::new());
    let balance = Arc::new(BalanceProvider::new(config.starting_balance_money()));
    let historical = Arc::new(HistoricalFetcher::new(Arc::new(UnconfiguredSource), 30));
    let instruments = Arc::new(StaticInstrumentMaster::new(vec![]));

    let deps = AppDeps::paper(&config, tick_cache.clone(), positions.clone(), balance.clone(), historical, instruments);

    let app = Arc::new(TradingApp::new(config, kv, deps, tick_cache, positions, balance));

    info!("all subsystems running, press Ctrl+C to stop");
    app.run().await;

    warn!("scalper engine shut down");
    Ok(())
}
