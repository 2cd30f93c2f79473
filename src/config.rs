// =============================================================================
// Configuration
// =============================================================================
//
// Models every key in spec §6's table, with the same `#[serde(default =
// "...")]` pattern the teacher's `runtime_config.rs` uses so old config
// files keep loading as fields are added. `validate()` enforces every rule
// and fails with `ConfigurationInvalid` on the first violation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::money::Money;

fn default_decision_interval_sec() -> u64 { 60 }
fn default_risk_loop_interval_sec() -> u64 { 1 }
fn default_tp_pct() -> f64 { 0.10 }
fn default_sl_pct() -> f64 { 0.20 }
fn default_trail_pct() -> f64 { 0.12 }
fn default_time_stop_seconds() -> i64 { 1800 }
fn default_max_daily_loss_rs() -> f64 { 2_000.0 }
fn default_cooldown_after_loss_seconds() -> i64 { 180 }
fn default_true() -> bool { true }
fn default_allocation_pct() -> f64 { 0.10 }
fn default_max_lots_per_trade() -> u32 { 5 }
fn default_min_premium_price() -> f64 { 5.0 }
fn default_slippage_buffer_pct() -> f64 { 0.01 }
fn default_charge_per_order() -> f64 { 20.0 }
fn default_secondary_timeframe() -> u32 { 5 }
fn default_starting_balance() -> f64 { 200_000.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub session_hours: (String, String),
    #[serde(default = "default_decision_interval_sec")]
    pub decision_interval_sec: u64,
    #[serde(default = "default_risk_loop_interval_sec")]
    pub risk_loop_interval_sec: u64,
    #[serde(default = "default_tp_pct")]
    pub tp_pct: f64,
    #[serde(default = "default_sl_pct")]
    pub sl_pct: f64,
    #[serde(default = "default_trail_pct")]
    pub trail_pct: f64,
    #[serde(default = "default_time_stop_seconds")]
    pub time_stop_seconds: i64,
    #[serde(default = "default_max_daily_loss_rs")]
    pub max_daily_loss_rs: f64,
    #[serde(default = "default_cooldown_after_loss_seconds")]
    pub cooldown_after_loss_seconds: i64,
    #[serde(default = "default_true")]
    pub enable_time_stop: bool,
    #[serde(default = "default_true")]
    pub enable_daily_loss_cap: bool,
    #[serde(default = "default_true")]
    pub enable_cooldown: bool,
    #[serde(default = "default_allocation_pct")]
    pub allocation_pct: f64,
    #[serde(default = "default_max_lots_per_trade")]
    pub max_lots_per_trade: u32,
    #[serde(default = "default_min_premium_price")]
    pub min_premium_price: f64,
    #[serde(default = "default_slippage_buffer_pct")]
    pub slippage_buffer_pct: f64,
    #[serde(default = "default_charge_per_order")]
    pub charge_per_order: f64,
    #[serde(default = "default_true")]
    pub use_multi_timeframe: bool,
    #[serde(default = "default_secondary_timeframe")]
    pub secondary_timeframe: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self { starting_balance: default_starting_balance() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub idx_sid: String,
    pub seg_idx: String,
    pub seg_opt: String,
    pub strike_step: f64,
    pub lot_size: u32,
    pub expiry_wday: u32,
    #[serde(default = "one")]
    pub qty_multiplier: u32,
}

fn one() -> u32 { 1 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    pub symbols: HashMap<String, SymbolConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.global.charge_per_order <= 0.0 {
            return Err(EngineError::ConfigurationInvalid("global.charge_per_order must be > 0".into()));
        }
        if self.paper.starting_balance <= 0.0 {
            return Err(EngineError::ConfigurationInvalid("paper.starting_balance must be > 0".into()));
        }
        let (start, end) = &self.global.session_hours;
        if parse_hhmm(start).is_none() || parse_hhmm(end).is_none() {
            return Err(EngineError::ConfigurationInvalid("global.session_hours must be [HH:MM, HH:MM]".into()));
        }
        if parse_hhmm(start) >= parse_hhmm(end) {
            return Err(EngineError::ConfigurationInvalid("global.session_hours start must be before end".into()));
        }
        if self.symbols.is_empty() {
            return Err(EngineError::ConfigurationInvalid("at least one symbol must be configured".into()));
        }
        for (name, sym) in &self.symbols {
            if sym.lot_size == 0 {
                return Err(EngineError::ConfigurationInvalid(format!("symbol {name}: lot_size must be > 0")));
            }
            if sym.idx_sid.is_empty() || sym.seg_idx.is_empty() || sym.seg_opt.is_empty() {
                return Err(EngineError::ConfigurationInvalid(format!("symbol {name}: missing required fields")));
            }
        }
        Ok(())
    }

    pub fn starting_balance_money(&self) -> Money {
        Money::from_f64(self.paper.starting_balance)
    }

    pub fn charge_per_order_money(&self) -> Money {
        Money::from_f64(self.global.charge_per_order)
    }

    /// Load from a JSON file; mirrors the teacher's atomic-tmp-then-rename
    /// `RuntimeConfig::load`. YAML loading is out of scope.
    pub fn load_json(path: &std::path::Path) -> Result<Config, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: &std::path::Path) -> Result<(), EngineError> {
        let raw = serde_json::to_string_pretty(self).map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, raw).map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        Ok(())
    }
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

fn default_config_for_tests() -> Config {
    let mut symbols = HashMap::new();
    symbols.insert(
        "NIFTY".to_string(),
        SymbolConfig {
            idx_sid: "13".into(),
            seg_idx: "IDX_I".into(),
            seg_opt: "NSE_FNO".into(),
            strike_step: 50.0,
            lot_size: 75,
            expiry_wday: 4,
            qty_multiplier: 1,
        },
    );
    Config {
        global: GlobalConfig {
            session_hours: ("09:15".into(), "15:30".into()),
            decision_interval_sec: default_decision_interval_sec(),
            risk_loop_interval_sec: default_risk_loop_interval_sec(),
            tp_pct: default_tp_pct(),
            sl_pct: default_sl_pct(),
            trail_pct: default_trail_pct(),
            time_stop_seconds: default_time_stop_seconds(),
            max_daily_loss_rs: default_max_daily_loss_rs(),
            cooldown_after_loss_seconds: default_cooldown_after_loss_seconds(),
            enable_time_stop: true,
            enable_daily_loss_cap: true,
            enable_cooldown: true,
            allocation_pct: default_allocation_pct(),
            max_lots_per_trade: default_max_lots_per_trade(),
            min_premium_price: default_min_premium_price(),
            slippage_buffer_pct: default_slippage_buffer_pct(),
            charge_per_order: default_charge_per_order(),
            use_multi_timeframe: true,
            secondary_timeframe: default_secondary_timeframe(),
        },
        paper: PaperConfig::default(),
        symbols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_passes() {
        assert!(default_config_for_tests().validate().is_ok());
    }

    #[test]
    fn zero_fee_is_invalid() {
        let mut c = default_config_for_tests();
        c.global.charge_per_order = 0.0;
        assert!(matches!(c.validate(), Err(EngineError::ConfigurationInvalid(_))));
    }

    #[test]
    fn zero_balance_is_invalid() {
        let mut c = default_config_for_tests();
        c.paper.starting_balance = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn malformed_session_hours_is_invalid() {
        let mut c = default_config_for_tests();
        c.global.session_hours = ("15:30".into(), "09:15".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_lot_size_is_invalid() {
        let mut c = default_config_for_tests();
        c.symbols.get_mut("NIFTY").unwrap().lot_size = 0;
        assert!(c.validate().is_err());
    }
}
