// =============================================================================
// Option Picker
// =============================================================================
//
// Maps spot + direction to a specific CE/PE instrument at ATM +/- 1 strike
// (spec §4.5).

use std::collections::HashMap;

use crate::error::EngineError;
use crate::instrument::InstrumentMaster;
use crate::types::{Instrument, OptionType};

pub struct SymbolConfig {
    pub underlying: String,
    pub strike_step: f64,
}

#[derive(Debug)]
pub struct StrikeSet {
    pub expiry: String,
    pub strikes: [f64; 3],
    pub ce_sid: HashMap<String, String>,
    pub pe_sid: HashMap<String, String>,
}

fn round_to_step(spot: f64, step: f64) -> f64 {
    (spot / step).round() * step
}

/// Resolve CE/PE security ids for the three strikes around ATM at the
/// nearest weekly expiry. `api_expiry` is the broker-supplied expiry list
/// entry if present; it is authoritative over the master's own heuristic
/// (spec §9 Open Questions).
pub async fn pick(
    config: &SymbolConfig,
    spot: f64,
    master: &dyn InstrumentMaster,
    api_expiry: Option<&str>,
) -> Result<StrikeSet, EngineError> {
    let atm = round_to_step(spot, config.strike_step);
    let strikes = [atm - config.strike_step, atm, atm + config.strike_step];

    let expiry = match api_expiry {
        Some(e) => e.to_string(),
        None => master.nearest_weekly_expiry(&config.underlying).await?,
    };

    let mut ce_sid = HashMap::new();
    let mut pe_sid = HashMap::new();
    for &strike in &strikes {
        let ce: Instrument = master.resolve_option(&config.underlying, strike, OptionType::Ce, &expiry).await?;
        let pe: Instrument = master.resolve_option(&config.underlying, strike, OptionType::Pe, &expiry).await?;
        ce_sid.insert(format_strike(strike), ce.security_id);
        pe_sid.insert(format_strike(strike), pe.security_id);
    }

    Ok(StrikeSet { expiry, strikes, ce_sid, pe_sid })
}

pub fn format_strike(strike: f64) -> String {
    format!("{strike:.0}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{sample_row, StaticInstrumentMaster};

    #[tokio::test]
    async fn picks_atm_and_neighbours() {
        let rows = [21900.0, 22000.0, 22100.0]
            .iter()
            .flat_map(|&s| {
                vec![
                    sample_row("NIFTY", s, OptionType::Ce, "2026-08-07", &format!("CE{s}")),
                    sample_row("NIFTY", s, OptionType::Pe, "2026-08-07", &format!("PE{s}")),
                ]
            })
            .collect();
        let master = StaticInstrumentMaster::new(rows);
        let config = SymbolConfig { underlying: "NIFTY".into(), strike_step: 100.0 };

        let set = pick(&config, 22030.0, &master, Some("2026-08-07")).await.unwrap();
        assert_eq!(set.strikes, [21900.0, 22000.0, 22100.0]);
        assert_eq!(set.ce_sid.get("22000"), Some(&"CE22000".to_string()));
    }

    #[tokio::test]
    async fn missing_instrument_fails() {
        let master = StaticInstrumentMaster::new(vec![]);
        let config = SymbolConfig { underlying: "NIFTY".into(), strike_step: 100.0 };
        let err = pick(&config, 22030.0, &master, Some("2026-08-07")).await.unwrap_err();
        assert!(matches!(err, EngineError::NoInstrument(_)));
    }
}
