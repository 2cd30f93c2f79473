// =============================================================================
// Instrument master oracle
// =============================================================================
//
// The instrument-master CSV fetcher is an external oracle (spec §1
// Out-of-scope) returning `(security_id, lot_size, expiry, segment)` tuples.
// This module defines the trait boundary the rest of the engine depends on,
// plus a simple in-memory implementation for tests and for embedding a real
// fetcher later.

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{ExchangeSegment, Instrument, InstrumentType, OptionType};

#[async_trait]
pub trait InstrumentMaster: Send + Sync {
    /// Resolve the option contract for `underlying` at `strike`/`option_type`
    /// expiring at `expiry` (an API-supplied date string, authoritative over
    /// any local weekday heuristic per spec §9 Open Questions).
    async fn resolve_option(
        &self,
        underlying: &str,
        strike: f64,
        option_type: OptionType,
        expiry: &str,
    ) -> Result<Instrument, EngineError>;

    /// The nearest future weekly expiry per the instrument master's own
    /// calendar; used only as a fallback when the caller has no API-supplied
    /// list to consult (spec §9 Open Questions: the API's list is
    /// authoritative, the heuristic is a fallback).
    async fn nearest_weekly_expiry(&self, underlying: &str) -> Result<String, EngineError>;
}

/// In-memory instrument master backed by a flat row list, useful for tests
/// and for embedding behind a real CSV-backed fetcher.
pub struct StaticInstrumentMaster {
    rows: Vec<Instrument>,
}

impl StaticInstrumentMaster {
    pub fn new(rows: Vec<Instrument>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl InstrumentMaster for StaticInstrumentMaster {
    async fn resolve_option(
        &self,
        underlying: &str,
        strike: f64,
        option_type: OptionType,
        expiry: &str,
    ) -> Result<Instrument, EngineError> {
        self.rows
            .iter()
            .find(|r| {
                r.underlying == underlying
                    && r.instrument_type == InstrumentType::Optidx
                    && r.option_type == Some(option_type)
                    && r.strike == Some(strike)
                    && r.expiry.as_deref() == Some(expiry)
            })
            .cloned()
            .ok_or_else(|| EngineError::NoInstrument(format!("{underlying} {strike} {expiry}")))
    }

    async fn nearest_weekly_expiry(&self, underlying: &str) -> Result<String, EngineError> {
        self.rows
            .iter()
            .filter(|r| r.underlying == underlying)
            .filter_map(|r| r.expiry.clone())
            .min()
            .ok_or_else(|| EngineError::NoInstrument(underlying.to_string()))
    }
}

pub fn sample_row(underlying: &str, strike: f64, option_type: OptionType, expiry: &str, security_id: &str) -> Instrument {
    Instrument {
        security_id: security_id.to_string(),
        underlying: underlying.to_string(),
        segment: "NSE_FNO".to_string(),
        instrument_type: InstrumentType::Optidx,
        strike: Some(strike),
        option_type: Some(option_type),
        expiry: Some(expiry.to_string()),
        lot_size: 50,
        exchange_segment: ExchangeSegment::NseFno,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_matching_row() {
        let master = StaticInstrumentMaster::new(vec![sample_row("NIFTY", 22000.0, OptionType::Ce, "2026-08-07", "111")]);
        let instrument = master.resolve_option("NIFTY", 22000.0, OptionType::Ce, "2026-08-07").await.unwrap();
        assert_eq!(instrument.security_id, "111");
    }

    #[tokio::test]
    async fn missing_row_is_no_instrument() {
        let master = StaticInstrumentMaster::new(vec![]);
        let err = master.resolve_option("NIFTY", 22000.0, OptionType::Ce, "2026-08-07").await.unwrap_err();
        assert!(matches!(err, EngineError::NoInstrument(_)));
    }
}
