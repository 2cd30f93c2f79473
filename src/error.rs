// =============================================================================
// Engine-wide error type
// =============================================================================
//
// Every domain module (kv, balance, position_tracker, broker, risk_manager,
// option_picker, config, ...) returns `Result<T, EngineError>`. The binary
// entry point and the thin HTTP/WS glue around external collaborators use
// `anyhow::Result` and convert into this type at the boundary, matching the
// split the teacher's codebase uses between `anyhow` (call sites) and
// `thiserror` (domain types).
// =============================================================================

use thiserror::Error;

/// All error kinds recognised by the engine (spec §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: String,
        available: String,
    },

    #[error("oversell attempt: tried to sell {attempted} but only {held} held")]
    OversellAttempt { attempted: String, held: String },

    #[error("no instrument found for {0}")]
    NoInstrument(String),

    #[error("market data stale for {segment}:{security_id}")]
    MarketDataStale { segment: String, security_id: String },

    #[error("broker rejected order: {0}")]
    BrokerRejected(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("balance corruption detected: {0}")]
    BalanceCorruption(String),

    #[error("idempotency replay: returning prior order {order_id}")]
    IdempotencyReplay { order_id: String },

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether this error kind is recoverable locally per spec §7's policy
    /// table (the caller should retry/skip rather than propagate).
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::MarketDataStale { .. }
                | EngineError::RateLimited(_)
                | EngineError::BrokerRejected(_)
                | EngineError::IdempotencyReplay { .. }
        )
    }

    /// Whether this error kind is fatal and should stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::BalanceCorruption(_) | EngineError::StoreUnavailable(_)
        )
    }
}
