// =============================================================================
// Broker
// =============================================================================
//
// Uniform order interface with idempotency (spec §4.9). `PaperBroker` fills
// immediately against the Tick Cache and drives the Position Tracker
// directly; `LiveBroker` signs and sends an HTTP request the way the
// teacher's `binance/client.rs` does, deferring the fill to a separate order
// monitor.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::balance::BalanceProvider;
use crate::error::EngineError;
use crate::kv::KvStore;
use crate::money::Money;
use crate::position_tracker::PositionTracker;
use crate::tick_cache::TickCache;
use crate::types::{ExitReason, Order, OrderStatus, OrderType, Side};

const IDEMPOTENCY_TTL_SECS: u64 = 86_400;

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_order(
        &self,
        segment: &str,
        security_id: &str,
        side: Side,
        quantity: u32,
        price: Option<Money>,
        order_type: OrderType,
        idempotency_key: Option<&str>,
        exit_reason: Option<ExitReason>,
    ) -> Result<Order, EngineError>;
}

fn idempotency_key_for(ns: &str, key: &str) -> String {
    format!("{ns}:idemp:{key}")
}

/// Atomic idempotency admission gate: "single KV + in-memory mirror; writer
/// wins by SETNX" (spec §5). The winner's pre-generated `order_id` is the
/// SETNX value, so a losing caller's follow-up `get` always observes it —
/// the two calls are serialised by the KV store itself, never raced.
async fn claim_idempotency(kv: &dyn KvStore, ns: &str, key: &str, order_id: &str) -> Result<bool, EngineError> {
    kv.setnx(&idempotency_key_for(ns, key), order_id, IDEMPOTENCY_TTL_SECS).await
}

async fn existing_idempotent_order(kv: &dyn KvStore, ns: &str, key: &str) -> Result<String, EngineError> {
    Ok(kv.get(&idempotency_key_for(ns, key)).await?.unwrap_or_default())
}

/// Release a claim whose fill never completed, so a later retry with the
/// same key can claim it again instead of replaying a phantom order.
async fn release_idempotency(kv: &dyn KvStore, ns: &str, key: &str, order_id: &str) -> Result<(), EngineError> {
    kv.release(&idempotency_key_for(ns, key), order_id).await
}

pub struct PaperBroker {
    ns: String,
    kv: Arc<dyn KvStore>,
    tick_cache: Arc<TickCache>,
    positions: Arc<PositionTracker>,
    balance: Arc<BalanceProvider>,
    charge_per_order: Money,
}

impl PaperBroker {
    pub fn new(
        ns: impl Into<String>,
        kv: Arc<dyn KvStore>,
        tick_cache: Arc<TickCache>,
        positions: Arc<PositionTracker>,
        balance: Arc<BalanceProvider>,
        charge_per_order: Money,
    ) -> Self {
        Self { ns: ns.into(), kv, tick_cache, positions, balance, charge_per_order }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn place_order(
        &self,
        segment: &str,
        security_id: &str,
        side: Side,
        quantity: u32,
        price: Option<Money>,
        order_type: OrderType,
        idempotency_key: Option<&str>,
        exit_reason: Option<ExitReason>,
    ) -> Result<Order, EngineError> {
        let order_id = Uuid::new_v4().to_string();
        let key = idempotency_key.filter(|k| !k.is_empty());

        if let Some(key) = key {
            let claimed = claim_idempotency(self.kv.as_ref(), &self.ns, key, &order_id).await?;
            if !claimed {
                let existing = existing_idempotent_order(self.kv.as_ref(), &self.ns, key).await?;
                return Err(EngineError::IdempotencyReplay { order_id: existing });
            }
        }

        let result = self.fill(segment, security_id, side, quantity, price, order_type, idempotency_key, exit_reason, order_id.clone()).await;

        if result.is_err() {
            if let Some(key) = key {
                release_idempotency(self.kv.as_ref(), &self.ns, key, &order_id).await?;
            }
        }

        result
    }
}

impl PaperBroker {
    #[allow(clippy::too_many_arguments)]
    async fn fill(
        &self,
        segment: &str,
        security_id: &str,
        side: Side,
        quantity: u32,
        price: Option<Money>,
        order_type: OrderType,
        idempotency_key: Option<&str>,
        exit_reason: Option<ExitReason>,
        order_id: String,
    ) -> Result<Order, EngineError> {
        let fill_price = match price {
            Some(p) if order_type == OrderType::Limit => p,
            _ => {
                let ltp = self.tick_cache.ltp(segment, security_id, true).await?.ok_or_else(|| {
                    EngineError::MarketDataStale { segment: segment.to_string(), security_id: security_id.to_string() }
                })?;
                Money::from_f64(ltp)
            }
        };

        let order = Order {
            order_id,
            security_id: security_id.to_string(),
            segment: segment.to_string(),
            side,
            quantity,
            avg_price: fill_price,
            status: OrderStatus::Filled,
            timestamp: now_secs(),
            idempotency_key: idempotency_key.map(|s| s.to_string()),
        };

        self.positions.apply_fill(&order, self.charge_per_order, &self.balance, exit_reason, order.timestamp)?;

        Ok(order)
    }
}

/// Signs requests the way the teacher's `binance/client.rs` does
/// (HMAC-SHA256 over the query string); the wire protocol of the actual
/// broker is out of scope, so this only demonstrates the signing seam and
/// leaves the HTTP call to be wired up against a concrete broker API.
pub struct LiveBroker {
    api_key: String,
    api_secret: String,
    base_url: String,
    http: reqwest::Client,
}

impl LiveBroker {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), api_secret: api_secret.into(), base_url: base_url.into(), http: reqwest::Client::new() }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl Broker for LiveBroker {
    async fn place_order(
        &self,
        segment: &str,
        security_id: &str,
        side: Side,
        quantity: u32,
        price: Option<Money>,
        order_type: OrderType,
        idempotency_key: Option<&str>,
        _exit_reason: Option<ExitReason>,
    ) -> Result<Order, EngineError> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let type_str = match order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };
        let query = format!(
            "segment={segment}&securityId={security_id}&side={side_str}&quantity={quantity}&type={type_str}&price={}&apiKey={}",
            price.map(|p| p.to_string()).unwrap_or_default(),
            self.api_key,
        );
        let signature = self.sign(&query);
        let url = format!("{}/orders?{query}&signature={signature}", self.base_url);

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| EngineError::BrokerRejected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::BrokerRejected(format!("http {}", response.status())));
        }

        Ok(Order {
            order_id: Uuid::new_v4().to_string(),
            security_id: security_id.to_string(),
            segment: segment.to_string(),
            side,
            quantity,
            avg_price: price.unwrap_or(Money::ZERO),
            status: OrderStatus::Pending,
            timestamp: now_secs(),
            idempotency_key: idempotency_key.map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKvStore;
    use crate::types::Tick;

    async fn setup() -> (PaperBroker, Arc<TickCache>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let tick_cache = Arc::new(TickCache::new("ns", kv.clone(), None));
        tick_cache
            .put(Tick { segment: "NSE_FNO".into(), security_id: "1".into(), ltp: 100.0, ts: now_secs(), day_high: None, day_low: None, atp: None, volume: None })
            .await
            .unwrap();
        let positions = Arc::new(PositionTracker::new());
        let balance = Arc::new(BalanceProvider::new(Money::from_f64(1_000_000.0)));
        let broker = PaperBroker::new("ns", kv, tick_cache.clone(), positions, balance, Money::ZERO);
        (broker, tick_cache)
    }

    #[tokio::test]
    async fn market_order_fills_at_ltp() {
        let (broker, _cache) = setup().await;
        let order = broker.place_order("NSE_FNO", "1", Side::Buy, 75, None, OrderType::Market, None, None).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_price, Money::from_f64(100.0));
    }

    #[tokio::test]
    async fn repeated_idempotency_key_replays_without_double_fill() {
        let (broker, _cache) = setup().await;
        let first = broker.place_order("NSE_FNO", "1", Side::Buy, 75, None, OrderType::Market, Some("key-1"), None).await.unwrap();
        let second = broker.place_order("NSE_FNO", "1", Side::Buy, 75, None, OrderType::Market, Some("key-1"), None).await;
        match second {
            Err(EngineError::IdempotencyReplay { order_id }) => assert_eq!(order_id, first.order_id),
            other => panic!("expected idempotency replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn limit_order_fills_at_given_price() {
        let (broker, _cache) = setup().await;
        let order = broker
            .place_order("NSE_FNO", "1", Side::Buy, 50, Some(Money::from_f64(95.0)), OrderType::Limit, None, None)
            .await
            .unwrap();
        assert_eq!(order.avg_price, Money::from_f64(95.0));
    }
}
