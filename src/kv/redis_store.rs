// =============================================================================
// Redis-backed KV store
// =============================================================================
//
// Grounded on the teacher pack's `db/redis.rs`: a cheap-to-clone pool
// wrapping `redis::aio::ConnectionManager`, cloned per call (the manager
// itself multiplexes connections internally).

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;

use crate::error::EngineError;
use super::KvStore;

fn to_engine_err(e: redis::RedisError) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

pub struct RedisKvStore {
    manager: Arc<redis::aio::ConnectionManager>,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        let client = redis::Client::open(url).map_err(to_engine_err)?;
        let manager = client.get_connection_manager().await.map_err(to_engine_err)?;
        Ok(Self { manager: Arc::new(manager) })
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.manager.as_ref().clone()
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        self.conn().get(key).await.map_err(to_engine_err)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), EngineError> {
        let mut con = self.conn();
        match ttl_secs {
            Some(ttl) if ttl > 0 => {
                redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl).query_async::<_, ()>(&mut con).await
            }
            _ => redis::cmd("SET").arg(key).arg(value).query_async::<_, ()>(&mut con).await,
        }
        .map_err(to_engine_err)
    }

    async fn del(&self, key: &str) -> Result<(), EngineError> {
        self.conn().del::<_, ()>(key).await.map_err(to_engine_err)
    }

    async fn exists(&self, key: &str) -> Result<bool, EngineError> {
        self.conn().exists(key).await.map_err(to_engine_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), EngineError> {
        self.conn().hset::<_, _, _, ()>(key, field, value).await.map_err(to_engine_err)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError> {
        self.conn().hget(key, field).await.map_err(to_engine_err)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, EngineError> {
        self.conn().hgetall(key).await.map_err(to_engine_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), EngineError> {
        self.conn().sadd::<_, _, ()>(key, member).await.map_err(to_engine_err)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), EngineError> {
        self.conn().srem::<_, _, ()>(key, member).await.map_err(to_engine_err)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, EngineError> {
        self.conn().smembers(key).await.map_err(to_engine_err)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        self.conn().sismember(key, member).await.map_err(to_engine_err)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.conn().lpush::<_, _, ()>(key, value).await.map_err(to_engine_err)
    }

    async fn ltrim(&self, key: &str, max_len: usize) -> Result<(), EngineError> {
        let end = if max_len == 0 { -1 } else { max_len as isize - 1 };
        self.conn().ltrim::<_, ()>(key, 0, end).await.map_err(to_engine_err)
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, EngineError> {
        let end = if count == 0 { -1 } else { count as isize - 1 };
        self.conn().lrange(key, 0, end).await.map_err(to_engine_err)
    }

    async fn setnx(&self, key: &str, owner_token: &str, ttl_secs: u64) -> Result<bool, EngineError> {
        let mut con = self.conn();
        let acquired: bool = redis::cmd("SET")
            .arg(key)
            .arg(owner_token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, Option<String>>(&mut con)
            .await
            .map_err(to_engine_err)?
            .is_some();
        Ok(acquired)
    }

    async fn release(&self, key: &str, owner_token: &str) -> Result<(), EngineError> {
        // Compare-and-delete: a Lua script keeps this atomic against a racing
        // setnx from a new owner.
        const SCRIPT: &str = r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
        "#;
        let mut con = self.conn();
        redis::Script::new(SCRIPT)
            .key(key)
            .arg(owner_token)
            .invoke_async::<_, ()>(&mut con)
            .await
            .map_err(to_engine_err)
    }

    async fn throttle(&self, name: &str, interval_secs: u64) -> Result<bool, EngineError> {
        let key = format!("throttle:{name}");
        self.setnx(&key, "1", interval_secs).await
    }

    async fn ping(&self) -> Result<(), EngineError> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn())
            .await
            .map(|_| ())
            .map_err(to_engine_err)
    }
}
