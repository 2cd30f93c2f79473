// =============================================================================
// In-process KV store
// =============================================================================
//
// Backs paper-trading mode and unit tests. Mirrors Redis semantics closely
// enough that swapping in `RedisKvStore` changes no call sites.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::EngineError;
use super::KvStore;

#[derive(Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<u64>,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub struct MemoryKvStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self { data: Mutex::new(HashMap::new()) }
    }

    fn is_live(entry: &Entry) -> bool {
        match entry.expires_at {
            Some(exp) => now_secs() <= exp,
            None => true,
        }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut data = self.data.lock();
        if let Some(entry) = data.get(key) {
            if !Self::is_live(entry) {
                data.remove(key);
                return Ok(None);
            }
            if let Value::Str(s) = &entry.value {
                return Ok(Some(s.clone()));
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        data.insert(
            key.to_string(),
            Entry { value: Value::Str(value.to_string()), expires_at: ttl_secs.map(|t| now_secs() + t) },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), EngineError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, EngineError> {
        Ok(self.get(key).await?.is_some() || {
            let mut data = self.data.lock();
            match data.get(key) {
                Some(entry) if Self::is_live(entry) => true,
                Some(_) => {
                    data.remove(key);
                    false
                }
                None => false,
            }
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry { value: Value::Hash(HashMap::new()), expires_at: None });
        if let Value::Hash(h) = &mut entry.value {
            h.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError> {
        let data = self.data.lock();
        match data.get(key) {
            Some(entry) if Self::is_live(entry) => {
                if let Value::Hash(h) = &entry.value {
                    return Ok(h.get(field).cloned());
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, EngineError> {
        let data = self.data.lock();
        match data.get(key) {
            Some(entry) if Self::is_live(entry) => {
                if let Value::Hash(h) = &entry.value {
                    return Ok(h.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry { value: Value::Set(HashSet::new()), expires_at: None });
        if let Value::Set(s) = &mut entry.value {
            s.insert(member.to_string());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        if let Some(entry) = data.get_mut(key) {
            if let Value::Set(s) = &mut entry.value {
                s.remove(member);
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let data = self.data.lock();
        match data.get(key) {
            Some(entry) if Self::is_live(entry) => {
                if let Value::Set(s) = &entry.value {
                    return Ok(s.iter().cloned().collect());
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        Ok(self.smembers(key).await?.iter().any(|m| m == member))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry { value: Value::List(VecDeque::new()), expires_at: None });
        if let Value::List(l) = &mut entry.value {
            l.push_front(value.to_string());
        }
        Ok(())
    }

    async fn ltrim(&self, key: &str, max_len: usize) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        if let Some(entry) = data.get_mut(key) {
            if let Value::List(l) = &mut entry.value {
                l.truncate(max_len);
            }
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, EngineError> {
        let data = self.data.lock();
        match data.get(key) {
            Some(entry) if Self::is_live(entry) => {
                if let Value::List(l) = &entry.value {
                    return Ok(l.iter().take(count).cloned().collect());
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn setnx(&self, key: &str, owner_token: &str, ttl_secs: u64) -> Result<bool, EngineError> {
        let mut data = self.data.lock();
        let occupied = matches!(data.get(key), Some(entry) if Self::is_live(entry));
        if occupied {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Entry { value: Value::Str(owner_token.to_string()), expires_at: Some(now_secs() + ttl_secs) },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, owner_token: &str) -> Result<(), EngineError> {
        let mut data = self.data.lock();
        let matches_owner = matches!(data.get(key), Some(Entry { value: Value::Str(v), .. }) if v == owner_token);
        if matches_owner {
            data.remove(key);
        }
        Ok(())
    }

    async fn throttle(&self, name: &str, interval_secs: u64) -> Result<bool, EngineError> {
        let key = format!("throttle:{name}");
        let mut data = self.data.lock();
        let blocked = matches!(data.get(&key), Some(entry) if Self::is_live(entry));
        if blocked {
            return Ok(false);
        }
        data.insert(
            key,
            Entry { value: Value::Str(now_secs().to_string()), expires_at: Some(now_secs() + interval_secs) },
        );
        Ok(true)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
