//! Live working-set storage.
//!
//! Each user's current message log and state sit here between turns, serialized
//! as JSON strings. Entries idle longer than the configured TTL are evicted.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use moka::sync::Cache;

use chatitp_core::LiveStore;

pub struct MokaLiveStore {
    cache: Cache<String, String>,
}

impl MokaLiveStore {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .time_to_idle(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }
}

impl Default for MokaLiveStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400), 10_000)
    }
}

#[async_trait]
impl LiveStore for MokaLiveStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key);
        Ok(())
    }
}
