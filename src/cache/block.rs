//! Block timestamp cache implementation using Moka

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Timestamps of blocks already fetched by the estimator
#[derive(Clone)]
pub struct BlockTimeCache {
    cache: Cache<u32, DateTime<Utc>>,
}

impl BlockTimeCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, block_num: u32) -> Option<DateTime<Utc>> {
        let hit = self.cache.get(&block_num).await;
        if hit.is_some() {
            debug!("Block time cache hit for block {}", block_num);
        }
        hit
    }

    pub async fn insert(&self, block_num: u32, timestamp: DateTime<Utc>) {
        self.cache.insert(block_num, timestamp).await;
    }
}
