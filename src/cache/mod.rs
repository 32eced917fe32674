pub mod block;

pub use block::BlockTimeCache;

use crate::config::Config;

pub fn init_block_cache(config: &Config) -> BlockTimeCache {
    BlockTimeCache::new(config.block_cache_capacity, config.block_cache_ttl)
}
