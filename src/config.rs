// Configuration for:
// - node RPC endpoint and client limits
// - server listening address/port
// - block subscription polling
// - resync safety valves and the block-time estimator
// - dispatch concurrency

use crate::blockchain::polling::MIN_POLL_INTERVAL;
use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub node_rpc_url: String,
    pub rpc_timeout_secs: u64,
    pub rpc_rate_limit: Option<u32>,
    pub poll_interval: Duration,
    pub history_buffer_size: usize,
    pub resync_timeout: Duration,
    pub resync_anomaly_threshold: u32,
    pub estimator_step_blocks: u32,
    pub block_cache_capacity: u64,
    pub block_cache_ttl: Duration,
    pub dispatch_workers: usize,
    pub token_contract: String,
    pub core_symbol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            node_rpc_url: "http://127.0.0.1:8888".to_string(),
            rpc_timeout_secs: 30,
            rpc_rate_limit: None,
            poll_interval: Duration::from_millis(500),
            history_buffer_size: 100,
            resync_timeout: Duration::from_secs(12 * 60 * 60),
            resync_anomaly_threshold: 10_000,
            // two hours of half-second blocks
            estimator_step_blocks: 2 * 60 * 60 * 2,
            block_cache_capacity: 10_000,
            block_cache_ttl: Duration::from_secs(3600),
            dispatch_workers: num_cpus::get(),
            token_contract: "eosio.token".to_string(),
            core_symbol: "EOS".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);
        let server_port = parse_or("SERVER_PORT", defaults.server_port);
        let node_rpc_url = env::var("NODE_RPC_URL").unwrap_or(defaults.node_rpc_url);
        let rpc_timeout_secs = parse_or("RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs);
        let rpc_rate_limit = env::var("RPC_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);
        let poll_interval = env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval)
            .max(MIN_POLL_INTERVAL);
        let history_buffer_size = parse_or("HISTORY_BUFFER_SIZE", defaults.history_buffer_size);
        let resync_timeout = env::var("RESYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.resync_timeout);
        let resync_anomaly_threshold =
            parse_or("RESYNC_ANOMALY_THRESHOLD", defaults.resync_anomaly_threshold);
        let estimator_step_blocks = parse_or("ESTIMATOR_STEP_BLOCKS", defaults.estimator_step_blocks);
        let block_cache_capacity = parse_or("BLOCK_CACHE_CAPACITY", defaults.block_cache_capacity);
        let block_cache_ttl = env::var("BLOCK_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.block_cache_ttl);
        let dispatch_workers = parse_or("DISPATCH_WORKERS", defaults.dispatch_workers).max(1);
        let token_contract = env::var("TOKEN_CONTRACT").unwrap_or(defaults.token_contract);
        let core_symbol = env::var("CORE_SYMBOL").unwrap_or(defaults.core_symbol);

        Self {
            server_host,
            server_port,
            node_rpc_url,
            rpc_timeout_secs,
            rpc_rate_limit,
            poll_interval,
            history_buffer_size: history_buffer_size.max(1),
            resync_timeout,
            resync_anomaly_threshold,
            estimator_step_blocks: estimator_step_blocks.max(1),
            block_cache_capacity,
            block_cache_ttl,
            dispatch_workers,
            token_contract,
            core_symbol,
        }
    }
}
