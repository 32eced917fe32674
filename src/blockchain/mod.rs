pub mod classifier;
pub mod client;
pub mod estimator;
pub mod models;
pub mod polling;
pub mod processor;
pub mod worker_pool;

// Re-exports for convenience
pub use client::{ChainClient, ClientError, EosRpcClient};
pub use estimator::BlockTimeEstimator;
pub use polling::{BlockPosition, BlockSource, PollingBlockSource, SubscriptionHandle};
pub use processor::{BlockDataHandler, BlockHandler, BlockHeightHandler};
