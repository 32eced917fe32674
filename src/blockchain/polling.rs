use crate::blockchain::client::{ChainClient, ClientError};
use crate::blockchain::models::Block;
use crate::blockchain::processor::BlockHandler;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest wait between head polls once a subscription is caught up
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A block to resume a subscription from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPosition {
    pub block_num: u32,
    pub block_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Block> for BlockPosition {
    fn from(block: &Block) -> Self {
        Self {
            block_num: block.block_num,
            block_id: block.id.clone(),
            timestamp: block.timestamp,
        }
    }
}

/// Identifies one registered handler; pass it back to unsubscribe
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(id: u64, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Block subscriptions: one handler call per received block
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn subscribe_from(
        &self,
        position: BlockPosition,
        handler: Arc<dyn BlockHandler>,
    ) -> Result<SubscriptionHandle, ClientError>;

    async fn subscribe_from_head(
        &self,
        handler: Arc<dyn BlockHandler>,
    ) -> Result<SubscriptionHandle, ClientError>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle);
}

/// [`BlockSource`] that follows the chain by fetching blocks one by one and
/// waiting on the head once caught up
pub struct PollingBlockSource {
    client: Arc<dyn ChainClient>,
    poll_interval: Duration,
    subscriptions: Mutex<HashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl PollingBlockSource {
    pub fn new(client: Arc<dyn ChainClient>, poll_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            client,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    async fn start(
        &self,
        from: u32,
        expected_id: Option<String>,
        handler: Arc<dyn BlockHandler>,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        self.subscriptions.lock().await.insert(id, cancel.clone());

        info!(
            "Starting block subscription {} for {} from block {}",
            id,
            handler.name(),
            from
        );

        let follower = Follower {
            id,
            client: self.client.clone(),
            poll_interval: self.poll_interval,
            handler,
            cancel: cancel.clone(),
            next: from,
            expected_id,
        };
        tokio::spawn(follower.run());

        SubscriptionHandle::new(id, cancel)
    }
}

#[async_trait]
impl BlockSource for PollingBlockSource {
    async fn subscribe_from(
        &self,
        position: BlockPosition,
        handler: Arc<dyn BlockHandler>,
    ) -> Result<SubscriptionHandle, ClientError> {
        Ok(self
            .start(position.block_num, Some(position.block_id), handler)
            .await)
    }

    async fn subscribe_from_head(
        &self,
        handler: Arc<dyn BlockHandler>,
    ) -> Result<SubscriptionHandle, ClientError> {
        let info = self.client.get_info().await?;
        Ok(self.start(info.head_block_num, None, handler).await)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(cancel) = self.subscriptions.lock().await.remove(&handle.id) {
            cancel.cancel();
            debug!("Block subscription {} removed", handle.id);
        }
    }
}

struct Follower {
    id: u64,
    client: Arc<dyn ChainClient>,
    poll_interval: Duration,
    handler: Arc<dyn BlockHandler>,
    cancel: CancellationToken,
    next: u32,
    expected_id: Option<String>,
}

impl Follower {
    async fn run(mut self) {
        let mut head = 0u32;
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.next > head {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.cancel.cancelled() => break,
                }

                match self.client.get_info().await {
                    Ok(info) => head = info.head_block_num,
                    Err(e) => {
                        warn!("Subscription {}: failed to get chain head: {}", self.id, e);
                        continue;
                    }
                }

                if self.next > head {
                    continue;
                }
            }

            let fetched = tokio::select! {
                fetched = self.fetch_block(self.next) => fetched,
                _ = self.cancel.cancelled() => break,
            };

            match fetched {
                Ok(block) => {
                    if let Some(expected) = self.expected_id.take() {
                        if block.id != expected {
                            warn!(
                                "Subscription {}: block {} id {} differs from requested {}",
                                self.id, block.block_num, block.id, expected
                            );
                        }
                    }

                    self.handler.handle(&block).await;
                    self.next += 1;
                }
                Err(e) => {
                    error!("Subscription {}: failed to fetch block {}: {}", self.id, self.next, e);
                    // wait a tick before trying the same block again
                    head = 0;
                }
            }
        }

        info!("Block subscription {} stopped at block {}", self.id, self.next);
    }

    async fn fetch_block(&self, block_num: u32) -> Result<Block, ClientError> {
        let client = &self.client;
        (|| async move { client.get_block(block_num).await })
            .retry(ExponentialBuilder::default().with_max_times(3))
            .notify(|err: &ClientError, dur: Duration| {
                warn!("Retrying block {} in {:?}: {}", block_num, dur, err);
            })
            .await
    }
}
