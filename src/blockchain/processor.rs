use crate::blockchain::classifier::ActionOrigin;
use crate::blockchain::models::Block;
use crate::blockchain::worker_pool::{ActionJob, DispatchPool};
use crate::models::BlockHeight;
use crate::tracking::HistoryDispatcher;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives every block a subscription delivers, in arrival order
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle(&self, block: &Block);

    fn name(&self) -> &str;
}

/// Block stream handler: unpacks transactions and feeds their actions to a
/// dispatch pool.
///
/// Without a progress channel the callback returns once every action of the
/// block is queued and does not wait for deliveries. With one attached, the
/// block number is reported only after all of the block's actions have been
/// dispatched, so a reported block never has deliveries still queued.
pub struct BlockDataHandler {
    name: String,
    cancel: CancellationToken,
    pool: DispatchPool,
    jobs: mpsc::Sender<ActionJob>,
    block_nums: Option<mpsc::Sender<u32>>,
}

impl BlockDataHandler {
    pub fn new(
        name: impl Into<String>,
        dispatcher: HistoryDispatcher,
        cancel: CancellationToken,
        workers: usize,
    ) -> Self {
        let name = name.into();
        let pool = DispatchPool::new(&name, dispatcher, cancel.clone(), workers);
        let jobs = pool.get_sender();

        debug!("{}: {} dispatch workers", name, pool.worker_count());

        Self {
            name,
            cancel,
            pool,
            jobs,
            block_nums: None,
        }
    }

    /// Report each processed block number on `block_nums`
    pub fn with_progress(mut self, block_nums: mpsc::Sender<u32>) -> Self {
        self.block_nums = Some(block_nums);
        self
    }

    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    async fn enqueue(&self, job: ActionJob) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.jobs.send(job) => sent.is_ok(),
        }
    }
}

#[async_trait]
impl BlockHandler for BlockDataHandler {
    async fn handle(&self, block: &Block) {
        if self.cancel.is_cancelled() {
            return;
        }

        let block_num = block.block_num;
        if block_num % 10_000 == 0 {
            info!("process block {} ({})", block_num, self.name);
        }

        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let done = self.block_nums.is_some().then_some(done_tx);

        for receipt in &block.transactions {
            let Some(packed) = receipt.trx.packed() else {
                continue;
            };

            let transaction = match packed.unpack() {
                Ok(transaction) => transaction,
                Err(e) => {
                    warn!("{} (block {}, {})", e, block_num, self.name);
                    continue;
                }
            };

            let transaction_id = match packed.id_bytes() {
                Ok(id) => id,
                Err(e) => {
                    warn!("{} (block {}, {})", e, block_num, self.name);
                    continue;
                }
            };

            for (index, action) in transaction.actions.into_iter().enumerate() {
                let job = ActionJob {
                    action,
                    origin: ActionOrigin {
                        transaction_id: transaction_id.clone(),
                        action_index: index as i64,
                        block_num,
                    },
                    done: done.clone(),
                };

                if !self.enqueue(job).await {
                    return;
                }
            }
        }

        drop(done);

        if let Some(block_nums) = &self.block_nums {
            // every job holds a sender; recv yields None once all are dropped
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = done_rx.recv() => {}
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = block_nums.send(block_num) => {}
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Forwards `{number, id}` of every received block
pub struct BlockHeightHandler {
    cancel: CancellationToken,
    heights: mpsc::Sender<BlockHeight>,
}

impl BlockHeightHandler {
    pub fn new(cancel: CancellationToken, heights: mpsc::Sender<BlockHeight>) -> Self {
        Self { cancel, heights }
    }
}

#[async_trait]
impl BlockHandler for BlockHeightHandler {
    async fn handle(&self, block: &Block) {
        let height = BlockHeight {
            head_block_num: block.block_num,
            head_block_id: block.id.clone(),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.heights.send(height) => {}
        }
    }

    fn name(&self) -> &str {
        "block height"
    }
}
