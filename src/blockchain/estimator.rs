//! Block-time estimation.
//!
//! Finds the last block produced before a wall-clock time without an index:
//! interpolate between block 1 and the head, step back in coarse strides
//! until the guess lands before the target, then bisect the last stride.

use crate::blockchain::client::{ChainClient, ClientError};
use crate::cache::BlockTimeCache;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("Node error: {0}")]
    Client(#[from] ClientError),

    #[error("Target {target} is not after the first block ({first})")]
    BeforeFirstBlock {
        target: DateTime<Utc>,
        first: DateTime<Utc>,
    },

    #[error("Estimated block {guess} is past the chain head {head}")]
    PastHead { guess: u32, head: u32 },
}

pub struct BlockTimeEstimator {
    client: Arc<dyn ChainClient>,
    cache: BlockTimeCache,
    step_blocks: u32,
}

impl BlockTimeEstimator {
    /// `step_blocks` is the coarse step-back, in blocks
    pub fn new(client: Arc<dyn ChainClient>, cache: BlockTimeCache, step_blocks: u32) -> Self {
        Self {
            client,
            cache,
            step_blocks: step_blocks.max(1),
        }
    }

    /// Last block whose timestamp precedes `target`.
    ///
    /// A target at or after the head's timestamp yields the head. Callers
    /// should fall back to block 1 on error.
    pub async fn estimate_block_at(&self, target: DateTime<Utc>) -> Result<u32, EstimateError> {
        let info = self.client.get_info().await?;
        let head = info.head_block_num;
        self.cache.insert(head, info.head_block_time).await;

        let first = self.block_time(1).await?;
        if target <= first {
            return Err(EstimateError::BeforeFirstBlock { target, first });
        }
        if head <= 1 || target > info.head_block_time {
            return Ok(head.max(1));
        }

        let elapsed = (target - first).num_milliseconds() as i128;
        let span = (info.head_block_time - first).num_milliseconds().max(1) as i128;
        let offset = elapsed * i128::from(head - 1) / span;
        let mut guess = 1u32.saturating_add(u32::try_from(offset).unwrap_or(u32::MAX));

        // earliest block known to be at or after the target
        let mut upper = head;

        loop {
            if guess > head {
                return Err(EstimateError::PastHead { guess, head });
            }

            let time = self.block_time(guess).await?;
            if time < target {
                break;
            }

            upper = guess;
            guess = guess.saturating_sub(self.step_blocks).max(1);
        }

        debug!("Coarse estimate for {}: block {}, bound {}", target, guess, upper);

        let (mut lo, mut hi) = (guess, upper);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.block_time(mid).await? < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Ok(lo)
    }

    async fn block_time(&self, block_num: u32) -> Result<DateTime<Utc>, ClientError> {
        if let Some(time) = self.cache.get(block_num).await {
            return Ok(time);
        }

        let block = self.client.get_block(block_num).await?;
        self.cache.insert(block_num, block.timestamp).await;
        Ok(block.timestamp)
    }
}
