//! Per-account history backfill.
//!
//! A resync follows the chain from an estimated start block up to the head
//! captured when the session starts, delivering the account's actions with
//! `resync = true`. Block numbers reported by the handler drive a small state
//! machine:
//!
//! ```text
//! Starting -> Running -> Completed   (block past the captured head)
//!                     -> Restarting  (forward jump over the anomaly threshold)
//!                     -> Aborted     (deadline reached)
//! ```
//!
//! A restart resumes from the last good block with a fresh session; the
//! deadline is shared by every restart of the same request.

use crate::blockchain::client::{ChainClient, ClientError};
use crate::blockchain::estimator::BlockTimeEstimator;
use crate::blockchain::polling::{BlockPosition, BlockSource};
use crate::blockchain::processor::BlockDataHandler;
use crate::config::Config;
use crate::models::{ActionRecord, TrackedUser};
use crate::tracking::{HistoryDispatcher, TrackedAccounts};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Block numbers the handler may report ahead of the progress loop
const PROGRESS_BUFFER: usize = 16;

#[derive(Error, Debug)]
pub enum ResyncError {
    #[error("Address is not tracked: {0}")]
    NotTracked(String),

    #[error("Resync already running for {0}")]
    AlreadyRunning(String),

    #[error("Node error: {0}")]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct ResyncSettings {
    pub timeout: Duration,
    pub anomaly_threshold: u32,
    pub dispatch_workers: usize,
}

impl From<&Config> for ResyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.resync_timeout,
            anomaly_threshold: config.resync_anomaly_threshold,
            dispatch_workers: config.dispatch_workers,
        }
    }
}

/// Progress of one session instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncState {
    pub address: String,
    pub start_block: u32,
    /// Chain head when the session started
    pub end_block: u32,
    pub last_good_block: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Completed,
    Restart { from: u32 },
}

impl ResyncState {
    pub fn new(address: &str, start_block: u32, end_block: u32) -> Self {
        Self {
            address: address.to_string(),
            start_block,
            end_block,
            last_good_block: start_block,
        }
    }

    /// Fold one reported block number into the state
    pub fn observe(&mut self, block_num: u32, anomaly_threshold: u32) -> Progress {
        if block_num > self.end_block {
            return Progress::Completed;
        }

        if block_num.saturating_sub(self.last_good_block) > anomaly_threshold {
            return Progress::Restart {
                from: self.last_good_block,
            };
        }

        self.last_good_block = block_num;
        Progress::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncOutcome {
    Completed { last_block: u32, restarts: u32 },
    Aborted { last_good_block: u32, restarts: u32 },
    Cancelled,
}

enum SessionEnd {
    Completed { last_block: u32 },
    Restart { from: u32 },
    Aborted { last_good_block: u32 },
    Cancelled,
}

/// Allows one running resync per address
#[derive(Clone, Default)]
pub struct ResyncTracker {
    active: Arc<Mutex<HashSet<String>>>,
}

impl ResyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `address`, or `None` while another resync holds it
    pub fn try_acquire(&self, address: &str) -> Option<ResyncGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(address.to_string()) {
            return None;
        }

        Some(ResyncGuard {
            address: address.to_string(),
            active: self.active.clone(),
        })
    }

    pub fn is_running(&self, address: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(address)
    }
}

/// Releases the address when dropped
pub struct ResyncGuard {
    address: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for ResyncGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.address);
    }
}

/// Runs resync sessions against the shared history channel
#[derive(Clone)]
pub struct ResyncRunner {
    client: Arc<dyn ChainClient>,
    source: Arc<dyn BlockSource>,
    estimator: Arc<BlockTimeEstimator>,
    history: mpsc::Sender<ActionRecord>,
    settings: ResyncSettings,
}

impl ResyncRunner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        source: Arc<dyn BlockSource>,
        estimator: Arc<BlockTimeEstimator>,
        history: mpsc::Sender<ActionRecord>,
        settings: ResyncSettings,
    ) -> Self {
        Self {
            client,
            source,
            estimator,
            history,
            settings,
        }
    }

    pub async fn run(
        &self,
        address: &str,
        user: TrackedUser,
        cancel: CancellationToken,
    ) -> Result<ResyncOutcome, ResyncError> {
        let deadline = Instant::now() + self.settings.timeout;
        let mut start_block = self.start_block_for(address).await;
        let mut restarts = 0u32;

        loop {
            let end = self
                .run_session(address, &user, start_block, deadline, &cancel)
                .await?;

            match end {
                SessionEnd::Completed { last_block } => {
                    info!("done resync {} (block {}, {} restarts)", address, last_block, restarts);
                    return Ok(ResyncOutcome::Completed {
                        last_block,
                        restarts,
                    });
                }
                SessionEnd::Restart { from } => {
                    restarts += 1;
                    warn!("Restarting resync {} from block {} (restart {})", address, from, restarts);
                    start_block = from;
                }
                SessionEnd::Aborted { last_good_block } => {
                    warn!("Resync {} timed out at block {}", address, last_good_block);
                    return Ok(ResyncOutcome::Aborted {
                        last_good_block,
                        restarts,
                    });
                }
                SessionEnd::Cancelled => {
                    info!("Resync {} cancelled", address);
                    return Ok(ResyncOutcome::Cancelled);
                }
            }
        }
    }

    /// Block produced just before the account was created, or block 1
    async fn start_block_for(&self, address: &str) -> u32 {
        let created = match self.client.get_account(address).await {
            Ok(account) => account.created,
            Err(e) => {
                warn!("Cannot read account {}: {}, resyncing from block 1", address, e);
                return 1;
            }
        };

        match self.estimator.estimate_block_at(created).await {
            Ok(block_num) => block_num,
            Err(e) => {
                warn!("Cannot estimate start block for {}: {}, resyncing from block 1", address, e);
                1
            }
        }
    }

    async fn run_session(
        &self,
        address: &str,
        user: &TrackedUser,
        start_block: u32,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, ResyncError> {
        let info = self.client.get_info().await?;
        let start = self.client.get_block(start_block).await?;
        let mut state = ResyncState::new(address, start_block, info.head_block_num);

        let session = cancel.child_token();
        let (block_nums_tx, mut block_nums) = mpsc::channel(PROGRESS_BUFFER);
        let dispatcher = HistoryDispatcher::new(
            TrackedAccounts::single(address, user.clone()),
            self.history.clone(),
            true,
        );
        let handler = BlockDataHandler::new(
            format!("resync {}", address),
            dispatcher,
            session.clone(),
            self.settings.dispatch_workers,
        )
        .with_progress(block_nums_tx);

        let subscription = match self
            .source
            .subscribe_from(BlockPosition::from(&start), Arc::new(handler))
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                session.cancel();
                return Err(e.into());
            }
        };

        info!(
            "Resync {} from block {} to {}",
            address, state.start_block, state.end_block
        );

        let timeout = sleep_until(deadline);
        tokio::pin!(timeout);

        let end = loop {
            tokio::select! {
                _ = session.cancelled() => break SessionEnd::Cancelled,
                _ = &mut timeout => {
                    break SessionEnd::Aborted { last_good_block: state.last_good_block };
                }
                reported = block_nums.recv() => {
                    let Some(block_num) = reported else {
                        warn!("Resync {}: block subscription ended early", address);
                        break SessionEnd::Aborted { last_good_block: state.last_good_block };
                    };

                    match state.observe(block_num, self.settings.anomaly_threshold) {
                        Progress::Running => {}
                        Progress::Completed => break SessionEnd::Completed { last_block: block_num },
                        Progress::Restart { from } => {
                            warn!(
                                "Resync {}: block {} jumped past last good block {}",
                                address, block_num, from
                            );
                            break SessionEnd::Restart { from };
                        }
                    }
                }
            }
        };

        session.cancel();
        self.source.unsubscribe(&subscription).await;
        debug!("Resync {} session closed", address);

        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_tracks_good_blocks() {
        let mut state = ResyncState::new("alice", 100, 200);
        assert_eq!(state.observe(101, 10_000), Progress::Running);
        assert_eq!(state.observe(150, 10_000), Progress::Running);
        assert_eq!(state.last_good_block, 150);
    }

    #[test]
    fn observe_completes_past_captured_head() {
        let mut state = ResyncState::new("alice", 100, 200);
        assert_eq!(state.observe(200, 10_000), Progress::Running);
        assert_eq!(state.observe(201, 10_000), Progress::Completed);
    }

    #[test]
    fn observe_restarts_from_last_good_block_on_jump() {
        let mut state = ResyncState::new("alice", 100, 100_050);
        assert_eq!(state.observe(100, 10_000), Progress::Running);
        assert_eq!(state.observe(10_200, 10_000), Progress::Restart { from: 100 });
        // a jump exactly at the threshold is still progress
        assert_eq!(state.observe(10_100, 10_000), Progress::Running);
        assert_eq!(state.last_good_block, 10_100);
    }

    #[test]
    fn tracker_is_single_flight() {
        let tracker = ResyncTracker::new();
        let guard = tracker.try_acquire("alice").unwrap();
        assert!(tracker.try_acquire("alice").is_none());
        assert!(tracker.try_acquire("bob").is_some());
        assert!(tracker.is_running("alice"));

        drop(guard);
        assert!(!tracker.is_running("alice"));
        assert!(tracker.try_acquire("alice").is_some());
    }
}
