//! Live-follow sessions tied to one outbound stream.
//!
//! A session subscribes to new blocks, relays its results to `out` and ends
//! when the caller's token is cancelled or the receiving side goes away. It
//! never ends successfully; the returned error is the terminal status.

use crate::blockchain::client::{ChainClient, ClientError};
use crate::blockchain::polling::{BlockPosition, BlockSource, SubscriptionHandle};
use crate::blockchain::processor::{BlockDataHandler, BlockHeightHandler};
use crate::models::{ActionRecord, BlockHeight};
use crate::sync::hub::HistoryHub;
use crate::tracking::{HistoryDispatcher, TrackedAccounts};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session cancelled")]
    Cancelled,

    #[error("Outbound stream closed")]
    StreamClosed,

    #[error("Node error: {0}")]
    Client(#[from] ClientError),
}

#[derive(Clone)]
pub struct LiveSessions {
    client: Arc<dyn ChainClient>,
    source: Arc<dyn BlockSource>,
    registry: TrackedAccounts,
    hub: HistoryHub,
    dispatch_workers: usize,
}

impl LiveSessions {
    pub fn new(
        client: Arc<dyn ChainClient>,
        source: Arc<dyn BlockSource>,
        registry: TrackedAccounts,
        hub: HistoryHub,
        dispatch_workers: usize,
    ) -> Self {
        Self {
            client,
            source,
            registry,
            hub,
            dispatch_workers,
        }
    }

    /// Stream `{number, id}` of every new block from the current head
    pub async fn new_block(
        &self,
        out: mpsc::Sender<BlockHeight>,
        cancel: CancellationToken,
    ) -> Result<Infallible, SessionError> {
        let session = cancel.child_token();
        let (heights_tx, mut heights) = mpsc::channel(1);
        let handler = Arc::new(BlockHeightHandler::new(session.clone(), heights_tx));
        let subscription = self.source.subscribe_from_head(handler).await?;

        info!("NewBlock session started");

        let end = loop {
            tokio::select! {
                _ = session.cancelled() => break SessionError::Cancelled,
                _ = out.closed() => break SessionError::Cancelled,
                height = heights.recv() => {
                    let Some(height) = height else {
                        break SessionError::Cancelled;
                    };
                    if let Err(end) = relay(&session, &out, height).await {
                        break end;
                    }
                }
            }
        };

        self.close(session, &subscription, "NewBlock").await;
        Err(end)
    }

    /// Stream history records for tracked accounts, following the chain
    /// from `start_block` (0 for the current head).
    ///
    /// The registry is consulted on every delivery, so tracking changes
    /// apply without restarting the session. Resync deliveries share the
    /// same channel and are relayed too.
    pub async fn new_tx(
        &self,
        start_block: u32,
        out: mpsc::Sender<ActionRecord>,
        cancel: CancellationToken,
    ) -> Result<Infallible, SessionError> {
        let info = self.client.get_info().await?;
        let start_block = if start_block == 0 {
            info.head_block_num
        } else {
            start_block
        };
        let start = self.client.get_block(start_block).await?;

        let session = cancel.child_token();
        let dispatcher = HistoryDispatcher::new(self.registry.clone(), self.hub.sender(), false);
        let handler = Arc::new(BlockDataHandler::new(
            "NewTx",
            dispatcher,
            session.clone(),
            self.dispatch_workers,
        ));
        let subscription = self
            .source
            .subscribe_from(BlockPosition::from(&start), handler)
            .await?;

        info!("NewTx session started from block {}", start_block);
        if self.registry.is_empty().await {
            warn!("NewTx session started with no tracked accounts");
        }

        let end = loop {
            tokio::select! {
                _ = session.cancelled() => break SessionError::Cancelled,
                _ = out.closed() => break SessionError::Cancelled,
                record = self.hub.recv() => {
                    let Some(record) = record else {
                        break SessionError::Cancelled;
                    };
                    if let Err(end) = relay(&session, &out, record).await {
                        break end;
                    }
                }
            }
        };

        self.close(session, &subscription, "NewTx").await;
        Err(end)
    }

    async fn close(&self, session: CancellationToken, subscription: &SubscriptionHandle, name: &str) {
        session.cancel();
        self.source.unsubscribe(subscription).await;
        debug!("{} session closed", name);
    }
}

/// Forward one item, giving up when the session is cancelled first
async fn relay<T>(
    session: &CancellationToken,
    out: &mpsc::Sender<T>,
    item: T,
) -> Result<(), SessionError> {
    tokio::select! {
        biased;
        _ = session.cancelled() => Err(SessionError::Cancelled),
        sent = out.send(item) => sent.map_err(|_| SessionError::StreamClosed),
    }
}
