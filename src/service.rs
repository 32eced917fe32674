//! Node service: tracked-account administration, chain queries and the
//! history / block-height streams the backend consumes.

use crate::blockchain::client::{ChainClient, ClientError};
use crate::blockchain::estimator::BlockTimeEstimator;
use crate::blockchain::models::{RamMarket, TableRowsRequest, SYSTEM_CONTRACT};
use crate::blockchain::polling::BlockSource;
use crate::cache::BlockTimeCache;
use crate::config::Config;
use crate::models::{
    AccountInfo, ActionRecord, Balance, Balances, BlockHeight, ChainState, ServiceInfo, TrackedUser,
    WatchAddress,
};
use crate::sync::{
    HistoryHub, LiveSessions, ResyncError, ResyncOutcome, ResyncRunner, ResyncSettings, ResyncTracker,
    SessionError,
};
use crate::tracking::TrackedAccounts;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct NodeService {
    client: Arc<dyn ChainClient>,
    registry: TrackedAccounts,
    live: LiveSessions,
    resync: ResyncRunner,
    resyncs: ResyncTracker,
    /// Live-follow start block; 0 follows from the most recent block
    start_block: AtomicU32,
    token_contract: String,
    core_symbol: String,
    shutdown: CancellationToken,
}

impl NodeService {
    pub fn new(
        config: &Config,
        client: Arc<dyn ChainClient>,
        source: Arc<dyn BlockSource>,
        block_cache: BlockTimeCache,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = TrackedAccounts::new();
        let hub = HistoryHub::new(config.history_buffer_size);
        let estimator = Arc::new(BlockTimeEstimator::new(
            client.clone(),
            block_cache,
            config.estimator_step_blocks,
        ));

        let live = LiveSessions::new(
            client.clone(),
            source.clone(),
            registry.clone(),
            hub.clone(),
            config.dispatch_workers,
        );
        let resync = ResyncRunner::new(
            client.clone(),
            source,
            estimator,
            hub.sender(),
            ResyncSettings::from(config),
        );

        Self {
            client,
            registry,
            live,
            resync,
            resyncs: ResyncTracker::new(),
            start_block: AtomicU32::new(0),
            token_contract: config.token_contract.clone(),
            core_symbol: config.core_symbol.clone(),
            shutdown,
        }
    }

    pub fn registry(&self) -> &TrackedAccounts {
        &self.registry
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            buildtime: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
        }
    }

    /// Replace every tracked account
    pub async fn initial_add(&self, users: HashMap<String, TrackedUser>) {
        info!("Tracking {} accounts", users.len());
        self.registry.set_all(users).await;
    }

    pub async fn add_new_address(&self, watch: &WatchAddress) {
        info!("Added address {} to tracking", watch.address);
        self.registry.add(&watch.address, watch.user()).await;
    }

    pub async fn block_height(&self) -> Result<BlockHeight, ClientError> {
        let info = self.client.get_info().await?;
        Ok(BlockHeight {
            head_block_num: info.head_block_num,
            head_block_id: info.head_block_id,
        })
    }

    pub async fn chain_state(&self) -> Result<ChainState, ClientError> {
        let info = self.client.get_info().await?;
        Ok(ChainState {
            head_block_num: info.head_block_num,
            head_block_id: info.head_block_id,
            head_block_time: info.head_block_time.timestamp(),
            last_irreversible_block_num: info.last_irreversible_block_num,
            last_irreversible_block_id: info.last_irreversible_block_id,
        })
    }

    /// Core token balance of `account`
    pub async fn address_balance(&self, account: &str) -> Result<Balance, ClientError> {
        let assets = self
            .client
            .get_currency_balance(account, &self.core_symbol, &self.token_contract)
            .await?;

        match assets.as_slice() {
            [asset] => Ok(Balance {
                balance: asset.to_string(),
            }),
            _ => Err(ClientError::InvalidResponse(format!(
                "{} balance not single: {:?}",
                self.core_symbol, assets
            ))),
        }
    }

    /// Balances of `account` on contract `code` (the token contract when empty)
    pub async fn token_balance(&self, account: &str, symbol: &str, code: &str) -> Result<Balances, ClientError> {
        let code = if code.is_empty() { &self.token_contract } else { code };
        let assets = self.client.get_currency_balance(account, symbol, code).await?;
        Ok(Balances { assets })
    }

    pub async fn ram_price(&self) -> Result<f64, ClientError> {
        let request = TableRowsRequest {
            code: SYSTEM_CONTRACT.to_string(),
            scope: SYSTEM_CONTRACT.to_string(),
            table: "rammarket".to_string(),
            json: true,
            limit: 1,
        };

        let rows = self.client.get_table_rows(&request).await?;
        let row = rows
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("rammarket table is empty".to_string()))?;
        let market: RamMarket = serde_json::from_value(row)?;

        Ok(market.price_per_token())
    }

    /// Whether `name` exists, and its single owner key if it has one
    pub async fn account_check(&self, name: &str) -> AccountInfo {
        match self.client.get_account(name).await {
            Ok(account) => AccountInfo {
                exist: true,
                public_key: account.owner_key(),
                created: Some(account.created),
            },
            Err(e) => {
                info!("Account {} lookup failed: {}", name, e);
                AccountInfo {
                    exist: false,
                    public_key: String::new(),
                    created: None,
                }
            }
        }
    }

    pub async fn send_raw_tx(&self, transaction: &serde_json::Value) -> Result<String, ClientError> {
        let pushed = self.client.push_transaction(transaction).await?;
        info!("Pushed transaction {}", pushed.transaction_id);
        Ok(pushed.transaction_id)
    }

    /// Set where the next history stream starts following the chain
    pub fn sync_state(&self, head_block_num: u32) {
        info!("Live follow will start from block {}", head_block_num);
        self.start_block.store(head_block_num, Ordering::Relaxed);
    }

    pub fn start_block(&self) -> u32 {
        self.start_block.load(Ordering::Relaxed)
    }

    /// Start a background resync for a tracked address
    pub async fn resync_address(&self, address: &str) -> Result<(), ResyncError> {
        let user = self
            .registry
            .lookup(address)
            .await
            .ok_or_else(|| ResyncError::NotTracked(address.to_string()))?;

        let guard = self
            .resyncs
            .try_acquire(address)
            .ok_or_else(|| ResyncError::AlreadyRunning(address.to_string()))?;

        let runner = self.resync.clone();
        let address = address.to_string();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let _guard = guard;
            match runner.run(&address, user, cancel).await {
                Ok(ResyncOutcome::Completed { .. }) | Ok(ResyncOutcome::Cancelled) => {}
                Ok(ResyncOutcome::Aborted { last_good_block, .. }) => {
                    error!("Resync {} aborted at block {}", address, last_good_block);
                }
                Err(e) => error!("Resync {} failed: {}", address, e),
            }
        });

        Ok(())
    }

    pub fn is_resyncing(&self, address: &str) -> bool {
        self.resyncs.is_running(address)
    }

    pub async fn new_block(
        &self,
        out: mpsc::Sender<BlockHeight>,
        cancel: CancellationToken,
    ) -> Result<Infallible, SessionError> {
        self.live.new_block(out, cancel).await
    }

    pub async fn new_tx(
        &self,
        out: mpsc::Sender<ActionRecord>,
        cancel: CancellationToken,
    ) -> Result<Infallible, SessionError> {
        self.live.new_tx(self.start_block(), out, cancel).await
    }

    /// Token that ends every session on process shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
