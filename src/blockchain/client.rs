use crate::blockchain::models::{
    AccountResponse, Block, ChainInfo, PushTransactionResponse, TableRows, TableRowsRequest,
};
use crate::config::Config;
use crate::models::Asset;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node returned {status}: {body}")]
    Node { status: u16, body: String },

    #[error("Unexpected node response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid node response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Point queries against the node's chain API
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_info(&self) -> Result<ChainInfo, ClientError>;

    async fn get_block(&self, block_num: u32) -> Result<Block, ClientError>;

    async fn get_account(&self, name: &str) -> Result<AccountResponse, ClientError>;

    async fn get_currency_balance(
        &self,
        account: &str,
        symbol: &str,
        code: &str,
    ) -> Result<Vec<Asset>, ClientError>;

    async fn get_table_rows(&self, request: &TableRowsRequest) -> Result<TableRows, ClientError>;

    /// Submit a signed packed transaction, given as the node's JSON form
    async fn push_transaction(
        &self,
        transaction: &serde_json::Value,
    ) -> Result<PushTransactionResponse, ClientError>;
}

/// [`ChainClient`] over the node's HTTP `/v1/chain` API
pub struct EosRpcClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl EosRpcClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(config.rpc_timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let limiter = config
            .rpc_rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        info!(
            "Initializing node client with RPC endpoint: {}, rate limit: {:?}",
            config.node_rpc_url, config.rpc_rate_limit
        );

        Ok(Self {
            http,
            base_url: config.node_rpc_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    async fn call<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}/v1/chain/{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            if status.as_u16() == 404 {
                return Err(ClientError::NotFound(body));
            }
            return Err(ClientError::Node {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ChainClient for EosRpcClient {
    async fn get_info(&self) -> Result<ChainInfo, ClientError> {
        self.call("get_info", &json!({})).await
    }

    async fn get_block(&self, block_num: u32) -> Result<Block, ClientError> {
        self.call("get_block", &json!({ "block_num_or_id": block_num }))
            .await
    }

    async fn get_account(&self, name: &str) -> Result<AccountResponse, ClientError> {
        self.call("get_account", &json!({ "account_name": name }))
            .await
    }

    async fn get_currency_balance(
        &self,
        account: &str,
        symbol: &str,
        code: &str,
    ) -> Result<Vec<Asset>, ClientError> {
        let raw: Vec<String> = self
            .call(
                "get_currency_balance",
                &json!({ "code": code, "account": account, "symbol": symbol }),
            )
            .await?;

        raw.iter()
            .map(|text| {
                text.parse()
                    .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", text, e)))
            })
            .collect()
    }

    async fn get_table_rows(&self, request: &TableRowsRequest) -> Result<TableRows, ClientError> {
        self.call("get_table_rows", request).await
    }

    async fn push_transaction(
        &self,
        transaction: &serde_json::Value,
    ) -> Result<PushTransactionResponse, ClientError> {
        self.call("push_transaction", transaction).await
    }
}
