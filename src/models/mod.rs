// Domain records handed to the backend: tracked users, normalized actions,
// chain summaries and query replies

pub mod asset;

pub use asset::{Asset, AssetError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend wallet metadata attached to a tracked account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUser {
    pub user_id: String,
    pub wallet_index: i32,
    pub address_index: i32,
}

/// A tracked account together with its metadata, as sent by `AddNewAddress`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchAddress {
    pub address: String,
    pub user_id: String,
    pub wallet_index: i32,
    pub address_index: i32,
}

impl WatchAddress {
    pub fn user(&self) -> TrackedUser {
        TrackedUser {
            user_id: self.user_id.clone(),
            wallet_index: self.wallet_index,
            address_index: self.address_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    TransferToken,
    IssueToken,
    BuyRam,
    BuyRamBytes,
    SellRam,
}

/// A normalized chain action, enriched per delivery target.
///
/// The first block of fields is fixed by the classifier. `resync`, `user_id`,
/// `wallet_index`, `address_index` and `address` are filled in by the history
/// dispatcher for the tracked account a copy is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub from: String,
    pub to: String,
    pub amount: Asset,
    pub memo: String,
    #[serde(with = "hex::serde")]
    pub transaction_id: Vec<u8>,
    pub action_index: i64,
    pub block_num: u32,

    pub resync: bool,
    pub user_id: String,
    pub wallet_index: i32,
    pub address_index: i32,
    pub address: String,
}

impl ActionRecord {
    /// Copy of this record enriched for one tracked account
    pub fn enriched(&self, address: &str, user: &TrackedUser, resync: bool) -> Self {
        Self {
            resync,
            user_id: user.user_id.clone(),
            wallet_index: user.wallet_index,
            address_index: user.address_index,
            address: address.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeight {
    pub head_block_num: u32,
    pub head_block_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    pub head_block_num: u32,
    pub head_block_id: String,
    pub head_block_time: i64,
    pub last_irreversible_block_num: u32,
    pub last_irreversible_block_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub version: String,
    pub branch: String,
    pub commit: String,
    pub buildtime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub exist: bool,
    pub public_key: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub balance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balances {
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamPrice {
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTxResponse {
    pub transaction_id: String,
}
