//! Node wire types and action payload decoding.
//!
//! These mirror the JSON the node's chain API returns. Blocks arrive with
//! their transactions already expanded by the node, so "unpacking" a packed
//! transaction means decoding that expanded body into typed actions.

use crate::models::asset::{self, Asset};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract hosting the default token actions
pub const TOKEN_CONTRACT: &str = "eosio.token";
/// System contract hosting the RAM market actions
pub const SYSTEM_CONTRACT: &str = "eosio";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Transaction {0} has no expanded body")]
    MissingBody(String),

    #[error("Malformed transaction body: {0}")]
    Body(#[source] serde_json::Error),

    #[error("Cannot decode {account}::{name} payload: {source}")]
    Payload {
        account: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid transaction id: {0}")]
    TransactionId(String),
}

/// Node timestamps are UTC without a zone suffix, e.g. `2018-06-09T11:56:30.500`
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), FORMAT).map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
    }
}

/// `get_info` reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub head_block_num: u32,
    pub head_block_id: String,
    #[serde(with = "timestamp")]
    pub head_block_time: DateTime<Utc>,
    pub last_irreversible_block_num: u32,
    pub last_irreversible_block_id: String,
}

/// `get_block` reply, trimmed to what the bridge reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub block_num: u32,
    pub id: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub transactions: Vec<TransactionReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    #[serde(default)]
    pub status: String,
    pub trx: Trx,
}

/// Deferred transactions are referenced by id only; everything else is packed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trx {
    Id(String),
    Packed(PackedTransaction),
}

impl Trx {
    pub fn packed(&self) -> Option<&PackedTransaction> {
        match self {
            Trx::Packed(packed) => Some(packed),
            Trx::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedTransaction {
    pub id: String,
    #[serde(default)]
    pub packed_trx: String,
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
}

impl PackedTransaction {
    pub fn unpack(&self) -> Result<Transaction, DecodeError> {
        let body = self
            .transaction
            .as_ref()
            .ok_or_else(|| DecodeError::MissingBody(self.id.clone()))?;
        Transaction::deserialize(body).map_err(DecodeError::Body)
    }

    pub fn id_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        hex::decode(&self.id).map_err(|_| DecodeError::TransactionId(self.id.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub context_free_actions: Vec<RawAction>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

/// An action as the node reports it, with `data` still untyped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    #[serde(deserialize_with = "asset::deserialize_from_str")]
    pub quantity: Asset,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub to: String,
    #[serde(deserialize_with = "asset::deserialize_from_str")]
    pub quantity: Asset,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuyRam {
    pub payer: String,
    pub receiver: String,
    #[serde(deserialize_with = "asset::deserialize_from_str")]
    pub quant: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuyRamBytes {
    pub payer: String,
    pub receiver: String,
    pub bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SellRam {
    pub account: String,
    pub bytes: i64,
}

/// An action resolved to one of the payloads the bridge understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    Transfer(Transfer),
    Issue(Issue),
    BuyRam(BuyRam),
    BuyRamBytes(BuyRamBytes),
    SellRam(SellRam),
    Unregistered,
}

impl RawAction {
    /// Resolve `(account, name)` to a typed payload.
    ///
    /// Unknown actions come back as [`ChainAction::Unregistered`]; a known
    /// action whose payload does not decode is an error.
    pub fn map_registered(&self) -> Result<ChainAction, DecodeError> {
        let action = match (self.account.as_str(), self.name.as_str()) {
            (TOKEN_CONTRACT, "transfer") => ChainAction::Transfer(self.decode()?),
            (TOKEN_CONTRACT, "issue") => ChainAction::Issue(self.decode()?),
            (SYSTEM_CONTRACT, "buyram") => ChainAction::BuyRam(self.decode()?),
            (SYSTEM_CONTRACT, "buyrambytes") => ChainAction::BuyRamBytes(self.decode()?),
            (SYSTEM_CONTRACT, "sellram") => ChainAction::SellRam(self.decode()?),
            _ => ChainAction::Unregistered,
        };
        Ok(action)
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        T::deserialize(&self.data).map_err(|source| DecodeError::Payload {
            account: self.account.clone(),
            name: self.name.clone(),
            source,
        })
    }
}

/// `get_account` reply
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub account_name: String,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Permission {
    pub perm_name: String,
    #[serde(default)]
    pub parent: String,
    pub required_auth: Authority,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Authority {
    pub threshold: u32,
    #[serde(default)]
    pub keys: Vec<KeyWeight>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyWeight {
    pub key: String,
    pub weight: u16,
}

impl AccountResponse {
    /// The single owner key, or an empty string when ownership is not a
    /// single key
    pub fn owner_key(&self) -> String {
        self.permissions
            .iter()
            .find(|p| p.perm_name == "owner")
            .filter(|p| p.required_auth.keys.len() == 1)
            .map(|p| p.required_auth.keys[0].key.clone())
            .unwrap_or_default()
    }
}

/// `get_table_rows` request
#[derive(Debug, Clone, Serialize)]
pub struct TableRowsRequest {
    pub code: String,
    pub scope: String,
    pub table: String,
    pub json: bool,
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRows {
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub more: bool,
}

/// Row of the system contract's `rammarket` table
#[derive(Debug, Clone, Deserialize)]
pub struct RamMarket {
    #[serde(deserialize_with = "asset::deserialize_from_str")]
    pub supply: Asset,
    pub base: BalanceWeight,
    pub quote: BalanceWeight,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceWeight {
    #[serde(deserialize_with = "asset::deserialize_from_str")]
    pub balance: Asset,
}

impl RamMarket {
    /// Bytes of RAM one whole core token buys, after the 0.5% market fee
    pub fn price_per_token(&self) -> f64 {
        // 10000 == 1 token at precision 4
        let ratio = self.quote.balance.amount as f64 / self.base.balance.amount as f64;
        (10000.0 - ((10000.0 + 199.0) / 200.0)) / ratio
    }
}

/// `push_transaction` reply
#[derive(Debug, Clone, Deserialize)]
pub struct PushTransactionResponse {
    pub transaction_id: String,
    #[serde(default)]
    pub processed: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_with_packed_and_deferred_transactions() {
        let raw = json!({
            "block_num": 42,
            "id": "0000002a",
            "timestamp": "2018-06-09T11:56:30.500",
            "transactions": [
                { "status": "executed", "trx": "deadbeef" },
                {
                    "status": "executed",
                    "trx": {
                        "id": "abcd",
                        "packed_trx": "00",
                        "transaction": {
                            "actions": [{
                                "account": "eosio.token",
                                "name": "transfer",
                                "data": { "from": "bob", "to": "alice", "quantity": "5.0000 EOS", "memo": "hi" }
                            }]
                        }
                    }
                }
            ]
        });

        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.block_num, 42);
        assert!(block.transactions[0].trx.packed().is_none());

        let packed = block.transactions[1].trx.packed().unwrap();
        assert_eq!(packed.id_bytes().unwrap(), vec![0xab, 0xcd]);

        let tx = packed.unpack().unwrap();
        match tx.actions[0].map_registered().unwrap() {
            ChainAction::Transfer(t) => {
                assert_eq!(t.to, "alice");
                assert_eq!(t.quantity, Asset::new("EOS", 50000, 4));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn unknown_actions_are_unregistered() {
        let action = RawAction {
            account: "eosio.token".into(),
            name: "open".into(),
            data: json!({}),
        };
        assert_eq!(action.map_registered().unwrap(), ChainAction::Unregistered);
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        // node could not apply an ABI and left the raw hex
        let action = RawAction {
            account: "eosio.token".into(),
            name: "transfer".into(),
            data: json!("0000000000ea3055"),
        };
        assert!(matches!(action.map_registered(), Err(DecodeError::Payload { .. })));
    }

    #[test]
    fn missing_body_fails_unpack() {
        let packed = PackedTransaction {
            id: "ff".into(),
            packed_trx: "00".into(),
            transaction: None,
        };
        assert!(matches!(packed.unpack(), Err(DecodeError::MissingBody(_))));
    }

    #[test]
    fn owner_key_requires_single_key() {
        let account: AccountResponse = serde_json::from_value(json!({
            "account_name": "alice",
            "created": "2018-06-09T11:56:30.000",
            "permissions": [
                { "perm_name": "active", "parent": "owner",
                  "required_auth": { "threshold": 1, "keys": [{ "key": "EOS_ACTIVE", "weight": 1 }] } },
                { "perm_name": "owner", "parent": "",
                  "required_auth": { "threshold": 1, "keys": [{ "key": "EOS_OWNER", "weight": 1 }] } }
            ]
        }))
        .unwrap();
        assert_eq!(account.owner_key(), "EOS_OWNER");
    }

    #[test]
    fn ram_price_from_market() {
        let market: RamMarket = serde_json::from_value(json!({
            "supply": "10000000000.0000 RAMCORE",
            "base": { "balance": "1000 RAM", "weight": "0.50000000000000000" },
            "quote": { "balance": "1.0000 EOS", "weight": "0.50000000000000000" }
        }))
        .unwrap();
        // ratio 10000 / 1000 = 10 → (10000 - 50.995) / 10
        assert!((market.price_per_token() - 994.9005).abs() < 1e-9);
    }
}
