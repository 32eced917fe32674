//! Maps decoded chain actions to normalized history records.
//!
//! Classification is independent of tracking: it decides what an action
//! means and which accounts it concerns, the dispatcher decides who cares.

use crate::blockchain::models::ChainAction;
use crate::models::{ActionKind, ActionRecord, Asset};

/// Where an action was found
#[derive(Debug, Clone)]
pub struct ActionOrigin {
    pub transaction_id: Vec<u8>,
    pub action_index: i64,
    pub block_num: u32,
}

/// A classified action and the accounts it should be offered to
#[derive(Debug, Clone)]
pub struct Classified {
    pub record: ActionRecord,
    pub targets: Vec<String>,
}

/// `contract` is the account the action was executed on; issuance reports it
/// as the sender.
pub fn classify(action: &ChainAction, contract: &str, origin: &ActionOrigin) -> Option<Classified> {
    let (kind, from, to, amount, memo, targets) = match action {
        ChainAction::Transfer(op) => (
            ActionKind::TransferToken,
            op.from.clone(),
            op.to.clone(),
            op.quantity.clone(),
            op.memo.clone(),
            vec![op.from.clone(), op.to.clone()],
        ),
        ChainAction::Issue(op) => (
            ActionKind::IssueToken,
            contract.to_string(),
            op.to.clone(),
            op.quantity.clone(),
            op.memo.clone(),
            vec![op.to.clone()],
        ),
        ChainAction::BuyRam(op) => (
            ActionKind::BuyRam,
            op.payer.clone(),
            op.receiver.clone(),
            op.quant.clone(),
            String::new(),
            vec![op.payer.clone(), op.receiver.clone()],
        ),
        ChainAction::BuyRamBytes(op) => (
            ActionKind::BuyRamBytes,
            op.payer.clone(),
            op.receiver.clone(),
            Asset::ram(i64::from(op.bytes)),
            String::new(),
            vec![op.payer.clone(), op.receiver.clone()],
        ),
        // RAM is sold back to the seller
        ChainAction::SellRam(op) => (
            ActionKind::SellRam,
            op.account.clone(),
            op.account.clone(),
            Asset::ram(op.bytes),
            String::new(),
            vec![op.account.clone()],
        ),
        ChainAction::Unregistered => return None,
    };

    let record = ActionRecord {
        kind,
        from,
        to,
        amount,
        memo,
        transaction_id: origin.transaction_id.clone(),
        action_index: origin.action_index,
        block_num: origin.block_num,
        resync: false,
        user_id: String::new(),
        wallet_index: 0,
        address_index: 0,
        address: String::new(),
    };

    Some(Classified { record, targets })
}
