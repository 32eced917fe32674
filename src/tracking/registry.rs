//! Tracked account registry

use crate::models::TrackedUser;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Shared map of tracked accounts to backend user metadata.
///
/// Cloning shares the same map. Writers are serialized map-wide; a delivery
/// racing an update may see either version of an entry.
#[derive(Clone, Default)]
pub struct TrackedAccounts {
    accounts: Arc<RwLock<HashMap<String, TrackedUser>>>,
}

impl TrackedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// A standalone registry holding exactly one account
    pub fn single(account: &str, user: TrackedUser) -> Self {
        let accounts = HashMap::from([(account.to_string(), user)]);
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }

    /// Replace the whole mapping
    pub async fn set_all(&self, entries: HashMap<String, TrackedUser>) {
        let count = entries.len();
        *self.accounts.write().await = entries;
        debug!("Tracked accounts replaced, {} entries", count);
    }

    /// Insert or overwrite one account
    pub async fn add(&self, account: &str, user: TrackedUser) {
        self.accounts.write().await.insert(account.to_string(), user);
        debug!("Tracking account {}", account);
    }

    pub async fn lookup(&self, account: &str) -> Option<TrackedUser> {
        self.accounts.read().await.get(account).cloned()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}
