//! Delivery of classified actions to tracked accounts

use crate::models::ActionRecord;
use crate::tracking::registry::TrackedAccounts;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Candidate is not tracked; nothing sent
    Untracked,
    Delivered,
    /// Cancellation won the race against a full channel
    Cancelled,
    /// Receiving side of the history channel is gone
    Closed,
}

/// Enriches records for tracked accounts and pushes them onto a bounded
/// history channel.
///
/// A full channel blocks the caller until a slot frees or the supplied
/// cancellation token fires, whichever comes first.
#[derive(Clone)]
pub struct HistoryDispatcher {
    registry: TrackedAccounts,
    history: mpsc::Sender<ActionRecord>,
    resync: bool,
}

impl HistoryDispatcher {
    pub fn new(registry: TrackedAccounts, history: mpsc::Sender<ActionRecord>, resync: bool) -> Self {
        Self {
            registry,
            history,
            resync,
        }
    }

    pub async fn dispatch(
        &self,
        record: &ActionRecord,
        candidate: &str,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let Some(user) = self.registry.lookup(candidate).await else {
            return DispatchOutcome::Untracked;
        };

        debug!("found action for {}", candidate);
        let enriched = record.enriched(candidate, &user, self.resync);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => DispatchOutcome::Cancelled,
            sent = self.history.send(enriched) => match sent {
                Ok(()) => DispatchOutcome::Delivered,
                Err(_) => DispatchOutcome::Closed,
            },
        }
    }
}
