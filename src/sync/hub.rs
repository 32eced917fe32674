use crate::models::ActionRecord;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// The bounded history channel shared by every live and resync session.
///
/// Producers hold clones of the sender; history streams take turns on the
/// single receiver.
#[derive(Clone)]
pub struct HistoryHub {
    sender: mpsc::Sender<ActionRecord>,
    receiver: Arc<Mutex<mpsc::Receiver<ActionRecord>>>,
}

impl HistoryHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<ActionRecord> {
        self.sender.clone()
    }

    /// Next record; cancel-safe, the lock is released if the future is dropped
    pub async fn recv(&self) -> Option<ActionRecord> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }
}
