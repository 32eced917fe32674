use crate::blockchain::classifier::{classify, ActionOrigin};
use crate::blockchain::models::RawAction;
use crate::tracking::HistoryDispatcher;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pending actions per handler before block processing waits on the workers
pub const ACTION_QUEUE_SIZE: usize = 1000;

/// One action lifted out of a block, waiting to be classified and dispatched
#[derive(Debug, Clone)]
pub struct ActionJob {
    pub action: RawAction,
    pub origin: ActionOrigin,
    /// Dropped once the job is dispatched or discarded
    pub done: Option<mpsc::Sender<()>>,
}

/// Workers that classify and dispatch actions for one block handler.
///
/// Jobs are pulled from a shared queue by whichever worker is free, so
/// deliveries from different actions can interleave in any order. The pool
/// has no join point: workers stop when the handler is cancelled or every
/// sender is dropped.
pub struct DispatchPool {
    workers: Vec<tokio::task::JoinHandle<()>>,
    sender: mpsc::Sender<ActionJob>,
}

impl DispatchPool {
    pub fn new(
        name: &str,
        dispatcher: HistoryDispatcher,
        cancel: CancellationToken,
        worker_count: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(ACTION_QUEUE_SIZE);
        let receiver = Arc::new(Mutex::new(receiver));

        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker = Worker {
                id,
                name: name.to_string(),
                dispatcher: dispatcher.clone(),
                receiver: receiver.clone(),
                cancel: cancel.clone(),
            };

            workers.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        Self { workers, sender }
    }

    pub fn get_sender(&self) -> mpsc::Sender<ActionJob> {
        self.sender.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// True once every worker has exited
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|w| w.is_finished())
    }
}

struct Worker {
    id: usize,
    name: String,
    dispatcher: HistoryDispatcher,
    receiver: Arc<Mutex<mpsc::Receiver<ActionJob>>>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(&self) {
        debug!("{} worker {} started", self.name, self.id);

        loop {
            let job = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    job = receiver.recv() => job,
                }
            };

            match job {
                Some(job) => self.process_action(job).await,
                None => break,
            }
        }

        debug!("{} worker {} shutting down", self.name, self.id);
    }

    async fn process_action(&self, job: ActionJob) {
        let action = match job.action.map_registered() {
            Ok(action) => action,
            Err(e) => {
                warn!("{} (block {}, {})", e, job.origin.block_num, self.name);
                return;
            }
        };

        let Some(classified) = classify(&action, &job.action.account, &job.origin) else {
            return;
        };

        for target in &classified.targets {
            self.dispatcher
                .dispatch(&classified.record, target, &self.cancel)
                .await;
        }
    }
}
