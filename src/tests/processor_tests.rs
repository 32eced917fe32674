#[cfg(test)]
mod tests {
    use crate::{
        blockchain::processor::{BlockDataHandler, BlockHandler},
        models::{ActionKind, ActionRecord, Asset},
        tests::mock::{block_with, packed, transfer_action, transfer_block, user},
        tracking::{DispatchOutcome, HistoryDispatcher, TrackedAccounts},
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(200);

    fn handler(
        registry: TrackedAccounts,
        capacity: usize,
        cancel: &CancellationToken,
    ) -> (BlockDataHandler, mpsc::Receiver<ActionRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        let dispatcher = HistoryDispatcher::new(registry, tx, false);
        (BlockDataHandler::new("test", dispatcher, cancel.clone(), 2), rx)
    }

    #[tokio::test]
    async fn test_transfer_to_tracked_account_is_delivered_once() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        let cancel = CancellationToken::new();
        let (handler, mut rx) = handler(registry, 10, &cancel);

        handler
            .handle(&transfer_block(7, "bob", "alice", "5.0000 EOS"))
            .await;

        let record = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.kind, ActionKind::TransferToken);
        assert_eq!(record.from, "bob");
        assert_eq!(record.to, "alice");
        assert_eq!(record.amount, Asset::new("EOS", 50000, 4));
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.address, "alice");
        assert_eq!(record.block_num, 7);
        assert_eq!(record.transaction_id, vec![0xab, 0xcd]);
        assert!(!record.resync);

        // bob is not tracked
        assert!(timeout(QUIET, rx.recv()).await.is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_empty_registry_delivers_nothing() {
        let cancel = CancellationToken::new();
        let (handler, mut rx) = handler(TrackedAccounts::new(), 10, &cancel);

        handler
            .handle(&transfer_block(7, "bob", "alice", "5.0000 EOS"))
            .await;

        assert!(timeout(QUIET, rx.recv()).await.is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_transfer_between_tracked_accounts_reaches_both() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        registry.add("bob", user("u2")).await;
        let cancel = CancellationToken::new();
        let (handler, mut rx) = handler(registry, 10, &cancel);

        handler
            .handle(&transfer_block(7, "bob", "alice", "1.0000 EOS"))
            .await;

        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let mut users = vec![first.user_id, second.user_id];
        users.sort();
        assert_eq!(users, vec!["u1", "u2"]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_bad_transactions_do_not_stop_the_block() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        let cancel = CancellationToken::new();
        let (handler, mut rx) = handler(registry, 10, &cancel);

        let block = block_with(
            9,
            vec![
                // id is not hex
                packed("zz", vec![transfer_action("bob", "alice", "1.0000 EOS")]),
                // payload left undecoded by the node
                packed(
                    "01",
                    vec![json!({ "account": "eosio.token", "name": "transfer", "data": "00ff" })],
                ),
                packed("02", vec![transfer_action("carol", "alice", "2.0000 EOS")]),
            ],
        );
        handler.handle(&block).await;

        let record = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.from, "carol");
        assert_eq!(record.transaction_id, vec![0x02]);
        assert!(timeout(QUIET, rx.recv()).await.is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_progress_is_reported_after_each_block() {
        let cancel = CancellationToken::new();
        let (progress_tx, mut progress) = mpsc::channel(4);
        let (handler, _rx) = handler(TrackedAccounts::new(), 10, &cancel);
        let handler = handler.with_progress(progress_tx);

        handler.handle(&transfer_block(11, "bob", "alice", "1.0000 EOS")).await;
        handler.handle(&transfer_block(12, "bob", "alice", "1.0000 EOS")).await;

        assert_eq!(progress.recv().await, Some(11));
        assert_eq!(progress.recv().await, Some(12));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_progress_waits_for_block_deliveries() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        let cancel = CancellationToken::new();
        let (progress_tx, mut progress) = mpsc::channel(4);
        let (handler, mut rx) = handler(registry, 1, &cancel);
        let handler = Arc::new(handler.with_progress(progress_tx));

        let block = block_with(
            5,
            vec![
                packed("01", vec![transfer_action("bob", "alice", "1.0000 EOS")]),
                packed("02", vec![transfer_action("carol", "alice", "2.0000 EOS")]),
            ],
        );
        let task = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle(&block).await })
        };

        // the second delivery is stuck behind the unread first one
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(progress.try_recv().is_err());
        assert!(!task.is_finished());

        timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(timeout(WAIT, progress.recv()).await.unwrap(), Some(5));
        timeout(WAIT, task).await.unwrap().unwrap();
        timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_blocked_send_is_abandoned_on_cancel() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        let (tx, _rx) = mpsc::channel(100);
        let dispatcher = HistoryDispatcher::new(registry, tx, false);
        let cancel = CancellationToken::new();

        let record = ActionRecord {
            kind: ActionKind::TransferToken,
            from: "bob".to_string(),
            to: "alice".to_string(),
            amount: Asset::new("EOS", 10000, 4),
            memo: String::new(),
            transaction_id: vec![0xab, 0xcd],
            action_index: 0,
            block_num: 1,
            resync: false,
            user_id: String::new(),
            wallet_index: 0,
            address_index: 0,
            address: String::new(),
        };

        // nobody reads the history channel
        for _ in 0..100 {
            assert_eq!(
                dispatcher.dispatch(&record, "alice", &cancel).await,
                DispatchOutcome::Delivered
            );
        }

        let blocked = {
            let dispatcher = dispatcher.clone();
            let record = record.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.dispatch(&record, "alice", &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        cancel.cancel();
        let outcome = timeout(WAIT, blocked).await.unwrap().unwrap();
        assert_eq!(outcome, DispatchOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_workers_exit_after_cancel_with_full_channel() {
        let registry = TrackedAccounts::single("alice", user("u1"));
        let cancel = CancellationToken::new();
        let (handler, _rx) = handler(registry, 1, &cancel);

        let block = block_with(
            3,
            (0..5u8)
                .map(|i| packed(&format!("{:02x}", i), vec![transfer_action("bob", "alice", "1.0000 EOS")]))
                .collect(),
        );
        handler.handle(&block).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handler.pool().is_finished());

        cancel.cancel();
        timeout(WAIT, async {
            while !handler.pool().is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // a cancelled handler ignores further blocks
        handler.handle(&block).await;
    }
}
