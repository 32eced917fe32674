#[cfg(test)]
mod tests {
    use crate::{
        cache::BlockTimeCache,
        config::Config,
        models::{Asset, BlockHeight, WatchAddress},
        service::NodeService,
        sync::{HistoryHub, LiveSessions, ResyncError, SessionError},
        tests::mock::{block_id, empty_block, transfer_block, user, MockBlockSource, MockChain},
        tracking::TrackedAccounts,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        chain: Arc<MockChain>,
        source: Arc<MockBlockSource>,
        subscriptions: mpsc::UnboundedReceiver<crate::tests::mock::Subscription>,
        registry: TrackedAccounts,
        hub: HistoryHub,
    }

    impl Fixture {
        fn new(head: u32) -> Self {
            let (source, subscriptions) = MockBlockSource::new();
            Self {
                chain: Arc::new(MockChain::new(head)),
                source: Arc::new(source),
                subscriptions,
                registry: TrackedAccounts::new(),
                hub: HistoryHub::new(100),
            }
        }

        fn live(&self) -> LiveSessions {
            LiveSessions::new(
                self.chain.clone(),
                self.source.clone(),
                self.registry.clone(),
                self.hub.clone(),
                2,
            )
        }

        fn service(&self, shutdown: &CancellationToken) -> NodeService {
            NodeService::new(
                &Config::default(),
                self.chain.clone(),
                self.source.clone(),
                BlockTimeCache::new(1_000, Duration::from_secs(60)),
                shutdown.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_new_block_streams_heights_until_cancelled() {
        let mut fx = Fixture::new(1_000);
        let live = fx.live();
        let (out, mut heights) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { live.new_block(out, cancel).await })
        };

        let sub = timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();
        assert!(sub.position.is_none());
        sub.handler.handle(&empty_block(1_001)).await;

        let height = timeout(WAIT, heights.recv()).await.unwrap().unwrap();
        assert_eq!(
            height,
            BlockHeight {
                head_block_num: 1_001,
                head_block_id: block_id(1_001),
            }
        );

        cancel.cancel();
        let end = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(end, Err(SessionError::Cancelled)));
        assert_eq!(fx.source.unsubscribed(), vec![sub.handle.id()]);
    }

    #[tokio::test]
    async fn test_cancel_ends_session_blocked_on_full_stream() {
        let mut fx = Fixture::new(1_000);
        let live = fx.live();
        // the client stays connected but stops reading
        let (out, _heights) = mpsc::channel::<BlockHeight>(1);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { live.new_block(out, cancel).await })
        };

        let sub = timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();
        sub.handler.handle(&empty_block(1_001)).await;
        sub.handler.handle(&empty_block(1_002)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let end = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(end, Err(SessionError::Cancelled)));
        assert_eq!(fx.source.unsubscribed(), vec![sub.handle.id()]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_session() {
        let mut fx = Fixture::new(1_000);
        let live = fx.live();
        let (out, heights) = mpsc::channel::<BlockHeight>(8);

        let task = tokio::spawn(async move { live.new_block(out, CancellationToken::new()).await });
        let sub = timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();

        drop(heights);
        let end = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(end, Err(SessionError::Cancelled)));
        assert_eq!(fx.source.unsubscribed(), vec![sub.handle.id()]);
    }

    #[tokio::test]
    async fn test_new_tx_follows_head_and_relays_history() {
        let mut fx = Fixture::new(1_000);
        fx.registry.add("alice", user("u1")).await;
        let live = fx.live();
        let (out, mut records) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { live.new_tx(0, out, cancel).await })
        };

        let sub = timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();
        assert_eq!(sub.position.as_ref().unwrap().block_num, 1_000);

        sub.handler
            .handle(&transfer_block(1_001, "bob", "alice", "5.0000 EOS"))
            .await;
        let record = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(record.to, "alice");
        assert_eq!(record.user_id, "u1");
        assert!(!record.resync);

        // tracking changes apply to a running session
        fx.registry.add("bob", user("u2")).await;
        sub.handler
            .handle(&transfer_block(1_002, "carol", "bob", "1.0000 EOS"))
            .await;
        let record = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(record.user_id, "u2");

        cancel.cancel();
        let end = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(end, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_new_tx_starts_from_requested_block() {
        let mut fx = Fixture::new(1_000);
        let live = fx.live();
        let (out, _records) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { live.new_tx(500, out, cancel).await })
        };

        let sub = timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();
        assert_eq!(sub.position.as_ref().unwrap().block_num, 500);

        cancel.cancel();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    }

    #[tokio::test]
    async fn test_new_tx_fails_for_missing_start_block() {
        let fx = Fixture::new(1_000);
        let live = fx.live();
        let (out, _records) = mpsc::channel(8);

        let end = live.new_tx(2_000, out, CancellationToken::new()).await;
        assert!(matches!(end, Err(SessionError::Client(_))));
    }

    #[tokio::test]
    async fn test_balances() {
        let fx = Fixture::new(1_000);
        let shutdown = CancellationToken::new();
        let service = fx.service(&shutdown);

        fx.chain.set_balances(vec![Asset::new("EOS", 12345, 4)]);
        let balance = service.address_balance("alice").await.unwrap();
        assert_eq!(balance.balance, "1.2345 EOS");

        fx.chain
            .set_balances(vec![Asset::new("EOS", 1, 4), Asset::new("EOS", 2, 4)]);
        assert!(service.address_balance("alice").await.is_err());

        fx.chain.set_balances(vec![]);
        assert!(service.address_balance("alice").await.is_err());

        let balances = service.token_balance("alice", "EOS", "").await.unwrap();
        assert!(balances.assets.is_empty());
        service.token_balance("alice", "TKN", "tokens").await.unwrap();

        let calls = fx.chain.balance_calls();
        let codes: Vec<&str> = calls.iter().map(|(_, _, code)| code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["eosio.token", "eosio.token", "eosio.token", "eosio.token", "tokens"]
        );
        assert_eq!(calls[4].1, "TKN");
    }

    #[tokio::test]
    async fn test_ram_price() {
        let fx = Fixture::new(1_000);
        let service = fx.service(&CancellationToken::new());

        assert!(service.ram_price().await.is_err());

        fx.chain.set_table_rows(vec![json!({
            "supply": "10000000000.0000 RAMCORE",
            "base": { "balance": "68719476736 RAM", "weight": "0.50000000000000000" },
            "quote": { "balance": "1000000.0000 EOS", "weight": "0.50000000000000000" }
        })]);

        let price = service.ram_price().await.unwrap();
        let expected = (10000.0 - (10199.0 / 200.0)) / (10_000_000_000.0 / 68_719_476_736.0);
        assert!((price - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_account_check() {
        let fx = Fixture::new(1_000);
        let service = fx.service(&CancellationToken::new());

        let missing = service.account_check("nobody").await;
        assert!(!missing.exist);
        assert!(missing.public_key.is_empty());
        assert!(missing.created.is_none());
    }

    #[tokio::test]
    async fn test_tracking_and_sync_state() {
        let fx = Fixture::new(1_000);
        let service = fx.service(&CancellationToken::new());

        let users = HashMap::from([
            ("alice".to_string(), user("u1")),
            ("bob".to_string(), user("u2")),
        ]);
        service.initial_add(users).await;
        assert_eq!(service.registry().len().await, 2);

        service
            .add_new_address(&WatchAddress {
                address: "carol".into(),
                user_id: "u3".into(),
                wallet_index: 1,
                address_index: 2,
            })
            .await;
        let carol = service.registry().lookup("carol").await.unwrap();
        assert_eq!((carol.wallet_index, carol.address_index), (1, 2));

        // replacing drops accounts missing from the new set
        service
            .initial_add(HashMap::from([("dave".to_string(), user("u4"))]))
            .await;
        assert!(service.registry().lookup("alice").await.is_none());

        assert_eq!(service.start_block(), 0);
        service.sync_state(777);
        assert_eq!(service.start_block(), 777);
    }

    #[tokio::test]
    async fn test_resync_is_single_flight_per_address() {
        let mut fx = Fixture::new(1_000);
        let shutdown = CancellationToken::new();
        let service = fx.service(&shutdown);

        assert!(matches!(
            service.resync_address("alice").await,
            Err(ResyncError::NotTracked(_))
        ));

        service.registry().add("alice", user("u1")).await;
        service.resync_address("alice").await.unwrap();
        assert!(service.is_resyncing("alice"));
        assert!(matches!(
            service.resync_address("alice").await,
            Err(ResyncError::AlreadyRunning(_))
        ));

        // wait until the background session is subscribed, then shut down
        timeout(WAIT, fx.subscriptions.recv()).await.unwrap().unwrap();
        shutdown.cancel();

        timeout(WAIT, async {
            while service.is_resyncing("alice") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_block_height_and_chain_state() {
        let fx = Fixture::new(1_000);
        let service = fx.service(&CancellationToken::new());

        let height = service.block_height().await.unwrap();
        assert_eq!(height.head_block_num, 1_000);

        let state = service.chain_state().await.unwrap();
        assert_eq!(state.head_block_num, 1_000);
        assert_eq!(state.last_irreversible_block_num, 675);

        let id = service.send_raw_tx(&json!({ "signatures": [] })).await.unwrap();
        assert_eq!(id, "feedface");
    }
}
