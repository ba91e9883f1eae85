//! End-to-end session behaviour against the in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chainsub_client::{MemoryTransport, SubscriberClient, SubscriberConfig, Subscription};
use chainsub_core::{
    ClientEvent, ControlEvent, Encoding, EventHandler, ReconnectConfig, StaticTokenProvider,
    StatusCode, SubscribeError, TransactionEvent,
};

#[derive(Default)]
struct Recorded {
    statuses: Vec<ControlEvent>,
    errors: Vec<String>,
    transactions: Vec<String>,
    mempool: Vec<String>,
}

type Shared = Arc<Mutex<Recorded>>;

fn status_only(rec: &Shared) -> EventHandler {
    let (s, e) = (rec.clone(), rec.clone());
    EventHandler::new(
        move |ev| s.lock().unwrap().statuses.push(ev.clone()),
        move |err| e.lock().unwrap().errors.push(err.to_string()),
    )
}

fn with_transactions(rec: &Shared) -> EventHandler {
    let t = rec.clone();
    status_only(rec).on_transaction(move |tx| t.lock().unwrap().transactions.push(tx.id.clone()))
}

fn with_everything(rec: &Shared) -> EventHandler {
    let m = rec.clone();
    with_transactions(rec).on_mempool(move |tx| m.lock().unwrap().mempool.push(tx.id.clone()))
}

fn client_with(transport: &MemoryTransport, reconnect: ReconnectConfig) -> SubscriberClient {
    let mut config = SubscriberConfig::new("indexer.local");
    config.reconnect = reconnect;
    SubscriberClient::new(
        config,
        Arc::new(transport.clone()),
        Arc::new(StaticTokenProvider::new("token")),
    )
}

fn client(transport: &MemoryTransport) -> SubscriberClient {
    client_with(
        transport,
        ReconnectConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
        },
    )
}

fn confirmation(block: u64) -> Vec<u8> {
    Encoding::Protobuf
        .encode(&ControlEvent::labelled(StatusCode::Subscribed, "block-done", "").with_block(block))
        .unwrap()
}

fn transaction(id: &str) -> Vec<u8> {
    Encoding::Protobuf
        .encode(&TransactionEvent {
            id: id.into(),
            block_height: 10,
            ..Default::default()
        })
        .unwrap()
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

async fn subscribe(c: &SubscriberClient, id: &str, block: u64, handler: EventHandler) -> Subscription {
    c.subscribe(id, block, handler).await.unwrap()
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_then_unsubscribe_leaves_nothing_live() {
    for (id, block) in [("a", 0u64), ("b", 812_345), ("c", u64::MAX)] {
        let transport = MemoryTransport::new();
        let rec = Shared::default();
        let sub = subscribe(&client(&transport), id, block, with_everything(&rec)).await;
        assert_eq!(transport.live_channels().len(), 3);
        assert_eq!(transport.open_clients(), 1);

        sub.unsubscribe().await.unwrap();
        assert!(transport.live_channels().is_empty());
        assert_eq!(transport.open_clients(), 0);
        assert_eq!(transport.closed_clients(), 1);
    }
}

#[tokio::test]
async fn channels_are_recoverable_and_named_from_cursor() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 42, with_everything(&rec)).await;

    assert_eq!(
        transport.subscribe_log(),
        vec!["query:sub:control", "query:sub:42", "query:sub:mempool"]
    );
    for name in transport.subscribe_log() {
        assert!(transport.channel_options(&name).unwrap().recoverable);
    }
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn initial_connection_is_reported() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 1, status_only(&rec)).await;

    eventually("connected status", || {
        rec.lock().unwrap().statuses.iter().any(|s| s.code() == Some(StatusCode::Connected))
    })
    .await;
    let codes: Vec<_> = rec.lock().unwrap().statuses.iter().map(|s| s.code()).collect();
    assert_eq!(codes, vec![Some(StatusCode::Connecting), Some(StatusCode::Connected)]);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn dropping_handle_closes_session() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 1, with_transactions(&rec)).await;
    drop(sub);

    eventually("channels released", || transport.live_channels().is_empty()).await;
    eventually("client closed", || transport.closed_clients() == 1).await;
}

// ─── Capability gating ───────────────────────────────────────────────────────

#[tokio::test]
async fn status_only_handler_subscribes_control_only() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 9, status_only(&rec)).await;
    assert_eq!(transport.live_channels(), vec!["query:sub:control"]);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn mempool_only_handler_skips_main_channel() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let m = rec.clone();
    let handler = status_only(&rec).on_mempool(move |tx| m.lock().unwrap().mempool.push(tx.id.clone()));
    let sub = subscribe(&client(&transport), "sub", 9, handler).await;

    assert_eq!(
        sorted(transport.live_channels()),
        vec!["query:sub:control", "query:sub:mempool"]
    );
    sub.unsubscribe().await.unwrap();
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn per_channel_publications_reach_matching_callbacks() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 10, with_everything(&rec)).await;

    assert_eq!(transport.publish("query:sub:10", transaction("t1")), 1);
    assert_eq!(transport.publish("query:sub:mempool", transaction("m1")), 1);
    eventually("both deliveries", || {
        let r = rec.lock().unwrap();
        r.transactions.len() == 1 && r.mempool.len() == 1
    })
    .await;

    let r = rec.lock().unwrap();
    assert_eq!(r.transactions, vec!["t1"]);
    assert_eq!(r.mempool, vec!["m1"]);
    assert!(r.errors.is_empty());
    drop(r);
    assert_eq!(sub.metrics().transactions, 1);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_yields_one_error_and_session_continues() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 10, with_transactions(&rec)).await;

    transport.publish("query:sub:10", vec![0x0a, 0xff, 0x01]);
    eventually("decode error", || rec.lock().unwrap().errors.len() == 1).await;
    assert!(rec.lock().unwrap().transactions.is_empty());

    transport.publish("query:sub:10", transaction("t2"));
    eventually("next transaction", || rec.lock().unwrap().transactions.len() == 1).await;
    assert_eq!(rec.lock().unwrap().errors.len(), 1);
    assert_eq!(sub.metrics().decode_errors, 1);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn connection_level_control_publication_is_status() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 10, with_everything(&rec)).await;

    // Transaction-shaped JSON on a control channel is still a status.
    assert!(transport.server_publish("query:sub:control", br#"{"id":"t1","blockHeight":5}"#.to_vec()));
    assert!(transport.server_publish("query:sub:control", b"not json".to_vec()));
    eventually("error for malformed JSON", || rec.lock().unwrap().errors.len() == 1).await;

    let r = rec.lock().unwrap();
    assert!(r.statuses.iter().any(|s| s.status_code == 0));
    assert!(r.transactions.is_empty());
    assert!(r.mempool.is_empty());
    drop(r);
    assert_eq!(sub.last_block(), 10);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn server_channel_events_and_errors_are_statuses() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "sub", 1, status_only(&rec)).await;

    transport.emit(ClientEvent::Join {
        channel: "query:sub:control".into(),
    });
    transport.emit(ClientEvent::Error {
        message: "ping timeout".into(),
    });
    eventually("error status", || {
        rec.lock().unwrap().statuses.iter().any(|s| s.code() == Some(StatusCode::Error))
    })
    .await;

    let r = rec.lock().unwrap();
    assert!(r.statuses.iter().any(|s| s.message == "Joined query:sub:control"));
    assert!(r.statuses.iter().any(|s| s.message == "ping timeout"));
    drop(r);
    // A transport error is not a reconnect.
    assert_eq!(transport.clients_built(), 1);
    assert_eq!(transport.subscribe_log().len(), 1);
    sub.unsubscribe().await.unwrap();
}

// ─── Reconnect ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reconnect_resumes_from_confirmed_block() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "s", 100, with_transactions(&rec)).await;

    for block in [150, 120] {
        assert_eq!(transport.publish("query:s:control", confirmation(block)), 1);
    }
    eventually("cursor advanced", || sub.last_block() == 150).await;
    assert_eq!(sub.last_block(), 150);

    assert!(transport.drop_connection("eof"));
    eventually("resubscribed", || transport.subscribe_log().len() == 4).await;

    assert_eq!(
        transport.subscribe_log(),
        vec!["query:s:control", "query:s:100", "query:s:control", "query:s:150"]
    );
    assert_eq!(transport.unsubscribe_log(), vec!["query:s:control", "query:s:100"]);
    assert_eq!(
        sorted(transport.live_channels()),
        vec!["query:s:150", "query:s:control"]
    );
    assert_eq!(transport.clients_built(), 2);
    assert_eq!(transport.closed_clients(), 1);
    assert_eq!(transport.open_clients(), 1);

    // The stale main channel is gone.
    assert_eq!(transport.publish("query:s:100", transaction("stale")), 0);

    let r = rec.lock().unwrap();
    let reconnecting: Vec<_> = r.statuses.iter().filter(|s| s.status == "reconnecting").collect();
    assert_eq!(reconnecting.len(), 1);
    assert_eq!(reconnecting[0].block, Some(150));
    assert_eq!(reconnecting[0].message, "Reconnecting to server at block 150");
    assert!(r.statuses.iter().any(|s| s.code() == Some(StatusCode::Disconnected)));
    drop(r);

    eventually("reconnect recorded", || sub.metrics().reconnects == 1).await;
    sub.unsubscribe().await.unwrap();
    assert!(transport.live_channels().is_empty());
    assert_eq!(transport.open_clients(), 0);
}

#[tokio::test]
async fn confirmation_published_just_before_reconnect_is_honoured() {
    for round in 0..40 {
        let transport = MemoryTransport::new();
        let rec = Shared::default();
        let sub = subscribe(&client(&transport), "s", 100, with_transactions(&rec)).await;
        eventually("connected status", || {
            rec.lock().unwrap().statuses.iter().any(|s| s.code() == Some(StatusCode::Connected))
        })
        .await;

        assert_eq!(transport.publish("query:s:control", confirmation(150)), 1);
        assert!(transport.drop_connection("eof"));
        eventually("resubscribed", || transport.subscribe_log().len() == 4).await;

        assert_eq!(
            transport.subscribe_log().last().map(String::as_str),
            Some("query:s:150"),
            "round {round}"
        );
        assert_eq!(sub.last_block(), 150);
        sub.unsubscribe().await.unwrap();
    }
}

#[tokio::test]
async fn teardown_error_during_reconnect_is_reported_and_rebuild_completes() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "s", 5, with_transactions(&rec)).await;

    transport.fail_unsubscribe("query:s:control");
    assert!(transport.drop_connection("eof"));
    eventually("rebuilt", || sub.metrics().reconnects == 1).await;

    let errors = rec.lock().unwrap().errors.clone();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].starts_with("teardown before reconnect failed"), "{}", errors[0]);
    assert!(errors[0].contains("query:s:control"));

    // The failing channel did not stop the rest of the teardown.
    assert_eq!(transport.unsubscribe_log(), vec!["query:s:5"]);
    assert_eq!(transport.closed_clients(), 1);
    assert_eq!(sorted(transport.live_channels()), vec!["query:s:5", "query:s:control"]);

    transport.clear_failures();
    sub.unsubscribe().await.unwrap();
    assert!(transport.live_channels().is_empty());
}

#[tokio::test]
async fn disconnect_alone_does_not_rebuild() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "s", 1, status_only(&rec)).await;

    transport.emit(ClientEvent::Disconnected { reason: "eof".into() });
    eventually("disconnected status", || {
        rec.lock().unwrap().statuses.iter().any(|s| s.code() == Some(StatusCode::Disconnected))
    })
    .await;
    assert_eq!(transport.clients_built(), 1);
    assert!(transport.unsubscribe_log().is_empty());
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn failed_rebuilds_are_retried_then_abandoned() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(
        &client_with(
            &transport,
            ReconnectConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                multiplier: 2.0,
            },
        ),
        "s",
        7,
        with_transactions(&rec),
    )
    .await;

    transport.fail_next_connects(100);
    assert!(transport.drop_connection("reset"));
    eventually("session closed", || sub.is_closed()).await;

    let r = rec.lock().unwrap();
    assert_eq!(r.errors.len(), 3, "{:?}", r.errors);
    assert!(r.errors[2].contains("attempt 3"));
    let last = r.statuses.last().unwrap();
    assert_eq!(last.code(), Some(StatusCode::Error));
    assert_eq!(last.message, "Reconnect abandoned after 3 attempts");
    drop(r);

    assert!(transport.live_channels().is_empty());
    assert_eq!(transport.open_clients(), 0);
    assert_eq!(sub.metrics().reconnect_failures, 3);
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn rebuild_recovers_after_transient_failure() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(&client(&transport), "s", 5, with_transactions(&rec)).await;

    transport.fail_next_connects(1);
    transport.drop_connection("reset");
    eventually("rebuilt", || sub.metrics().reconnects == 1).await;

    assert_eq!(rec.lock().unwrap().errors.len(), 1);
    assert_eq!(sorted(transport.live_channels()), vec!["query:s:5", "query:s:control"]);
    assert!(!sub.is_closed());
    sub.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn unsubscribe_interrupts_backoff() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    let sub = subscribe(
        &client_with(
            &transport,
            ReconnectConfig {
                max_attempts: 5,
                initial_backoff_ms: 60_000,
                max_backoff_ms: 60_000,
                multiplier: 1.0,
            },
        ),
        "s",
        7,
        status_only(&rec),
    )
    .await;

    transport.fail_next_connects(100);
    transport.drop_connection("reset");
    eventually("first failed attempt", || rec.lock().unwrap().errors.len() == 1).await;

    tokio::time::timeout(Duration::from_secs(1), sub.unsubscribe())
        .await
        .expect("unsubscribe waited for backoff")
        .unwrap();
    assert!(transport.live_channels().is_empty());
    assert_eq!(transport.open_clients(), 0);
}

// ─── Setup failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_failure_leaves_nothing_open() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    transport.fail_next_connects(1);

    let err = client(&transport).subscribe("s", 1, with_everything(&rec)).await.unwrap_err();
    assert!(matches!(err, SubscribeError::Connect(_)), "{err}");
    assert!(transport.live_channels().is_empty());
    assert_eq!(transport.open_clients(), 0);
    assert_eq!(transport.closed_clients(), 1);
}

#[tokio::test]
async fn channel_subscribe_failure_rolls_back() {
    let transport = MemoryTransport::new();
    let rec = Shared::default();
    transport.fail_subscribe("query:s:3");

    let err = client(&transport).subscribe("s", 3, with_everything(&rec)).await.unwrap_err();
    match err {
        SubscribeError::Subscribe { channel, .. } => assert_eq!(channel, "query:s:3"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.unsubscribe_log(), vec!["query:s:control"]);
    assert!(transport.live_channels().is_empty());
    assert_eq!(transport.open_clients(), 0);
}
