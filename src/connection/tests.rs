use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{message::MessageType, test_support::FakeTransport};

const URL: &str = "tcp://127.0.0.1:7001";

#[fixture]
fn transport() -> FakeTransport { FakeTransport::new() }

fn connection(transport: &FakeTransport) -> Connection {
    Connection::with_transport(ConnectionConfig::new(URL), transport.shared()).expect("valid config")
}

fn event() -> Message { Message::event("mac:112233445566", "event:device-status/online", b"up".to_vec()) }

/// Records the reason of every close notification.
fn record_closes(conn: &Connection) -> Arc<Mutex<Vec<Option<String>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = conn.on_close(move |reason| sink.lock().push(reason.map(ToString::to_string)));
    seen
}

#[test]
fn malformed_url_is_rejected() {
    let err = Connection::with_transport(ConnectionConfig::new("nope"), FakeTransport::new().shared())
        .expect_err("bad url");
    assert!(matches!(err, ConfigError::InvalidUrl { .. }));
}

#[test]
fn ids_are_unique() {
    let transport = FakeTransport::new();
    assert_ne!(connection(&transport).id(), connection(&transport).id());
}

#[rstest]
#[tokio::test]
async fn dial_is_idempotent(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("first dial");
    conn.dial().await.expect("second dial");
    assert_eq!(transport.peer(URL).dials(), 1);
    assert!(conn.is_open().await);
}

#[rstest]
#[tokio::test]
async fn failed_dial_leaves_connection_idle(transport: FakeTransport) {
    transport.refuse(URL);
    let conn = connection(&transport);
    let closes = record_closes(&conn);

    let err = conn.dial().await.expect_err("refused");
    assert!(matches!(err, ProcessError::Transport(TransportError::Io(_))));
    assert!(!conn.is_open().await);
    conn.close().await.expect("close idle");
    assert!(closes.lock().is_empty());
}

#[rstest]
#[tokio::test]
async fn send_before_dial_is_closed(transport: FakeTransport) {
    let conn = connection(&transport);
    let err = conn
        .send(&CancellationToken::new(), &event())
        .await
        .expect_err("not open");
    assert!(matches!(err, ProcessError::ConnectionClosed));
}

#[rstest]
#[tokio::test]
async fn send_delivers_encoded_message(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("dial");
    conn.send(&CancellationToken::new(), &event())
        .await
        .expect("send");
    assert_eq!(transport.peer(URL).messages(), vec![event()]);
}

#[rstest]
#[tokio::test]
async fn concurrent_sends_each_deliver_a_whole_frame(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("dial");
    let sends = (0..8).map(|i| {
        let conn = conn.clone();
        async move {
            let mut msg = event();
            msg.transaction_uuid = format!("tx-{i}");
            conn.send(&CancellationToken::new(), &msg).await
        }
    });
    for outcome in futures::future::join_all(sends).await {
        outcome.expect("send");
    }
    let mut ids: Vec<_> = transport
        .peer(URL)
        .messages()
        .into_iter()
        .map(|m| m.transaction_uuid)
        .collect();
    ids.sort();
    assert_eq!(ids, (0..8).map(|i| format!("tx-{i}")).collect::<Vec<_>>());
}

#[rstest]
#[tokio::test]
async fn send_failure_closes_and_notifies_once(transport: FakeTransport) {
    let conn = connection(&transport);
    let closes = record_closes(&conn);
    conn.dial().await.expect("dial");
    transport.peer(URL).fail_sends();

    let err = conn
        .send(&CancellationToken::new(), &event())
        .await
        .expect_err("broken pipe");
    assert!(matches!(err, ProcessError::SendFailed(_)));
    assert!(!conn.is_open().await);

    let again = conn
        .send(&CancellationToken::new(), &event())
        .await
        .expect_err("closed");
    assert!(matches!(again, ProcessError::ConnectionClosed));
    conn.close().await.expect("close after failure");

    let closes = closes.lock();
    assert_eq!(closes.len(), 1);
    assert!(closes[0].as_deref().is_some_and(|r| r.starts_with("failed to send message")));
    assert_eq!(transport.peer(URL).closes(), 1);
}

#[rstest]
#[tokio::test]
async fn send_timeout_keeps_connection_open(transport: FakeTransport) {
    let conn = connection(&transport);
    let closes = record_closes(&conn);
    conn.dial().await.expect("dial");
    transport.peer(URL).time_out_sends();

    let err = conn
        .send(&CancellationToken::new(), &event())
        .await
        .expect_err("timed out");
    assert!(matches!(err, ProcessError::Transport(TransportError::Timeout)));
    assert!(conn.is_open().await);
    assert!(closes.lock().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancelled_caller_does_not_abort_the_write(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("dial");
    let peer = transport.peer(URL);
    peer.delay_sends(Duration::from_millis(50));

    let ctx = CancellationToken::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });
    let err = conn.send(&ctx, &event()).await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(peer.messages().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(peer.messages(), vec![event()]);
    assert!(conn.is_open().await);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancelled_caller_still_tears_down_on_failure(transport: FakeTransport) {
    let conn = connection(&transport);
    let closes = record_closes(&conn);
    conn.dial().await.expect("dial");
    let peer = transport.peer(URL);
    peer.delay_sends(Duration::from_millis(50));
    peer.fail_sends();

    let ctx = CancellationToken::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });
    let err = conn.send(&ctx, &event()).await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(closes.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!conn.is_open().await);
    let closes = closes.lock();
    assert_eq!(closes.len(), 1);
    assert!(closes[0].as_deref().is_some_and(|r| r.starts_with("failed to send message")));
    assert_eq!(peer.closes(), 1);
}

#[rstest]
#[tokio::test]
async fn already_cancelled_context_sends_nothing(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("dial");
    let ctx = CancellationToken::new();
    ctx.cancel();
    let err = conn.send(&ctx, &event()).await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(transport.peer(URL).messages().is_empty());
}

#[rstest]
#[tokio::test]
async fn close_notifies_once_and_is_terminal(transport: FakeTransport) {
    let conn = connection(&transport);
    let closes = record_closes(&conn);
    conn.dial().await.expect("dial");

    conn.close().await.expect("close");
    conn.close().await.expect("second close");
    assert_eq!(*closes.lock(), vec![None]);

    let err = conn.dial().await.expect_err("no redial");
    assert!(matches!(err, ProcessError::ConnectionClosed));
    assert_eq!(transport.peer(URL).dials(), 1);
}

#[rstest]
#[tokio::test]
async fn cancelled_subscription_is_not_notified(transport: FakeTransport) {
    let conn = connection(&transport);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let sub = conn.on_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    sub.cancel();
    conn.dial().await.expect("dial");
    conn.close().await.expect("close");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn unknown_type_is_still_encoded(transport: FakeTransport) {
    let conn = connection(&transport);
    conn.dial().await.expect("dial");
    let msg = Message::new(MessageType::new(77));
    conn.send(&CancellationToken::new(), &msg).await.expect("send");
    assert_eq!(transport.peer(URL).messages(), vec![msg]);
}

#[tokio::test]
async fn dial_hands_configured_options_to_transport() {
    let mut transport = crate::transport::MockTransport::new();
    transport
        .expect_dial()
        .withf(|url, options| {
            url.to_string() == URL
                && options.send_timeout == Some(Duration::from_millis(250))
                && options.max_frame_length == 4096
        })
        .times(1)
        .returning(|_, _| Err(TransportError::Closed));
    let conn = Connection::with_transport(
        ConnectionConfig::new(URL)
            .send_timeout(Duration::from_millis(250))
            .max_frame_length(4096),
        Arc::new(transport),
    )
    .expect("valid config");

    let err = conn.dial().await.expect_err("transport refuses");

    assert!(matches!(err, ProcessError::Transport(TransportError::Closed)));
    assert!(!conn.is_open().await);
}
