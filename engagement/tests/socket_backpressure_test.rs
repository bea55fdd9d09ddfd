//! `/ws/logs` under heavy fan-out, over a real TCP listener.
//!
//! Tests verify:
//! - A background publisher is still heard after the hub pushes far more
//!   than the socket buffers can hold
//! - A raw client that never reads its socket can still publish
//! - Publishers shut down cleanly once their sink is dropped

use std::sync::Arc;
use std::time::Duration;

use engagement::dispatch::DispatchSnapshot;
use engagement::gateway::{router, AppState};
use engagement::{BusClient, Event, EventHub, EventSink, Peer, RetryPolicy, SharedEventHub};
use futures_util::SinkExt;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const CHATTER_EVENTS: usize = 200;
const CHATTER_BYTES: usize = 100 * 1024;

async fn serve(hub: SharedEventHub) -> (String, JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_ledger_tx, ledger) = watch::channel(None);
    let (_dispatch_tx, dispatch) = watch::channel(DispatchSnapshot::default());
    let app = router(AppState {
        hub,
        ledger,
        dispatch,
    });
    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    (format!("ws://{addr}/ws/logs"), server)
}

/// Push ~20 MiB of events through every connected peer
fn flood(hub: &SharedEventHub) {
    let chatter = hub.connect("chatter");
    let filler = "x".repeat(CHATTER_BYTES);
    for i in 0..CHATTER_EVENTS {
        chatter
            .publish(Event::info("Chatter", format!("{i} {filler}")))
            .unwrap();
    }
}

async fn wait_for(observer: &mut Peer, message: &str) -> Arc<Event> {
    loop {
        let event = observer.recv().await.expect("hub closed");
        if event.message == message {
            return event;
        }
    }
}

// ── Background publisher ───────────────────────────────────────────

#[tokio::test]
async fn publisher_is_heard_after_heavy_fan_out() {
    let hub = EventHub::default().shared();
    let mut observer = hub.connect("observer");
    let (url, server) = serve(hub.clone()).await;

    let (sink, publisher) = BusClient::new(url, "Attack Agent")
        .with_retry(RetryPolicy::bounded(5, Duration::from_millis(50)))
        .spawn_publisher();
    timeout(Duration::from_secs(5), wait_for(&mut observer, "Attack Agent ready"))
        .await
        .expect("publisher never completed its handshake");

    flood(&hub);
    tokio::time::sleep(Duration::from_millis(200)).await;
    sink.emit(Event::warning("Attack Agent", "attacker scans firewall"));

    let marker = timeout(
        Duration::from_secs(10),
        wait_for(&mut observer, "attacker scans firewall"),
    )
    .await
    .expect("publisher went unheard after the flood");
    assert_eq!(marker.source, "Attack Agent");

    drop(sink);
    let finished = timeout(Duration::from_secs(5), publisher)
        .await
        .expect("publisher did not stop after its sink was dropped")
        .unwrap();
    assert!(finished.is_ok(), "{finished:?}");
    server.abort();
}

// ── Client that never reads ────────────────────────────────────────

#[tokio::test]
async fn silent_reader_can_still_publish() {
    let hub = EventHub::default().shared();
    let mut observer = hub.connect("observer");
    let (url, server) = serve(hub.clone()).await;

    let (mut stream, _) = connect_async(url.as_str()).await.unwrap();
    let frame = |message: &str| {
        Message::Text(json!({"level": "info", "source": "Silent Agent", "message": message}).to_string())
    };
    stream.send(frame("Silent Agent ready")).await.unwrap();
    timeout(Duration::from_secs(5), wait_for(&mut observer, "Silent Agent ready"))
        .await
        .expect("socket never registered");

    flood(&hub);
    tokio::time::sleep(Duration::from_millis(200)).await;
    stream.send(frame("still here")).await.unwrap();

    let marker = timeout(Duration::from_secs(10), wait_for(&mut observer, "still here"))
        .await
        .expect("inbound stalled behind unread fan-out");
    assert_eq!(marker.source, "Silent Agent");
    assert!(hub.peer_count() >= 2);
    server.abort();
}
