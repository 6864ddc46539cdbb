//! End-to-end realtime tests: a real server on an ephemeral port and a
//! tungstenite client joining a user room.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ideahub::models::metadata::EventMetadata;
use ideahub::models::notification::NewNotification;
use ideahub::{api, config, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let cfg = config::from_lookup(|k: &str| match k {
        "IDEAHUB_STORE" => Some("memory".to_string()),
        _ => None,
    })
    .unwrap();
    let state = Arc::new(AppState::in_memory(cfg));
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    client
}

/// Next text frame as JSON, failing the test after one second.
async fn next_frame(client: &mut Client) -> Value {
    let fut = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(1), fut)
        .await
        .expect("timed out waiting for frame")
}

async fn join(client: &mut Client, user_id: &str) {
    client
        .send(Message::Text(json!({ "event": "join", "userId": user_id }).to_string()))
        .await
        .unwrap();
    let ack = next_frame(client).await;
    assert_eq!(ack["event"], "joined");
    assert_eq!(ack["data"]["userId"], user_id);
}

fn comment_for(user_id: &str) -> NewNotification {
    NewNotification::new(
        "New Comment on your Idea",
        "comment",
        "Ada Just Commented on Your Idea Solar Kiosks",
        EventMetadata::builder(user_id, "idea-1").build().unwrap(),
    )
}

#[tokio::test]
async fn test_joined_client_receives_new_notification() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr).await;
    join(&mut client, "bob").await;

    let record = state.pipeline.create_event(comment_for("bob")).await.unwrap();

    let frame = next_frame(&mut client).await;
    assert_eq!(frame["event"], "newNotification");
    assert_eq!(frame["data"]["message"], "New Notification");
    assert_eq!(frame["data"]["notificationId"], record.id.to_string());
    assert_eq!(frame["data"]["category"], "comment");
}

#[tokio::test]
async fn test_every_connection_of_a_user_is_signalled() {
    let (addr, state) = spawn_server().await;
    let mut phone = connect(addr).await;
    let mut laptop = connect(addr).await;
    join(&mut phone, "bob").await;
    join(&mut laptop, "bob").await;
    assert_eq!(state.pipeline.realtime().registry().connection_count("bob"), 2);

    state.pipeline.create_event(comment_for("bob")).await.unwrap();

    assert_eq!(next_frame(&mut phone).await["event"], "newNotification");
    assert_eq!(next_frame(&mut laptop).await["event"], "newNotification");
}

#[tokio::test]
async fn test_other_users_are_not_signalled() {
    let (addr, state) = spawn_server().await;
    let mut carol = connect(addr).await;
    join(&mut carol, "carol").await;

    state.pipeline.create_event(comment_for("bob")).await.unwrap();

    // A ping round-trip proves nothing else was queued before it
    carol
        .send(Message::Text(json!({ "event": "ping" }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut carol).await["event"], "pong");
}

#[tokio::test]
async fn test_disconnect_unregisters() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr).await;
    join(&mut client, "bob").await;
    let registry = state.pipeline.realtime().registry().clone();
    assert_eq!(registry.connection_count("bob"), 1);

    client.close(None).await.unwrap();

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = registry.connection_count("bob");
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(remaining, 0);

    // Offline user: the record is still created
    let record = state.pipeline.create_event(comment_for("bob")).await.unwrap();
    assert!(record.is_unread());
}
