// End-to-end tests for `Client` over the in-memory socket transport.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;

use depotsync_api::websocket::memory::{self, MemoryPeer, MemoryServer};
use depotsync_core::{
    Client, ClientConfig, CoreError, ImportStep, SessionMode, SocketHandle, WizardSignal,
};
use tokio_util::sync::CancellationToken;

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (Client, MemoryServer, MemoryPeer) {
    let (connector, server) = memory::pair();
    let config = ClientConfig::new(
        Url::parse("ws://depot.test/ws").unwrap(),
        Url::parse("http://depot.test/v1").unwrap(),
    );
    let socket = SocketHandle::new(connector, config.socket.clone());
    let client = Client::with_socket(config, socket).unwrap();
    client.connect().await.unwrap();
    let peer = server.accept().await.unwrap();
    (client, server, peer)
}

/// Answer the next `create_import_session` request with `session_id`.
async fn answer_create(peer: &mut MemoryPeer, session_id: &str) {
    let frame = peer.recv_json().await.unwrap();
    assert_eq!(frame["type"], "create_import_session");
    peer.send_json(&json!({
        "id": frame["id"],
        "type": "import_session_created",
        "session_id": session_id,
    }));
}

async fn next_event(peer: &mut MemoryPeer) -> Value {
    tokio::time::timeout(Duration::from_secs(1), peer.recv_json())
        .await
        .expect("event frame")
        .unwrap()
}

// ── Exchanges ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_request_error_response_maps_to_rejected() {
    let (client, _server, mut peer) = setup().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request(&json!({ "type": "delete_depot" })).await })
    };
    let frame = peer.recv_json().await.unwrap();
    peer.send_json(&json!({ "id": frame["id"], "type": "error", "reason": "locked" }));

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.rejection().unwrap()["reason"], "locked");
}

#[tokio::test(start_paused = true)]
async fn test_listen_receives_matching_pushes_until_dropped() {
    let (client, _server, peer) = setup().await;

    let mut sub = client.listen(Some("price_tick".into()));
    assert_eq!(client.socket().listeners().len(), 1);

    peer.send_json(&json!({ "type": "other" }));
    peer.send_json(&json!({ "type": "price_tick", "isin": "DE0001" }));

    let msg = sub.recv().await.unwrap();
    assert_eq!(msg.body()["isin"], "DE0001");

    drop(sub);
    assert!(client.socket().listeners().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ends_subscriptions() {
    let (client, _server, _peer) = setup().await;

    let mut sub = client.listen(None);
    client.disconnect().await;

    assert!(sub.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_job_kind() {
    let (client, _server, _peer) = setup().await;

    let err = client.run_job("teleportation", &json!({}), &[]).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownJobKind { ref name } if name == "teleportation"));
}

// ── Import sessions ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_import_session_over_socket() {
    let (client, _server, mut peer) = setup().await;
    let mut sync = client.import_session(SessionMode::Foreground);

    let ensure = tokio::spawn(async move {
        let id = sync.ensure_session().await.unwrap();
        (sync, id)
    });
    answer_create(&mut peer, "S1").await;
    let (mut sync, id) = ensure.await.unwrap();
    assert_eq!(id.as_deref(), Some("S1"));

    sync.observe_step(ImportStep::Bank);
    sync.observe_step(ImportStep::BankBranch);
    sync.observe_step(ImportStep::Bank);

    let types: Vec<Value> = [
        next_event(&mut peer).await,
        next_event(&mut peer).await,
        next_event(&mut peer).await,
    ]
    .into_iter()
    .map(|f| {
        assert_eq!(f["data"]["session_id"], "S1");
        f["type"].clone()
    })
    .collect();
    assert_eq!(types, vec![json!("SELECT_COUNTRY"), json!("SELECT_BANK"), json!("GO_BACK")]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_over_socket_uses_recovery_id() {
    let (client, _server, mut peer) = setup().await;
    let sync = client.import_session(SessionMode::Foreground);
    let handle = sync.spawn(CancellationToken::new());

    answer_create(&mut peer, "S1").await;

    handle.signal(WizardSignal::Restart).await.unwrap();
    let close = next_event(&mut peer).await;
    assert_eq!(close["type"], "CLOSE_IMPORT_MODAL");
    assert_eq!(close["data"]["session_id"], "S1");

    answer_create(&mut peer, "S2").await;

    handle.signal(WizardSignal::ManualImport(true)).await.unwrap();
    let manual = next_event(&mut peer).await;
    assert_eq!(manual["type"], "MANUAL_IMPORT");
    assert_eq!(manual["data"]["session_id"], "S2");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_background_session_sends_without_creating() {
    let (client, _server, mut peer) = setup().await;
    let mut sync = client.import_session(SessionMode::Background {
        session_id: "BG-7".into(),
    });

    assert_eq!(sync.ensure_session().await.unwrap().as_deref(), Some("BG-7"));
    sync.observe_import_success(true);

    let frame = next_event(&mut peer).await;
    assert_eq!(
        frame,
        json!({ "type": "SUCCESSFUL_IMPORT", "data": { "session_id": "BG-7" } })
    );
    assert!(peer.try_recv_text().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_create_reply_without_session_id_is_protocol_error() {
    let (client, _server, mut peer) = setup().await;
    let mut sync = client.import_session(SessionMode::Foreground);

    let ensure = tokio::spawn(async move { sync.ensure_session().await });
    let frame = peer.recv_json().await.unwrap();
    peer.send_json(&json!({ "id": frame["id"], "type": "import_session_created" }));

    let err = ensure.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Protocol { .. }), "got {err:?}");
}
