//! End-to-end tests of the HTTP surface against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use pilink_core::{
    Config, DeviceDirectory, MockCall, MockPeer, MockTransport, PeerAddress, PeerIdentity,
};
use pilink_server::api::create_router;
use pilink_server::state::{run_event_pump, AppState, SharedState};
use serde_json::{json, Value};

const PI: &str = "B8:27:EB:00:00:01";
const OTHER_PI: &str = "B8:27:EB:00:00:02";

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    server: TestServer,
    state: SharedState,
    transport: MockTransport,
}

fn harness(peers: Vec<MockPeer>) -> Harness {
    let transport = MockTransport::with_peers(peers.clone());
    let directory = DeviceDirectory::shared();
    let (state, events) = AppState::new(
        Config::default(),
        directory,
        Arc::new(transport.clone()),
        true,
    );
    tokio::spawn(run_event_pump(state.clone(), events));

    let server = TestServer::new(create_router(state.clone())).unwrap();
    Harness {
        server,
        state,
        transport,
    }
}

async fn discovered(harness: &Harness, peers: &[MockPeer]) {
    harness
        .state
        .directory
        .write()
        .await
        .add_discovered_batch(peers.iter().map(MockPeer::identity));
}

async fn wait_for_session_state(harness: &Harness, expected: &str) -> Value {
    for _ in 0..50 {
        let session: Value = harness.server.get("/api/session").await.json();
        if session["state"] == expected {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never reached {expected}");
}

async fn connect_to(harness: &Harness, index: usize) {
    harness
        .server
        .post("/api/peers/select")
        .json(&json!({ "index": index }))
        .await
        .assert_status_ok();
    harness
        .server
        .post("/api/session/connect")
        .await
        .assert_status_ok();
    wait_for_session_state(harness, "connected").await;
}

// ============================================================================
// Health & docs
// ============================================================================

#[tokio::test]
async fn test_health_reports_bluetooth() {
    let h = harness(vec![]);

    let response = h.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bluetooth_available"], true);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let h = harness(vec![]);

    let body: Value = h.server.get("/api/openapi.json").await.json();

    assert_eq!(body["info"]["title"], "pilink API");
    assert!(body["paths"]["/api/session/connect"].is_object());
}

// ============================================================================
// Peers
// ============================================================================

#[tokio::test]
async fn test_peers_are_listed_in_discovery_order() {
    let peers = vec![MockPeer::pi(PI), MockPeer::named(OTHER_PI, "garage")];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;

    let body: Value = h.server.get("/api/peers").await.json();

    assert_eq!(body["revision"], 1);
    assert_eq!(body["peers"][0]["address"], PI);
    assert_eq!(body["peers"][1]["display_name"], "garage");
    assert_eq!(body["peers"][1]["index"], 1);
    assert!(body["selected"].is_null());
}

#[tokio::test]
async fn test_long_poll_returns_after_change() {
    let h = harness(vec![]);
    let directory = h.state.directory.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        directory
            .write()
            .await
            .add_discovered(PeerIdentity::new(PI, None));
    });

    let body: Value = h
        .server
        .get("/api/peers")
        .add_query_param("since", 0)
        .add_query_param("wait_secs", 5)
        .await
        .json();

    assert_eq!(body["revision"], 1);
    assert_eq!(body["peers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_long_poll_answers_immediately_when_behind() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;

    let response = tokio::time::timeout(Duration::from_secs(1), async {
        h.server
            .get("/api/peers")
            .add_query_param("since", 0)
            .add_query_param("wait_secs", 30)
            .await
    })
    .await
    .unwrap();
    let body: Value = response.json();

    assert_eq!(body["revision"], 1);
}

#[tokio::test]
async fn test_select_out_of_range_is_rejected() {
    let h = harness(vec![]);

    let response = h
        .server
        .post("/api/peers/select")
        .json(&json!({ "index": 0 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "OUT_OF_RANGE");
}

#[tokio::test]
async fn test_select_marks_peer() {
    let peers = vec![MockPeer::pi(PI), MockPeer::pi(OTHER_PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;

    let response = h
        .server
        .post("/api/peers/select")
        .json(&json!({ "index": 1 }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);
    let session: Value = h.server.get("/api/session").await.json();
    assert_eq!(session["selected"], 1);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_connect_without_selection_is_rejected() {
    let h = harness(vec![MockPeer::pi(PI)]);

    let response = h.server.post("/api/session/connect").await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "NO_SELECTION");
    assert_eq!(body["message"], "Please select a device to connect first");
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_connect_without_selection_keeps_current_session() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;
    connect_to(&h, 0).await;

    let response = h.server.post("/api/session/connect").await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "NO_SELECTION");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let session: Value = h.server.get("/api/session").await.json();
    assert_eq!(session["state"], "connected");
    assert_eq!(session["peer"], PI);
    assert!(!h
        .transport
        .calls()
        .contains(&MockCall::Disconnect(PeerAddress::new(PI))));
}

#[tokio::test]
async fn test_connect_resets_selection_and_connects() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;

    h.server
        .post("/api/peers/select")
        .json(&json!({ "index": 0 }))
        .await
        .assert_status_ok();
    let response = h.server.post("/api/session/connect").await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "success": true, "message": "Connected" })
    );

    let session = wait_for_session_state(&h, "connected").await;
    assert_eq!(session["peer"], PI);
    assert!(session["selected"].is_null());

    let notifications: Value = h.server.get("/api/notifications").await.json();
    let messages: Vec<&str> = notifications["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["message"].as_str())
        .collect();
    assert!(messages.contains(&"Connected to device"));
}

#[tokio::test]
async fn test_failed_connect_still_resets_selection() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(vec![]);
    discovered(&h, &peers).await;

    h.server
        .post("/api/peers/select")
        .json(&json!({ "index": 0 }))
        .await
        .assert_status_ok();
    let response = h.server.post("/api/session/connect").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.json::<Value>()["message"],
        "Unable to connect to device selected"
    );
    let session: Value = h.server.get("/api/session").await.json();
    assert!(session["selected"].is_null());
    assert_eq!(session["state"], "disconnected");
}

#[tokio::test]
async fn test_reconnect_keeps_single_link() {
    let peers = vec![MockPeer::pi(PI), MockPeer::pi(OTHER_PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;

    connect_to(&h, 0).await;
    connect_to(&h, 1).await;

    let open = h.transport.open_links();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].as_str(), OTHER_PI);
}

#[tokio::test]
async fn test_disconnect() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;
    connect_to(&h, 0).await;

    let response = h.server.post("/api/session/disconnect").await;

    response.assert_status_ok();
    wait_for_session_state(&h, "disconnected").await;
    let again = h.server.post("/api/session/disconnect").await;
    assert_eq!(again.json::<Value>()["message"], "No device was connected");
}

#[tokio::test]
async fn test_unavailable_bluetooth_fails_connect() {
    let (state, _events) = AppState::unavailable(Config::default(), "no adapter");
    state
        .directory
        .write()
        .await
        .add_discovered(PeerIdentity::new(PI, None));
    let server = TestServer::new(create_router(state)).unwrap();

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["bluetooth_available"], false);

    server
        .post("/api/peers/select")
        .json(&json!({ "index": 0 }))
        .await
        .assert_status_ok();
    let response = server.post("/api/session/connect").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.json::<Value>()["message"],
        "Bluetooth LE is not available on this device at this moment."
    );
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_emit_without_session_reports_no_connection() {
    let h = harness(vec![MockPeer::pi(PI)]);

    let response = h.server.post("/api/commands/emit").await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>()["message"],
        "None of the devices is connected. Please pair the Pi with your device and try again"
    );
    assert!(h.transport.writes().is_empty());
}

#[tokio::test]
async fn test_wifi_writes_literal_payload() {
    let peers = vec![MockPeer::pi(PI)];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;
    connect_to(&h, 0).await;

    let response = h.server.post("/api/commands/wifi").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);
    assert_eq!(h.transport.writes(), vec![b"wifi".to_vec()]);
}

#[tokio::test]
async fn test_unknown_command_is_rejected() {
    let h = harness(vec![]);

    let response = h.server.post("/api/commands/reboot").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "UNKNOWN_COMMAND");
}

#[tokio::test]
async fn test_missing_service_reports_send_failure() {
    let peers = vec![MockPeer::pi(PI).without_service()];
    let h = harness(peers.clone());
    discovered(&h, &peers).await;
    connect_to(&h, 0).await;

    let response = h.server.post("/api/commands/emit").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "SERVICE_NOT_FOUND");
    assert_eq!(body["message"], "Unable to send emit signal");
    assert!(h.transport.writes().is_empty());
}
