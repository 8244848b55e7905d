//! Peer directory API endpoints.
//!
//! The directory only grows while the server runs. Clients poll
//! `GET /api/peers` with the last revision they saw to wait for changes.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pilink_core::{PeerIdentity, PilinkError};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::ApiResult;
use crate::api::session::{report, ActionResponse};
use crate::state::SharedState;

/// Upper bound for `wait_secs`.
pub const MAX_WAIT_SECS: u64 = 30;

/// Creates the peers router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_peers))
        .route("/select", post(select_peer))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A discovered peer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "index": 0,
    "address": "B8:27:EB:12:34:56",
    "name": "raspberrypi",
    "display_name": "raspberrypi",
    "first_seen_utc": "2025-01-15T03:30:00Z"
}))]
pub struct PeerEntry {
    /// Position in the directory, used for selection.
    #[schema(example = 0)]
    pub index: usize,

    /// Bluetooth address.
    #[schema(example = "B8:27:EB:12:34:56")]
    pub address: String,

    /// Advertised name, if any.
    #[schema(example = "raspberrypi")]
    pub name: Option<String>,

    /// Name to show: the advertised name or the address.
    #[schema(example = "raspberrypi")]
    pub display_name: String,

    /// When the peer was first discovered.
    #[schema(value_type = String, example = "2025-01-15T03:30:00Z")]
    pub first_seen_utc: DateTime<Utc>,
}

impl PeerEntry {
    fn new(index: usize, peer: &PeerIdentity) -> Self {
        Self {
            index,
            address: peer.address.to_string(),
            name: peer.name.clone(),
            display_name: peer.display_name().to_string(),
            first_seen_utc: peer.first_seen_utc,
        }
    }
}

/// Directory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeersResponse {
    /// Directory revision this snapshot reflects.
    #[schema(example = 4)]
    pub revision: u64,

    /// Peers in discovery order.
    pub peers: Vec<PeerEntry>,

    /// Currently selected index, if any.
    #[schema(example = 0)]
    pub selected: Option<usize>,
}

/// Query parameters for the peer list.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PeersQuery {
    /// Last revision the client has seen. When the directory is still at
    /// this revision, the request waits for a change.
    #[param(example = 3)]
    pub since: Option<u64>,

    /// How long to wait for a change, capped at 30 seconds. Defaults to 0.
    #[param(example = 10)]
    pub wait_secs: Option<u64>,
}

/// Request body for selecting a peer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "index": 0 }))]
pub struct SelectPeerRequest {
    /// Directory index of the peer.
    #[schema(example = 0, minimum = 0)]
    pub index: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List discovered peers.
#[utoipa::path(
    get,
    path = "/api/peers",
    tag = "peers",
    operation_id = "listPeers",
    summary = "List discovered peers",
    description = "Returns every peer discovered so far in discovery order. \
        Pass `since` with the last seen revision and `wait_secs` to wait for \
        the next change instead of polling.",
    params(PeersQuery),
    responses(
        (status = 200, description = "Directory snapshot", body = PeersResponse)
    )
)]
pub async fn list_peers(
    State(state): State<SharedState>,
    Query(query): Query<PeersQuery>,
) -> Json<PeersResponse> {
    if let Some(since) = query.since {
        let wait = Duration::from_secs(query.wait_secs.unwrap_or(0).min(MAX_WAIT_SECS));
        let mut changes = {
            let directory = state.directory.read().await;
            (directory.revision() <= since).then(|| directory.subscribe())
        };
        if let Some(changes) = changes.as_mut() {
            // Timeout and a closed channel both mean: answer with what we have.
            let _ = tokio::time::timeout(wait, changes.changed()).await;
        }
    }

    let selected = *state.selection.lock().await;
    let directory = state.directory.read().await;
    Json(PeersResponse {
        revision: directory.revision(),
        peers: directory
            .peers()
            .iter()
            .enumerate()
            .map(|(index, peer)| PeerEntry::new(index, peer))
            .collect(),
        selected,
    })
}

/// Select the peer to connect to.
#[utoipa::path(
    post,
    path = "/api/peers/select",
    tag = "peers",
    operation_id = "selectPeer",
    summary = "Select a peer by index",
    description = "Marks the peer at `index` as the target of the next connect.",
    request_body = SelectPeerRequest,
    responses(
        (status = 200, description = "Peer selected", body = ActionResponse),
        (status = 400, description = "Index out of range", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn select_peer(
    State(state): State<SharedState>,
    Json(request): Json<SelectPeerRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = select(&state, request.index).await;
    report(&state, outcome)
}

async fn select(state: &SharedState, index: usize) -> Result<ActionResponse, PilinkError> {
    let name = state
        .directory
        .read()
        .await
        .get(index)?
        .display_name()
        .to_string();
    *state.selection.lock().await = Some(index);
    info!(index, %name, "Peer selected");
    Ok(ActionResponse::ok(format!("Selected {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_entry_uses_display_name() {
        let peer = PeerIdentity::new("B8:27:EB:00:00:01", None);
        let entry = PeerEntry::new(2, &peer);

        assert_eq!(entry.index, 2);
        assert_eq!(entry.display_name, "B8:27:EB:00:00:01");
        assert!(entry.name.is_none());
    }

    #[test]
    fn test_select_request_deserialization() {
        let request: SelectPeerRequest = serde_json::from_str(r#"{"index": 3}"#).unwrap();
        assert_eq!(request.index, 3);
    }
}
