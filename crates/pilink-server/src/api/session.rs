//! Session API endpoints: connect to the selected peer and disconnect.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use pilink_core::{ConnectionState, PilinkError};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the session router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Answer to every mutating call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "message": "Connected"
}))]
pub struct ActionResponse {
    /// Whether the action was carried out.
    #[schema(example = true)]
    pub success: bool,

    /// Notification text to show the user.
    #[schema(example = "Connected")]
    pub message: String,
}

impl ActionResponse {
    /// Successful outcome with `message`.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Current session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "connected",
    "peer": "B8:27:EB:12:34:56",
    "selected": null,
    "bluetooth_available": true
}))]
pub struct SessionResponse {
    /// Connection state.
    pub state: ConnectionState,

    /// Address of the connecting or connected peer.
    #[schema(example = "B8:27:EB:12:34:56")]
    pub peer: Option<String>,

    /// Selected directory index waiting for a connect.
    pub selected: Option<usize>,

    /// Whether Bluetooth LE is available.
    #[schema(example = true)]
    pub bluetooth_available: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the session state.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get session state",
    responses(
        (status = 200, description = "Session state", body = SessionResponse)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    let selected = *state.selection.lock().await;
    let controller = state.controller.lock().await;
    Json(SessionResponse {
        state: controller.state(),
        peer: controller.connected_peer().map(ToString::to_string),
        selected,
        bluetooth_available: state.bluetooth_available(),
    })
}

/// Connect to the selected peer.
///
/// The selection is cleared whatever the outcome.
#[utoipa::path(
    post,
    path = "/api/session/connect",
    tag = "session",
    operation_id = "connect",
    summary = "Connect to the selected peer",
    description = "Starts connecting to the selected peer, replacing any \
        current session. Returns once the attempt is under way; watch \
        `/api/session` or `/api/notifications` for the outcome. The \
        selection is cleared after every attempt.",
    responses(
        (status = 200, description = "Connection started", body = ActionResponse),
        (status = 409, description = "No peer selected", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Connection could not be started", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Bluetooth LE unavailable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn connect(State(state): State<SharedState>) -> ApiResult<Json<ActionResponse>> {
    let outcome = connect_selected(&state).await;
    report(&state, outcome)
}

async fn connect_selected(state: &SharedState) -> Result<ActionResponse, PilinkError> {
    let index = state
        .selection
        .lock()
        .await
        .take()
        .ok_or(PilinkError::NoSelection)?;
    let address = state.directory.read().await.get(index)?.address.clone();

    info!(index, %address, "Connecting to selected peer");
    state.controller.lock().await.connect(address).await?;
    Ok(ActionResponse::ok("Connected"))
}

/// Disconnect the current session.
#[utoipa::path(
    post,
    path = "/api/session/disconnect",
    tag = "session",
    operation_id = "disconnect",
    summary = "Disconnect from the peer",
    description = "Drops the current session. Succeeds when nothing is connected.",
    responses(
        (status = 200, description = "Session closed", body = ActionResponse)
    )
)]
pub async fn disconnect(State(state): State<SharedState>) -> ApiResult<Json<ActionResponse>> {
    let released = state.controller.lock().await.disconnect();
    let message = if released {
        "Disconnected from device"
    } else {
        "No device was connected"
    };
    report(&state, Ok::<_, ApiError>(ActionResponse::ok(message)))
}

/// Record the outcome of a mutating call as a notification and turn it into
/// a response.
pub(crate) fn report(
    state: &SharedState,
    outcome: Result<ActionResponse, impl Into<ApiError>>,
) -> ApiResult<Json<ActionResponse>> {
    match outcome {
        Ok(response) => {
            state.notify(true, response.message.clone());
            Ok(Json(response))
        }
        Err(err) => {
            let err = err.into();
            state.notify(false, err.message());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_response_serialization() {
        let json = serde_json::to_string(&ActionResponse::ok("Connected")).unwrap();
        assert_eq!(json, r#"{"success":true,"message":"Connected"}"#);
    }

    #[test]
    fn test_session_response_serialization() {
        let response = SessionResponse {
            state: ConnectionState::Connecting,
            peer: Some("B8:27:EB:00:00:01".to_string()),
            selected: None,
            bluetooth_available: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"state\":\"connecting\""));
        assert!(json.contains("\"selected\":null"));
    }
}
