//! Command API endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use pilink_core::Command;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::{report, ActionResponse};
use crate::state::SharedState;

/// Creates the commands router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/{command}", post(send_command))
}

/// Send a command to the connected peer.
#[utoipa::path(
    post,
    path = "/api/commands/{command}",
    tag = "commands",
    operation_id = "sendCommand",
    summary = "Send emit or wifi to the connected Pi",
    description = "Writes the command name to the Pi's command characteristic. \
        `emit` makes the Pi broadcast its own network, `wifi` makes it rejoin \
        its Wi-Fi. Returns once the write was submitted; the Pi's \
        acknowledgement is not awaited.",
    params(
        ("command" = Command, Path, description = "Command to send")
    ),
    responses(
        (status = 200, description = "Write submitted", body = ActionResponse),
        (status = 400, description = "Unknown command", body = crate::api::error::ErrorResponse),
        (status = 409, description = "No peer connected", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Peer lacks the command service or rejected the write", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn send_command(
    State(state): State<SharedState>,
    Path(command): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = match command.parse::<Command>() {
        Ok(command) => send(&state, command).await,
        Err(err) => Err(ApiError::from(err)),
    };
    report(&state, outcome)
}

async fn send(state: &SharedState, command: Command) -> Result<ActionResponse, ApiError> {
    let result = state.controller.lock().await.send_command(command).await;
    match result {
        Ok(()) => Ok(ActionResponse::ok(format!("Sent {command} signal"))),
        Err(err) if err.is_gatt_error() => {
            Err(ApiError::from(err).with_message(format!("Unable to send {command} signal")))
        }
        Err(err) => Err(err.into()),
    }
}
