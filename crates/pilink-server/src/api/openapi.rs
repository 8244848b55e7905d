//! OpenAPI specification for the pilink API.
//!
//! Served at `/api/openapi.json` and rendered by Swagger UI at `/swagger-ui`.

use axum::Json;
use utoipa::OpenApi;
use utoipa_swagger_ui::{Config, SwaggerUi};

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::notifications::NotificationsResponse;
use super::peers::{PeerEntry, PeersResponse, SelectPeerRequest};
use super::session::{ActionResponse, SessionResponse};
use crate::state::Notification;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Swagger UI pointing at the served specification.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").config(Config::from("/api/openapi.json"))
}

/// Main OpenAPI document structure for pilink.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "pilink API",
        version = "0.1.0",
        description = r#"
# pilink API

pilink finds a Raspberry Pi over Bluetooth Low Energy, connects to it, and
tells it to switch networks.

## Flow

1. **listPeers**: wait for the Pi to show up in the directory.
2. **selectPeer**: pick it by index.
3. **connect**: start connecting. The outcome arrives later; watch
   **getSession** or **listNotifications**.
4. **sendCommand**: `emit` makes the Pi broadcast its own network, `wifi`
   makes it rejoin its Wi-Fi.

Every mutating call answers `{ "success": bool, "message": str }` where
`message` is meant to be shown to the user as is.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local pilink server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "peers", description = "Discovered peers and selection"),
        (name = "session", description = "Connection to the selected peer and notifications"),
        (name = "commands", description = "Commands written to the connected Pi")
    ),
    paths(
        super::health::health_check,
        super::peers::list_peers,
        super::peers::select_peer,
        super::session::get_session,
        super::session::connect,
        super::session::disconnect,
        super::commands::send_command,
        super::notifications::list_notifications,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ActionResponse,
            PeerEntry,
            PeersResponse,
            SelectPeerRequest,
            SessionResponse,
            Notification,
            NotificationsResponse,
            pilink_core::Command,
            pilink_core::ConnectionState,
        )
    )
)]
pub struct ApiDoc;
