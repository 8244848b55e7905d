//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `peers` - Discovered peers and selection
//! - `session` - Connect / disconnect and session state
//! - `commands` - `emit` / `wifi` commands
//! - `notifications` - Recent user-visible notifications
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

pub mod commands;
pub mod error;
pub mod health;
pub mod notifications;
pub mod openapi;
pub mod peers;
pub mod session;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;
pub use session::ActionResponse;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                    - Health check
/// /swagger-ui                - Swagger UI
/// /api
/// ├── /peers                 - Directory snapshot (long-poll with since/wait_secs)
/// ├── /peers/select          - Select a peer by index
/// ├── /session               - Session state
/// ├── /session/connect       - Connect to the selected peer
/// ├── /session/disconnect    - Disconnect
/// ├── /commands/{command}    - Send emit / wifi
/// ├── /notifications         - Recent notifications
/// └── /openapi.json          - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .route("/notifications", get(notifications::list_notifications))
                .nest("/peers", peers::router())
                .nest("/session", session::router())
                .nest("/commands", commands::router()),
        )
        .merge(openapi::swagger_ui())
        .with_state(state)
}
