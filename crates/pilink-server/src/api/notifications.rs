//! Notification feed endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::state::{Notification, SharedState};

/// Query parameters for the notification feed.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct NotificationsQuery {
    /// Only return notifications with a greater id.
    #[param(example = 2)]
    pub after: Option<u64>,
}

/// Recent notifications.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    /// Oldest first.
    pub notifications: Vec<Notification>,
}

/// List recent notifications.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "session",
    operation_id = "listNotifications",
    summary = "List recent notifications",
    description = "Returns the most recent user-visible notifications, \
        including connection changes reported after a call returned. Pass \
        the last seen id as `after` to get only newer ones.",
    params(NotificationsQuery),
    responses(
        (status = 200, description = "Notifications", body = NotificationsResponse)
    )
)]
pub async fn list_notifications(
    State(state): State<SharedState>,
    Query(query): Query<NotificationsQuery>,
) -> Json<NotificationsResponse> {
    Json(NotificationsResponse {
        notifications: state.notifications_after(query.after.unwrap_or(0)),
    })
}
