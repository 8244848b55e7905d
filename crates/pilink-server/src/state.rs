//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilink_core::{
    CommandTarget, Config, ConnectionEvent, DeviceDirectory, EventSink, Link, LinkEvent,
    PeerAddress, PendingTeardown, PilinkError, SessionController, SharedDirectory, Transport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use utoipa::ToSchema;

/// Number of notifications kept for `/api/notifications`.
pub const NOTIFICATION_CAPACITY: usize = 32;

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// A user-visible notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "message": "Connected to device",
    "success": true,
    "created_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct Notification {
    /// Increasing id, usable as a cursor.
    #[schema(example = 3)]
    pub id: u64,

    /// Notification text.
    #[schema(example = "Connected to device")]
    pub message: String,

    /// Whether it reports a success.
    #[schema(example = true)]
    pub success: bool,

    /// When it was raised.
    #[schema(value_type = String, example = "2025-01-15T03:30:00Z")]
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct NotificationFeed {
    next_id: u64,
    entries: VecDeque<Notification>,
}

/// State behind every handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Discovered peers.
    pub directory: SharedDirectory,
    /// The single session controller.
    pub controller: Mutex<SessionController>,
    /// Directory index picked by the user, cleared after each connect attempt.
    pub selection: Mutex<Option<usize>>,
    bluetooth_available: bool,
    notifications: std::sync::Mutex<NotificationFeed>,
}

impl AppState {
    /// Build the state around `transport`.
    ///
    /// Returns the state and the receiver of the controller's connection
    /// events, to be drained by [`run_event_pump`].
    pub fn new(
        config: Config,
        directory: SharedDirectory,
        transport: Arc<dyn Transport>,
        bluetooth_available: bool,
    ) -> (SharedState, mpsc::Receiver<ConnectionEvent>) {
        let target = CommandTarget::from(&config.bluetooth);
        let (controller, events) = SessionController::new(transport, target);

        let state = Arc::new(Self {
            config,
            directory,
            controller: Mutex::new(controller),
            selection: Mutex::new(None),
            bluetooth_available,
            notifications: std::sync::Mutex::new(NotificationFeed::default()),
        });
        (state, events)
    }

    /// State for a host without a usable Bluetooth stack: everything is
    /// served, every connect fails with `PlatformUnavailable`.
    pub fn unavailable(
        config: Config,
        reason: impl Into<String>,
    ) -> (SharedState, mpsc::Receiver<ConnectionEvent>) {
        let transport = Arc::new(UnavailableTransport {
            reason: reason.into(),
        });
        Self::new(config, DeviceDirectory::shared(), transport, false)
    }

    /// Whether a Bluetooth stack was found at startup.
    #[must_use]
    pub const fn bluetooth_available(&self) -> bool {
        self.bluetooth_available
    }

    /// Record a notification.
    pub fn notify(&self, success: bool, message: impl Into<String>) -> Notification {
        let mut feed = self
            .notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        feed.next_id += 1;
        let notification = Notification {
            id: feed.next_id,
            message: message.into(),
            success,
            created_at_utc: Utc::now(),
        };
        if feed.entries.len() == NOTIFICATION_CAPACITY {
            feed.entries.pop_front();
        }
        feed.entries.push_back(notification.clone());
        notification
    }

    /// Notifications with an id greater than `after`, oldest first.
    #[must_use]
    pub fn notifications_after(&self, after: u64) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .iter()
            .filter(|n| n.id > after)
            .cloned()
            .collect()
    }
}

/// Apply connection events to the controller until the channel closes,
/// raising a notification for each state change.
pub async fn run_event_pump(state: SharedState, mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let applied = state.controller.lock().await.handle_event(&event);
        if !applied {
            continue;
        }
        match &event.kind {
            LinkEvent::Connected => {
                state.notify(true, "Connected to device");
            }
            LinkEvent::Disconnected => {
                state.notify(false, "Disconnected from device");
            }
            LinkEvent::ConnectFailed(_) => {
                state.notify(false, "Unable to connect to device selected");
            }
            LinkEvent::WriteCompleted(_) => {}
        }
    }
    info!("Connection event channel closed");
}

struct UnavailableTransport {
    reason: String,
}

#[async_trait]
impl Transport for UnavailableTransport {
    async fn connect(
        &self,
        _address: &PeerAddress,
        _events: EventSink,
        _after: PendingTeardown,
    ) -> pilink_core::Result<Box<dyn Link>> {
        Err(PilinkError::PlatformUnavailable(self.reason.clone()))
    }
}
