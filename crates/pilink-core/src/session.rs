//! Peer session controller.
//!
//! Owns at most one connection at a time and moves through
//! `Disconnected -> Connecting -> Connected -> Disconnected`. Starting a new
//! connection releases the previous handle first, without waiting for the
//! stack to confirm the disconnect. The backend holds the new connect back
//! until that disconnect has run.
//!
//! Outcomes that the stack reports later arrive on the receiver returned by
//! [`SessionController::new`] and must be fed back through
//! [`SessionController::handle_event`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BluetoothConfig;
use crate::error::{PilinkError, Result};
use crate::transport::{
    ConnectionEvent, EventSink, Link, LinkEvent, PendingTeardown, SessionId, Transport,
    EVENT_CHANNEL_CAPACITY,
};
use crate::types::{Command, ConnectionState, PeerAddress};

/// GATT location commands are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTarget {
    /// Service holding the characteristic.
    pub service: Uuid,
    /// Characteristic receiving the command bytes.
    pub characteristic: Uuid,
}

impl From<&BluetoothConfig> for CommandTarget {
    fn from(config: &BluetoothConfig) -> Self {
        Self {
            service: config.service_uuid,
            characteristic: config.characteristic_uuid,
        }
    }
}

impl Default for CommandTarget {
    fn default() -> Self {
        Self::from(&BluetoothConfig::default())
    }
}

struct Session {
    id: SessionId,
    address: PeerAddress,
    link: Box<dyn Link>,
    state: ConnectionState,
}

/// Manages the single session with the selected peer.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    target: CommandTarget,
    events: mpsc::Sender<ConnectionEvent>,
    next_id: SessionId,
    session: Option<Session>,
    teardown: PendingTeardown,
}

impl SessionController {
    /// Create an idle controller and the receiver its connection events
    /// arrive on.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        target: CommandTarget,
    ) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let controller = Self {
            transport,
            target,
            events,
            next_id: SessionId::FIRST,
            session: None,
            teardown: PendingTeardown::none(),
        };
        (controller, rx)
    }

    /// State of the current session, `Disconnected` when idle.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.state)
    }

    /// Peer of the current session, connected or still connecting.
    #[must_use]
    pub fn connected_peer(&self) -> Option<&PeerAddress> {
        self.session.as_ref().map(|s| &s.address)
    }

    /// Id of the current session.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Where commands are written.
    #[must_use]
    pub const fn target(&self) -> CommandTarget {
        self.target
    }

    /// Start connecting to `address`, replacing any current session.
    ///
    /// Returns once the attempt is under way. Success or failure of the
    /// attempt is reported later as a [`ConnectionEvent`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailed` or `PlatformUnavailable` if the attempt could
    /// not be started. The controller is idle afterwards.
    pub async fn connect(&mut self, address: PeerAddress) -> Result<SessionId> {
        self.release("replaced by a new connection");

        let id = self.next_id;
        self.next_id = id.next();

        info!(session = %id, %address, "Starting connection");
        let sink = EventSink::new(id, address.clone(), self.events.clone());
        let after = std::mem::take(&mut self.teardown);
        let link = match self.transport.connect(&address, sink, after).await {
            Ok(link) => link,
            Err(err) => {
                warn!(session = %id, %address, error = %err, "Connection could not be started");
                return Err(match err {
                    PilinkError::ConnectFailed { .. } | PilinkError::PlatformUnavailable(_) => err,
                    other => PilinkError::ConnectFailed {
                        address: address.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        self.session = Some(Session {
            id,
            address,
            link,
            state: ConnectionState::Connecting,
        });
        Ok(id)
    }

    /// Apply an event reported by the transport.
    ///
    /// Events from a session that is no longer current are ignored.
    /// Returns `true` if the event belonged to the current session.
    pub fn handle_event(&mut self, event: &ConnectionEvent) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.id == event.session) else {
            debug!(session = %event.session, address = %event.address, kind = ?event.kind, "Ignoring event from a stale session");
            return false;
        };

        match &event.kind {
            LinkEvent::Connected => {
                info!(session = %session.id, address = %session.address, "Connected");
                session.state = ConnectionState::Connected;
            }
            LinkEvent::ConnectFailed(reason) => {
                warn!(session = %session.id, address = %session.address, %reason, "Connection failed");
                self.session = None;
            }
            LinkEvent::Disconnected => {
                info!(session = %session.id, address = %session.address, "Disconnected");
                self.session = None;
            }
            LinkEvent::WriteCompleted(Ok(())) => {
                debug!(session = %session.id, "Peer acknowledged write");
            }
            LinkEvent::WriteCompleted(Err(reason)) => {
                warn!(session = %session.id, %reason, "Peer rejected write");
            }
        }
        true
    }

    /// Write `command` to the connected peer.
    ///
    /// Triggers service discovery, looks up the command service and
    /// characteristic, and submits the write. Returns once the stack accepted
    /// the write; the peer's acknowledgement is reported later.
    ///
    /// # Errors
    ///
    /// - `NoConnection` if no session is in the `Connected` state
    /// - `ServiceNotFound` / `CharacteristicNotFound` if the peer lacks them
    /// - `WriteSubmissionFailed` if the stack rejects the write
    pub async fn send_command(&self, command: Command) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .filter(|s| s.state == ConnectionState::Connected)
            .ok_or(PilinkError::NoConnection)?;
        let link = &session.link;

        // Discovery completes in the background; the lookups below only see
        // what the stack has resolved so far.
        if let Err(err) = link.discover_services().await {
            warn!(session = %session.id, error = %err, "Service discovery request failed");
        }

        let service = link
            .service(self.target.service)
            .await?
            .ok_or(PilinkError::ServiceNotFound(self.target.service))?;

        let characteristic = service
            .characteristic(self.target.characteristic)
            .await?
            .ok_or(PilinkError::CharacteristicNotFound {
                service: self.target.service,
                characteristic: self.target.characteristic,
            })?;

        characteristic
            .submit_write(command.payload())
            .await
            .map_err(|err| match err {
                PilinkError::WriteSubmissionFailed(_) => err,
                other => PilinkError::WriteSubmissionFailed(other.to_string()),
            })?;

        info!(session = %session.id, address = %session.address, %command, "Command submitted");
        Ok(())
    }

    /// Tell the peer to drop its Wi-Fi and broadcast its own network.
    ///
    /// # Errors
    ///
    /// See [`SessionController::send_command`].
    pub async fn send_emit(&self) -> Result<()> {
        self.send_command(Command::Emit).await
    }

    /// Tell the peer to rejoin its Wi-Fi network.
    ///
    /// # Errors
    ///
    /// See [`SessionController::send_command`].
    pub async fn send_wifi(&self) -> Result<()> {
        self.send_command(Command::Wifi).await
    }

    /// Drop the current session without waiting for the stack.
    /// Returns `false` if there was nothing to disconnect.
    ///
    /// A following [`SessionController::connect`] is issued only after this
    /// disconnect has run.
    pub fn disconnect(&mut self) -> bool {
        self.release("disconnect requested")
    }

    /// Disconnect and wait for the stack, for process teardown.
    pub async fn shutdown(&mut self) {
        std::mem::take(&mut self.teardown).finished().await;
        if let Some(session) = self.session.take() {
            info!(session = %session.id, address = %session.address, "Closing session for shutdown");
            if let Err(err) = session.link.disconnect().await {
                warn!(session = %session.id, error = %err, "Disconnect failed during shutdown");
            }
        }
    }

    fn release(&mut self, reason: &'static str) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        info!(session = %session.id, address = %session.address, reason, "Releasing session");
        let Session { id, link, .. } = session;
        let previous = std::mem::take(&mut self.teardown);
        self.teardown = PendingTeardown::spawn(async move {
            previous.finished().await;
            if let Err(err) = link.disconnect().await {
                debug!(session = %id, error = %err, "Best-effort disconnect failed");
            }
        });
        true
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.session.is_some() && tokio::runtime::Handle::try_current().is_ok() {
            self.release("controller dropped");
        }
    }
}
