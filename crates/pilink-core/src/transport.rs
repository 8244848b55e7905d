//! Connection transport seam.
//!
//! The session controller talks to the Bluetooth stack only through these
//! traits. A backend implements [`Transport`] and hands back a [`Link`] per
//! connection attempt; everything that completes later (connection
//! established, link lost, write acknowledged) is reported through the
//! [`EventSink`] given to [`Transport::connect`].

use std::fmt;

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Result;
use crate::types::PeerAddress;

/// Capacity of the connection event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identifies one connection attempt of the session controller.
///
/// Events carry the id of the attempt that produced them so late events
/// from a replaced session can be told apart, even for the same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// The first id handed out.
    pub const FIRST: Self = Self(1);

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection attempt succeeded.
    Connected,
    /// The connection attempt failed after it was started.
    ConnectFailed(String),
    /// An established connection went away.
    Disconnected,
    /// A previously submitted write finished on the peer.
    WriteCompleted(std::result::Result<(), String>),
}

/// A [`LinkEvent`] tagged with the attempt and peer it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Attempt that produced the event.
    pub session: SessionId,
    /// Peer of that attempt.
    pub address: PeerAddress,
    /// The event itself.
    pub kind: LinkEvent,
}

/// Where a backend reports asynchronous outcomes for one connection attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    address: PeerAddress,
    tx: mpsc::Sender<ConnectionEvent>,
}

impl EventSink {
    /// Create a sink tagging every event with `session` and `address`.
    #[must_use]
    pub const fn new(
        session: SessionId,
        address: PeerAddress,
        tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            session,
            address,
            tx,
        }
    }

    /// Attempt the events belong to.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver `kind`. Returns `false` once nobody listens any more.
    pub async fn emit(&self, kind: LinkEvent) -> bool {
        self.tx
            .send(ConnectionEvent {
                session: self.session,
                address: self.address.clone(),
                kind,
            })
            .await
            .is_ok()
    }
}

/// Teardown of a released link that is still running in the background.
///
/// BlueZ keeps a single device object per address, so a disconnect that
/// lands after a new connect to the same peer drops the new connection too.
/// Backends await [`PendingTeardown::finished`] before issuing the connect.
#[derive(Debug, Default)]
pub struct PendingTeardown(Option<JoinHandle<()>>);

impl PendingTeardown {
    /// Nothing to wait for.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Run `teardown` in the background.
    #[must_use]
    pub fn spawn(teardown: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(Some(tokio::spawn(teardown)))
    }

    /// Whether a teardown is still to be awaited.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.0.is_some()
    }

    /// Wait until the teardown has run. A panicked teardown counts as done.
    pub async fn finished(self) {
        if let Some(handle) = self.0 {
            let _ = handle.await;
        }
    }
}

/// A Bluetooth stack able to open connections by address.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting to `address` and return the handle of the attempt.
    ///
    /// Must return as soon as the attempt is under way; the outcome is
    /// reported later through `events`. The connect itself is only issued
    /// once `after` has finished.
    ///
    /// # Errors
    ///
    /// Fails with `ConnectFailed` (or `PlatformUnavailable`) when the
    /// attempt cannot even be started.
    async fn connect(
        &self,
        address: &PeerAddress,
        events: EventSink,
        after: PendingTeardown,
    ) -> Result<Box<dyn Link>>;
}

/// Handle of one connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Ask the stack to discover services. Returns once the request is
    /// made, not when discovery has finished.
    async fn discover_services(&self) -> Result<()>;

    /// Look up a primary service among those discovered so far.
    async fn service(&self, uuid: Uuid) -> Result<Option<Box<dyn GattService>>>;

    /// Tear the connection down.
    async fn disconnect(&self) -> Result<()>;
}

/// A GATT service on a connected peer.
#[async_trait]
pub trait GattService: Send + Sync {
    /// Look up a characteristic of this service.
    async fn characteristic(&self, uuid: Uuid) -> Result<Option<Box<dyn GattCharacteristic>>>;
}

/// A GATT characteristic on a connected peer.
#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    /// Submit a write of `value`. Returns once the stack accepted the
    /// request; the peer's acknowledgement arrives later as
    /// [`LinkEvent::WriteCompleted`].
    ///
    /// # Errors
    ///
    /// Fails with `WriteSubmissionFailed` if the stack rejects the request.
    async fn submit_write(&self, value: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_increase() {
        let first = SessionId::FIRST;
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.to_string(), "#2");
    }

    #[tokio::test]
    async fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(SessionId::FIRST, PeerAddress::new("AA"), tx);

        assert!(sink.emit(LinkEvent::Connected).await);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session, SessionId::FIRST);
        assert_eq!(event.address.as_str(), "AA");
        assert_eq!(event.kind, LinkEvent::Connected);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(SessionId::FIRST, PeerAddress::new("AA"), tx);

        assert!(!sink.emit(LinkEvent::Disconnected).await);
    }

    #[tokio::test]
    async fn test_pending_teardown_runs_before_finished_returns() {
        let (tx, mut rx) = mpsc::channel(1);
        let teardown = PendingTeardown::spawn(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(()).await;
        });
        assert!(teardown.is_pending());

        teardown.finished().await;

        assert!(rx.try_recv().is_ok());
        assert!(!PendingTeardown::none().is_pending());
    }
}
