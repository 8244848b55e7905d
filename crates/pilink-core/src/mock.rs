//! In-memory Bluetooth backend.
//!
//! Used by the test suites and by builds without the `bluetooth` feature.
//! Peers are configured up front; every call the controller makes is
//! recorded so tests can assert on what reached the "radio".
//!
//! Like BlueZ, the mock has one device per address: disconnecting a link
//! drops every issued connection to that peer, and takes a scheduler turn
//! before doing so.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
use crate::error::{PilinkError, Result};
use crate::scan::{ScanEvent, ScanHandle, Scanner};
use crate::transport::{
    EventSink, GattCharacteristic, GattService, Link, LinkEvent, PendingTeardown, Transport,
};
use crate::types::{PeerAddress, PeerIdentity};

/// A simulated peer.
#[derive(Debug, Clone)]
pub struct MockPeer {
    /// Address the peer answers on.
    pub address: PeerAddress,
    /// Advertised name.
    pub name: Option<String>,
    /// Service exposed by the peer, if any.
    pub service: Option<Uuid>,
    /// Characteristic inside `service`, if any.
    pub characteristic: Option<Uuid>,
    /// Whether connection attempts succeed.
    pub accepts_connections: bool,
    /// Whether write submissions are accepted.
    pub accepts_writes: bool,
}

impl MockPeer {
    /// A Pi exposing the default command service and characteristic.
    #[must_use]
    pub fn pi(address: &str) -> Self {
        Self::named(address, "raspberrypi")
    }

    /// Like [`MockPeer::pi`] with a custom name.
    #[must_use]
    pub fn named(address: &str, name: &str) -> Self {
        Self {
            address: PeerAddress::new(address),
            name: Some(name.to_string()),
            service: Some(DEFAULT_SERVICE_UUID),
            characteristic: Some(DEFAULT_CHARACTERISTIC_UUID),
            accepts_connections: true,
            accepts_writes: true,
        }
    }

    /// Peer lacking the command service.
    #[must_use]
    pub fn without_service(mut self) -> Self {
        self.service = None;
        self
    }

    /// Peer whose service lacks the command characteristic.
    #[must_use]
    pub fn without_characteristic(mut self) -> Self {
        self.characteristic = None;
        self
    }

    /// Peer whose connection attempts fail after they started.
    #[must_use]
    pub const fn refusing_connections(mut self) -> Self {
        self.accepts_connections = false;
        self
    }

    /// Peer rejecting write submissions.
    #[must_use]
    pub const fn rejecting_writes(mut self) -> Self {
        self.accepts_writes = false;
        self
    }

    /// Identity as it would appear in scan results.
    #[must_use]
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.address.clone(), self.name.clone())
    }
}

/// A call that reached the mock stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// Connection attempt.
    Connect(PeerAddress),
    /// Link teardown.
    Disconnect(PeerAddress),
    /// Service discovery request.
    DiscoverServices(PeerAddress),
    /// Accepted write submission.
    Write {
        /// Target peer.
        address: PeerAddress,
        /// Target characteristic.
        characteristic: Uuid,
        /// Bytes written.
        value: Vec<u8>,
    },
}

#[derive(Debug)]
struct LinkRecord {
    address: PeerAddress,
    sink: EventSink,
    /// Handle not yet released.
    open: bool,
    /// Connect reached the device (after any pending teardown).
    issued: bool,
    /// `Connected` was reported.
    connected: bool,
}

#[derive(Debug)]
struct MockState {
    peers: Vec<MockPeer>,
    calls: Vec<MockCall>,
    links: Vec<LinkRecord>,
    auto_connect: bool,
}

/// Mock [`Transport`]. Clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::with_peers([])
    }
}

impl MockTransport {
    /// Transport knowing `peers`.
    #[must_use]
    pub fn with_peers(peers: impl IntoIterator<Item = MockPeer>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                peers: peers.into_iter().collect(),
                calls: Vec::new(),
                links: Vec::new(),
                auto_connect: true,
            })),
        }
    }

    /// When disabled, connection attempts stay pending until
    /// [`MockTransport::complete_connect`] is called.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.lock().auto_connect = enabled;
    }

    /// Configured peers.
    #[must_use]
    pub fn peers(&self) -> Vec<MockPeer> {
        self.lock().peers.clone()
    }

    /// Every call recorded so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Values of accepted writes, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Peers of links that are still open.
    #[must_use]
    pub fn open_links(&self) -> Vec<PeerAddress> {
        self.lock()
            .links
            .iter()
            .filter(|link| link.open)
            .map(|link| link.address.clone())
            .collect()
    }

    /// Report the pending attempts to `address` as connected.
    /// Returns `false` if there was none.
    pub async fn complete_connect(&self, address: &PeerAddress) -> bool {
        let sinks: Vec<EventSink> = self
            .lock()
            .links
            .iter_mut()
            .filter(|link| link.open && link.issued && &link.address == address)
            .map(|link| {
                link.connected = true;
                link.sink.clone()
            })
            .collect();
        for sink in &sinks {
            sink.emit(LinkEvent::Connected).await;
        }
        !sinks.is_empty()
    }

    /// Simulate the peer going away. Returns `false` if no link was open.
    pub async fn drop_link(&self, address: &PeerAddress) -> bool {
        let sinks: Vec<EventSink> = {
            let mut state = self.lock();
            state
                .links
                .iter_mut()
                .filter(|link| link.open && link.issued && &link.address == address)
                .map(|link| {
                    link.open = false;
                    link.sink.clone()
                })
                .collect()
        };
        for sink in &sinks {
            sink.emit(LinkEvent::Disconnected).await;
        }
        !sinks.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Mark link `index` as issued. Returns its sink when auto-connect should
/// report it connected.
fn mark_issued(state: &Mutex<MockState>, index: usize) -> Option<EventSink> {
    let mut state = lock(state);
    let auto_connect = state.auto_connect;
    let link = state.links.get_mut(index).filter(|link| link.open)?;
    link.issued = true;
    link.connected = auto_connect;
    auto_connect.then(|| link.sink.clone())
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        address: &PeerAddress,
        events: EventSink,
        after: PendingTeardown,
    ) -> Result<Box<dyn Link>> {
        let (peer, index) = {
            let mut state = self.lock();
            state.calls.push(MockCall::Connect(address.clone()));

            let peer = state
                .peers
                .iter()
                .find(|peer| &peer.address == address)
                .cloned()
                .ok_or_else(|| PilinkError::ConnectFailed {
                    address: address.to_string(),
                    reason: "unknown peer".to_string(),
                })?;

            state.links.push(LinkRecord {
                address: address.clone(),
                sink: events.clone(),
                open: peer.accepts_connections,
                issued: false,
                connected: false,
            });
            (peer, state.links.len() - 1)
        };

        if !peer.accepts_connections {
            let sink = events.clone();
            tokio::spawn(async move {
                after.finished().await;
                sink.emit(LinkEvent::ConnectFailed("peer refused the connection".into()))
                    .await;
            });
        } else if after.is_pending() {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                after.finished().await;
                if let Some(sink) = mark_issued(&state, index) {
                    sink.emit(LinkEvent::Connected).await;
                }
            });
        } else if let Some(sink) = mark_issued(&self.state, index) {
            // Issued right away so `complete_connect` sees the attempt.
            tokio::spawn(async move {
                sink.emit(LinkEvent::Connected).await;
            });
        }

        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
            index,
            peer,
            events,
        }))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
    index: usize,
    peer: MockPeer,
    events: EventSink,
}

#[async_trait]
impl Link for MockLink {
    async fn discover_services(&self) -> Result<()> {
        lock(&self.state)
            .calls
            .push(MockCall::DiscoverServices(self.peer.address.clone()));
        Ok(())
    }

    async fn service(&self, uuid: Uuid) -> Result<Option<Box<dyn GattService>>> {
        if self.peer.service != Some(uuid) {
            return Ok(None);
        }
        Ok(Some(Box::new(MockService {
            state: Arc::clone(&self.state),
            peer: self.peer.clone(),
            events: self.events.clone(),
        })))
    }

    async fn disconnect(&self) -> Result<()> {
        tokio::task::yield_now().await;

        let dropped: Vec<EventSink> = {
            let mut state = lock(&self.state);
            state
                .calls
                .push(MockCall::Disconnect(self.peer.address.clone()));
            if let Some(link) = state.links.get_mut(self.index) {
                link.open = false;
            }
            let address = &self.peer.address;
            state
                .links
                .iter_mut()
                .filter(|link| link.issued && &link.address == address)
                .filter_map(|link| {
                    link.open = false;
                    std::mem::take(&mut link.connected).then(|| link.sink.clone())
                })
                .collect()
        };
        for sink in &dropped {
            sink.emit(LinkEvent::Disconnected).await;
        }
        Ok(())
    }
}

struct MockService {
    state: Arc<Mutex<MockState>>,
    peer: MockPeer,
    events: EventSink,
}

#[async_trait]
impl GattService for MockService {
    async fn characteristic(&self, uuid: Uuid) -> Result<Option<Box<dyn GattCharacteristic>>> {
        if self.peer.characteristic != Some(uuid) {
            return Ok(None);
        }
        Ok(Some(Box::new(MockCharacteristic {
            state: Arc::clone(&self.state),
            uuid,
            peer: self.peer.clone(),
            events: self.events.clone(),
        })))
    }
}

struct MockCharacteristic {
    state: Arc<Mutex<MockState>>,
    uuid: Uuid,
    peer: MockPeer,
    events: EventSink,
}

#[async_trait]
impl GattCharacteristic for MockCharacteristic {
    async fn submit_write(&self, value: &[u8]) -> Result<()> {
        if !self.peer.accepts_writes {
            return Err(PilinkError::WriteSubmissionFailed(
                "characteristic is not writable".to_string(),
            ));
        }
        lock(&self.state).calls.push(MockCall::Write {
            address: self.peer.address.clone(),
            characteristic: self.uuid,
            value: value.to_vec(),
        });

        let sink = self.events.clone();
        tokio::spawn(async move {
            sink.emit(LinkEvent::WriteCompleted(Ok(()))).await;
        });
        Ok(())
    }
}

/// Mock [`Scanner`] replaying a fixed list of events.
#[derive(Debug, Clone, Default)]
pub struct MockScanner {
    events: Vec<ScanEvent>,
}

impl MockScanner {
    /// Scanner replaying `events` in order.
    #[must_use]
    pub const fn new(events: Vec<ScanEvent>) -> Self {
        Self { events }
    }

    /// Scanner reporting every peer of `transport` in one batch.
    #[must_use]
    pub fn from_transport(transport: &MockTransport) -> Self {
        let peers = transport.peers().iter().map(MockPeer::identity).collect();
        Self::new(vec![ScanEvent::Batch(peers)])
    }
}

#[async_trait]
impl Scanner for MockScanner {
    async fn start(&self, events: mpsc::Sender<ScanEvent>) -> Result<ScanHandle> {
        let replay = self.events.clone();
        let task = tokio::spawn(async move {
            for event in replay {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(ScanHandle::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionId;

    #[tokio::test]
    async fn test_unknown_peer_is_rejected_synchronously() {
        let transport = MockTransport::with_peers([MockPeer::pi("AA")]);
        let (tx, _rx) = mpsc::channel(4);
        let sink = EventSink::new(SessionId::FIRST, PeerAddress::new("BB"), tx);

        let result = transport
            .connect(&PeerAddress::new("BB"), sink, PendingTeardown::none())
            .await;

        assert!(matches!(result, Err(PilinkError::ConnectFailed { .. })));
        assert!(transport.open_links().is_empty());
        assert_eq!(transport.calls(), [MockCall::Connect(PeerAddress::new("BB"))]);
    }

    #[tokio::test]
    async fn test_pending_connect_completes_on_demand() {
        let transport = MockTransport::with_peers([MockPeer::pi("AA")]);
        transport.set_auto_connect(false);
        let (tx, mut rx) = mpsc::channel(4);
        let address = PeerAddress::new("AA");
        let sink = EventSink::new(SessionId::FIRST, address.clone(), tx);

        let _link = transport
            .connect(&address, sink, PendingTeardown::none())
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        assert!(transport.complete_connect(&address).await);
        assert_eq!(rx.recv().await.unwrap().kind, LinkEvent::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_drops_every_link_to_the_peer() {
        let transport = MockTransport::with_peers([MockPeer::pi("AA")]);
        let (tx, mut rx) = mpsc::channel(8);
        let address = PeerAddress::new("AA");

        let first = transport
            .connect(
                &address,
                EventSink::new(SessionId::FIRST, address.clone(), tx.clone()),
                PendingTeardown::none(),
            )
            .await
            .unwrap();
        let _second = transport
            .connect(
                &address,
                EventSink::new(SessionId::FIRST.next(), address.clone(), tx),
                PendingTeardown::none(),
            )
            .await
            .unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        first.disconnect().await.unwrap();

        assert!(transport.open_links().is_empty());
        let mut dropped = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        dropped.sort_by_key(|event| event.session);
        assert_eq!(dropped[0].session, SessionId::FIRST);
        assert_eq!(dropped[1].session, SessionId::FIRST.next());
        assert!(dropped.iter().all(|e| e.kind == LinkEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_connect_waits_for_pending_teardown() {
        let transport = MockTransport::with_peers([MockPeer::pi("AA")]);
        let (tx, mut rx) = mpsc::channel(8);
        let address = PeerAddress::new("AA");

        let old = transport
            .connect(
                &address,
                EventSink::new(SessionId::FIRST, address.clone(), tx.clone()),
                PendingTeardown::none(),
            )
            .await
            .unwrap();
        rx.recv().await.unwrap();

        let teardown = PendingTeardown::spawn(async move {
            let _ = old.disconnect().await;
        });
        let _new = transport
            .connect(
                &address,
                EventSink::new(SessionId::FIRST.next(), address.clone(), tx),
                teardown,
            )
            .await
            .unwrap();

        let dropped = rx.recv().await.unwrap();
        assert_eq!(dropped.session, SessionId::FIRST);
        assert_eq!(dropped.kind, LinkEvent::Disconnected);
        let connected = rx.recv().await.unwrap();
        assert_eq!(connected.session, SessionId::FIRST.next());
        assert_eq!(connected.kind, LinkEvent::Connected);
        assert_eq!(transport.open_links(), [address]);
    }

    #[tokio::test]
    async fn test_scanner_replays_transport_peers() {
        let transport =
            MockTransport::with_peers([MockPeer::pi("AA"), MockPeer::named("BB", "kitchen")]);
        let (tx, mut rx) = mpsc::channel(4);

        let _handle = MockScanner::from_transport(&transport)
            .start(tx)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ScanEvent::Batch(peers) => {
                assert_eq!(peers.len(), 2);
                assert_eq!(peers[1].display_name(), "kitchen");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
