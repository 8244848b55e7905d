//! Deduplicated, append-only directory of discovered peers.
//!
//! The directory is written by a single ingestion task (see
//! [`crate::scan::ingest`]) and read by the user surface. Every change bumps
//! a revision published on a [`tokio::sync::watch`] channel, after the
//! change is already visible to readers.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::error::{PilinkError, Result};
use crate::types::{PeerAddress, PeerIdentity};

/// Directory shared between the ingestion task and its observers.
pub type SharedDirectory = Arc<RwLock<DeviceDirectory>>;

/// Insertion-ordered list of peers, unique by address.
#[derive(Debug)]
pub struct DeviceDirectory {
    peers: Vec<PeerIdentity>,
    revision: watch::Sender<u64>,
}

impl Default for DeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDirectory {
    /// Create an empty directory at revision 0.
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            peers: Vec::new(),
            revision,
        }
    }

    /// Wrap a new directory for sharing.
    #[must_use]
    pub fn shared() -> SharedDirectory {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert `peer` unless a peer with the same address is already listed.
    ///
    /// Returns `true` if the peer was inserted. Observers are notified only
    /// when the directory changed.
    pub fn add_discovered(&mut self, peer: PeerIdentity) -> bool {
        let inserted = self.insert(peer);
        if inserted {
            self.notify();
        }
        inserted
    }

    /// Insert every peer of `peers` that is not already listed, preserving
    /// order. Duplicates are skipped individually, including duplicates
    /// inside the batch itself: `[A, B, A, C]` adds `A, B, C`.
    ///
    /// Returns the number of peers inserted. Observers are notified once
    /// for the whole batch.
    pub fn add_discovered_batch<I>(&mut self, peers: I) -> usize
    where
        I: IntoIterator<Item = PeerIdentity>,
    {
        let mut inserted = 0;
        for peer in peers {
            if self.insert(peer) {
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.notify();
        }
        inserted
    }

    /// Peer at insertion-order position `index`.
    ///
    /// # Errors
    ///
    /// Returns `PilinkError::OutOfRange` if `index` is not a valid position.
    pub fn get(&self, index: usize) -> Result<&PeerIdentity> {
        self.peers.get(index).ok_or(PilinkError::OutOfRange {
            index,
            len: self.peers.len(),
        })
    }

    /// Returns `true` if a peer with `address` is listed.
    #[must_use]
    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.peers.iter().any(|peer| &peer.address == address)
    }

    /// All peers in insertion order.
    #[must_use]
    pub fn peers(&self) -> &[PeerIdentity] {
        &self.peers
    }

    /// Number of listed peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if nothing has been discovered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Current revision. Starts at 0 and grows by one per change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receive a value every time the directory changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn insert(&mut self, peer: PeerIdentity) -> bool {
        if self.contains(&peer.address) {
            return false;
        }
        debug!(address = %peer.address, name = ?peer.name, "Peer discovered");
        self.peers.push(peer);
        true
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(address: &str) -> PeerIdentity {
        PeerIdentity::new(address, None)
    }

    fn addresses(directory: &DeviceDirectory) -> Vec<&str> {
        directory
            .peers()
            .iter()
            .map(|p| p.address.as_str())
            .collect()
    }

    #[test]
    fn test_add_discovered_skips_duplicates() {
        let mut directory = DeviceDirectory::new();

        assert!(directory.add_discovered(peer("A")));
        assert!(directory.add_discovered(peer("B")));
        assert!(!directory.add_discovered(PeerIdentity::new("A", Some("renamed".into()))));

        assert_eq!(addresses(&directory), ["A", "B"]);
        assert_eq!(directory.get(0).unwrap().name, None);
    }

    #[test]
    fn test_batch_skips_only_the_duplicates() {
        let mut directory = DeviceDirectory::new();

        let inserted =
            directory.add_discovered_batch(vec![peer("A"), peer("B"), peer("A"), peer("C")]);

        assert_eq!(inserted, 3);
        assert_eq!(addresses(&directory), ["A", "B", "C"]);
    }

    #[test]
    fn test_batch_continues_past_known_peers() {
        let mut directory = DeviceDirectory::new();
        directory.add_discovered(peer("B"));

        let inserted = directory.add_discovered_batch(vec![peer("B"), peer("C"), peer("D")]);

        assert_eq!(inserted, 2);
        assert_eq!(addresses(&directory), ["B", "C", "D"]);
    }

    #[test]
    fn test_interleaved_events_never_duplicate() {
        let mut directory = DeviceDirectory::new();
        let stream = ["A", "B", "A", "C", "B", "B", "D", "A"];

        for (i, address) in stream.iter().enumerate() {
            if i % 2 == 0 {
                directory.add_discovered(peer(address));
            } else {
                directory.add_discovered_batch(vec![peer(address), peer("A")]);
            }
        }

        let mut seen = addresses(&directory);
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), total);
        assert_eq!(addresses(&directory), ["A", "B", "C", "D"]);
    }

    #[test]
    fn test_get_out_of_range() {
        let mut directory = DeviceDirectory::new();
        directory.add_discovered(peer("A"));

        assert_eq!(directory.get(0).unwrap().address.as_str(), "A");
        assert!(matches!(
            directory.get(1),
            Err(PilinkError::OutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_revision_bumps_only_on_change() {
        let mut directory = DeviceDirectory::new();
        assert_eq!(directory.revision(), 0);

        directory.add_discovered(peer("A"));
        directory.add_discovered(peer("A"));
        assert_eq!(directory.revision(), 1);

        directory.add_discovered_batch(vec![peer("B"), peer("C")]);
        assert_eq!(directory.revision(), 2);

        directory.add_discovered_batch(vec![peer("A"), peer("C")]);
        assert_eq!(directory.revision(), 2);
    }

    #[tokio::test]
    async fn test_subscriber_sees_change_after_it_is_applied() {
        let directory = DeviceDirectory::shared();
        let mut changes = directory.read().await.subscribe();

        let writer = directory.clone();
        tokio::spawn(async move {
            writer.write().await.add_discovered(peer("A"));
        });

        changes.changed().await.unwrap();
        let revision = *changes.borrow_and_update();
        let guard = directory.read().await;
        assert_eq!(revision, 1);
        assert_eq!(guard.len(), 1);
    }
}
