//! BlueZ backend built on `bluer`.
//!
//! Implements [`Transport`] and [`Scanner`] on top of the system Bluetooth
//! daemon. Only compiled with the `bluetooth` feature.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use bluer::gatt::remote::{Characteristic, Service};
use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
};
use futures::{pin_mut, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PilinkError, Result};
use crate::scan::{ScanEvent, ScanHandle, Scanner};
use crate::transport::{
    EventSink, GattCharacteristic, GattService, Link, LinkEvent, PendingTeardown, Transport,
};
use crate::types::{PeerAddress, PeerIdentity};

fn platform(err: &bluer::Error) -> PilinkError {
    PilinkError::PlatformUnavailable(err.to_string())
}

/// Open the configured adapter, or the default one.
///
/// # Errors
///
/// Returns `PlatformUnavailable` if BlueZ cannot be reached, the adapter
/// does not exist, or it is powered off.
pub async fn open_adapter(name: Option<&str>) -> Result<Adapter> {
    let session = bluer::Session::new().await.map_err(|e| platform(&e))?;
    let adapter = match name {
        Some(name) => session.adapter(name).map_err(|e| platform(&e))?,
        None => session.default_adapter().await.map_err(|e| platform(&e))?,
    };

    let powered = adapter.is_powered().await.map_err(|e| platform(&e))?;
    if !powered {
        return Err(PilinkError::PlatformUnavailable(format!(
            "adapter {} is powered off",
            adapter.name()
        )));
    }

    info!(adapter = adapter.name(), "Bluetooth adapter ready");
    Ok(adapter)
}

/// [`Transport`] backed by a BlueZ adapter.
#[derive(Clone)]
pub struct BluerTransport {
    adapter: Adapter,
}

impl BluerTransport {
    /// Use `adapter` for connections.
    #[must_use]
    pub const fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    fn device(&self, address: &PeerAddress) -> Result<(Address, Device)> {
        let failed = |reason: String| PilinkError::ConnectFailed {
            address: address.to_string(),
            reason,
        };
        let addr = Address::from_str(address.as_str()).map_err(|e| failed(e.to_string()))?;
        let device = self.adapter.device(addr).map_err(|e| failed(e.to_string()))?;
        Ok((addr, device))
    }
}

#[async_trait]
impl Transport for BluerTransport {
    async fn connect(
        &self,
        address: &PeerAddress,
        events: EventSink,
        after: PendingTeardown,
    ) -> Result<Box<dyn Link>> {
        let (addr, device) = self.device(address)?;

        let known = self
            .adapter
            .device_addresses()
            .await
            .map_err(|e| platform(&e))?;
        if !known.contains(&addr) {
            return Err(PilinkError::ConnectFailed {
                address: address.to_string(),
                reason: "device is not known to the adapter".to_string(),
            });
        }

        let watched = device.clone();
        let sink = events.clone();
        tokio::spawn(async move {
            // The device object is shared with the released link; its
            // disconnect must land before we connect.
            after.finished().await;
            if let Err(err) = watched.connect().await {
                sink.emit(LinkEvent::ConnectFailed(err.to_string())).await;
                return;
            }
            if !sink.emit(LinkEvent::Connected).await {
                return;
            }
            watch_disconnect(&watched, &sink).await;
        });

        Ok(Box::new(BluerLink {
            address: address.clone(),
            device,
            events,
        }))
    }
}

async fn watch_disconnect(device: &Device, sink: &EventSink) {
    let stream = match device.events().await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(session = %sink.session(), error = %err, "Cannot watch device events");
            return;
        }
    };
    pin_mut!(stream);
    while let Some(event) = stream.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            sink.emit(LinkEvent::Disconnected).await;
            return;
        }
    }
}

struct BluerLink {
    address: PeerAddress,
    device: Device,
    events: EventSink,
}

#[async_trait]
impl Link for BluerLink {
    /// BlueZ resolves the GATT database by itself once the device is
    /// connected and exposes no call to start discovery, so this only
    /// records whether resolution has finished yet. Lookups that run before
    /// it has finished find nothing.
    async fn discover_services(&self) -> Result<()> {
        let resolved = self.device.is_services_resolved().await.unwrap_or(false);
        debug!(address = %self.address, resolved, "Service discovery requested");
        Ok(())
    }

    async fn service(&self, uuid: Uuid) -> Result<Option<Box<dyn GattService>>> {
        let services = match self.device.services().await {
            Ok(services) => services,
            Err(err) => {
                debug!(address = %self.address, error = %err, "Services not available");
                return Ok(None);
            }
        };
        for service in services {
            if service.uuid().await.ok() == Some(uuid) {
                return Ok(Some(Box::new(BluerService {
                    uuid,
                    service,
                    events: self.events.clone(),
                })));
            }
        }
        Ok(None)
    }

    async fn disconnect(&self) -> Result<()> {
        self.device
            .disconnect()
            .await
            .map_err(|e| PilinkError::ConnectFailed {
                address: self.address.to_string(),
                reason: e.to_string(),
            })
    }
}

struct BluerService {
    uuid: Uuid,
    service: Service,
    events: EventSink,
}

#[async_trait]
impl GattService for BluerService {
    async fn characteristic(&self, uuid: Uuid) -> Result<Option<Box<dyn GattCharacteristic>>> {
        let characteristics = match self.service.characteristics().await {
            Ok(characteristics) => characteristics,
            Err(err) => {
                debug!(service = %self.uuid, error = %err, "Characteristics not available");
                return Ok(None);
            }
        };
        for characteristic in characteristics {
            if characteristic.uuid().await.ok() == Some(uuid) {
                return Ok(Some(Box::new(BluerCharacteristic {
                    uuid,
                    characteristic,
                    events: self.events.clone(),
                })));
            }
        }
        Ok(None)
    }
}

struct BluerCharacteristic {
    uuid: Uuid,
    characteristic: Characteristic,
    events: EventSink,
}

#[async_trait]
impl GattCharacteristic for BluerCharacteristic {
    async fn submit_write(&self, value: &[u8]) -> Result<()> {
        let flags = self
            .characteristic
            .flags()
            .await
            .map_err(|e| PilinkError::WriteSubmissionFailed(e.to_string()))?;
        if !(flags.write || flags.write_without_response) {
            return Err(PilinkError::WriteSubmissionFailed(format!(
                "characteristic {} is not writable",
                self.uuid
            )));
        }

        let characteristic = self.characteristic.clone();
        let sink = self.events.clone();
        let value = value.to_vec();
        tokio::spawn(async move {
            let outcome = characteristic
                .write(&value)
                .await
                .map_err(|e| e.to_string());
            sink.emit(LinkEvent::WriteCompleted(outcome)).await;
        });
        Ok(())
    }
}

/// [`Scanner`] running LE discovery on a BlueZ adapter.
#[derive(Clone)]
pub struct BluerScanner {
    adapter: Adapter,
    service_filter: Option<Uuid>,
}

impl BluerScanner {
    /// Scan with `adapter`, optionally keeping only peers advertising
    /// `service_filter`.
    #[must_use]
    pub const fn new(adapter: Adapter, service_filter: Option<Uuid>) -> Self {
        Self {
            adapter,
            service_filter,
        }
    }
}

async fn identity(device: &Device, filter: Option<Uuid>) -> Option<PeerIdentity> {
    if let Some(wanted) = filter {
        let uuids = device.uuids().await.ok().flatten().unwrap_or_default();
        if !uuids.contains(&wanted) {
            return None;
        }
    }
    let name = device.name().await.ok().flatten();
    Some(PeerIdentity::new(device.address().to_string(), name))
}

#[async_trait]
impl Scanner for BluerScanner {
    async fn start(&self, events: mpsc::Sender<ScanEvent>) -> Result<ScanHandle> {
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            uuids: self.service_filter.into_iter().collect::<HashSet<_>>(),
            ..Default::default()
        };
        if let Err(err) = self.adapter.set_discovery_filter(filter).await {
            warn!(error = %err, "Discovery filter rejected, scanning unfiltered");
        }

        let discovery = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| PilinkError::ScanFailed(e.to_string()))?;

        let adapter = self.adapter.clone();
        let service_filter = self.service_filter;
        let task = tokio::spawn(async move {
            let mut known = Vec::new();
            for addr in adapter.device_addresses().await.unwrap_or_default() {
                if let Ok(device) = adapter.device(addr) {
                    known.extend(identity(&device, service_filter).await);
                }
            }
            if !known.is_empty() && events.send(ScanEvent::Batch(known)).await.is_err() {
                return;
            }

            let mut discovery = Box::pin(discovery);
            while let Some(event) = discovery.next().await {
                let AdapterEvent::DeviceAdded(addr) = event else {
                    continue;
                };
                let Ok(device) = adapter.device(addr) else {
                    continue;
                };
                if let Some(peer) = identity(&device, service_filter).await {
                    if events.send(ScanEvent::Discovered(peer)).await.is_err() {
                        return;
                    }
                }
            }
            let _ = events
                .send(ScanEvent::Failed("discovery stream ended".to_string()))
                .await;
        });

        info!(adapter = self.adapter.name(), filter = ?self.service_filter, "Scanning for peers");
        Ok(ScanHandle::new(task))
    }
}
