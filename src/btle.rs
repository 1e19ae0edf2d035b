//! [`BleTransport`] on the host radio, via btleplug.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream;
use futures::StreamExt;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LinkError, Result};
use crate::transport::{
    BleTransport, CharacteristicRef, DisconnectStream, DiscoveryStream, GattSession,
    NotificationStream,
};
use crate::types::DeviceHandle;

impl From<btleplug::Error> for LinkError {
    fn from(e: btleplug::Error) -> Self {
        LinkError::Transport(e.to_string())
    }
}

/// Resolve `id` to a device handle if its advertised name matches `prefix`.
async fn matching_device(adapter: &Adapter, id: &PeripheralId, prefix: &str) -> Option<DeviceHandle> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let name = peripheral.properties().await.ok()??.local_name?;
    name.starts_with(prefix)
        .then(|| DeviceHandle::new(peripheral.id().to_string(), Some(name)))
}

/// On macOS, `CBCentralManager` starts out in an "unknown" state and
/// silently ignores scan requests until it reports powered-on.
#[cfg(target_os = "macos")]
async fn wait_powered_on(adapter: &Adapter) {
    use btleplug::api::CentralState;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        match adapter.adapter_state().await {
            Ok(CentralState::PoweredOn) => {
                info!("macOS: adapter is PoweredOn");
                break;
            }
            Ok(state) if tokio::time::Instant::now() >= deadline => {
                warn!("macOS: adapter still {state:?} after 3 s, continuing");
                break;
            }
            Ok(state) => debug!("macOS: adapter state = {state:?}, waiting"),
            Err(e) => {
                warn!("macOS: adapter_state() error: {e}");
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Uses the first Bluetooth adapter on the host.
#[derive(Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Fails with [`LinkError::CapabilityAbsent`] when the host has no
    /// Bluetooth adapter or the platform stack refuses to start.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.map_err(|e| {
            warn!("Bluetooth manager unavailable: {e}");
            LinkError::CapabilityAbsent
        })?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| {
                warn!("could not list Bluetooth adapters: {e}");
                LinkError::CapabilityAbsent
            })?
            .into_iter()
            .next()
            .ok_or(LinkError::CapabilityAbsent)?;

        #[cfg(target_os = "macos")]
        wait_powered_on(&adapter).await;

        Ok(Self { adapter })
    }

    async fn find_peripheral(&self, id: &str) -> Result<Peripheral> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == id)
            .ok_or_else(|| LinkError::Transport(format!("device {id} is no longer known to the adapter")))
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&self, name_prefix: &str) -> Result<DiscoveryStream> {
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        // Peripherals cached from an earlier scan do not produce a fresh
        // DeviceDiscovered event, so report them first.
        let known: Vec<PeripheralId> = self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .map(|p| p.id())
            .collect();
        let seen = events.filter_map(|event| async move {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
                _ => None,
            }
        });

        let adapter = self.adapter.clone();
        let prefix = name_prefix.to_owned();
        let devices = stream::iter(known).chain(seen).filter_map(move |id| {
            let adapter = adapter.clone();
            let prefix = prefix.clone();
            async move { matching_device(&adapter, &id, &prefix).await }
        });
        Ok(devices.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    /// btleplug has no picker dialog; the first advertisement matching the
    /// prefix is taken as the selection.
    async fn request_device(&self, name_prefix: &str, timeout: Duration) -> Result<DeviceHandle> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        let found = tokio::time::timeout(timeout, async {
            loop {
                for p in self.adapter.peripherals().await? {
                    if let Some(device) = matching_device(&self.adapter, &p.id(), name_prefix).await {
                        return Ok::<_, LinkError>(device);
                    }
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        })
        .await;
        self.adapter.stop_scan().await.ok();

        match found {
            Ok(Ok(device)) => {
                info!("picked {} ({})", device.display_name(), device.id);
                Ok(device)
            }
            Ok(Err(e)) => {
                warn!("listing peripherals failed: {e}");
                Err(e)
            }
            Err(_) => Err(LinkError::NoDeviceSelected),
        }
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<Box<dyn GattSession>> {
        let peripheral = self.find_peripheral(&device.id).await?;
        debug!("opening GATT session to {}", device.id);
        peripheral.connect().await?;
        Ok(Box::new(BtleplugSession {
            adapter: self.adapter.clone(),
            peripheral,
        }))
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct BtleplugSession {
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleplugSession {
    fn characteristic(&self, c: &CharacteristicRef) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|ch| ch.uuid == c.uuid && ch.service_uuid == c.service)
            .ok_or(LinkError::CharacteristicNotFound(c.uuid))
    }
}

#[async_trait]
impl GattSession for BtleplugSession {
    async fn resolve_service(&self, service: Uuid) -> Result<()> {
        // BlueZ reports the connection before its GATT cache is populated;
        // discovering too early returns an empty service set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        self.peripheral.discover_services().await?;
        if self.peripheral.services().iter().any(|s| s.uuid == service) {
            Ok(())
        } else {
            Err(LinkError::ServiceNotFound(service))
        }
    }

    async fn resolve_characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef> {
        let c = CharacteristicRef { service, uuid };
        self.characteristic(&c)?;
        Ok(c)
    }

    async fn write_value(&self, characteristic: &CharacteristicRef, value: &[u8]) -> Result<()> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .write(&c, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: &CharacteristicRef) -> Result<NotificationStream> {
        let c = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&c).await?;
        let uuid = c.uuid;
        let values = self
            .peripheral
            .notifications()
            .await?
            .filter_map(move |n| async move { (n.uuid == uuid).then_some(n.value) });
        Ok(values.boxed())
    }

    async fn disconnect_events(&self) -> Result<DisconnectStream> {
        let target = self.peripheral.id();
        let events = self.adapter.events().await?.filter_map(move |event| {
            let target = target.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(id) if id == target => Some(()),
                    _ => None,
                }
            }
        });
        Ok(events.boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
