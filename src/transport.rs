//! The narrow slice of a BLE stack the connection manager needs.
//!
//! [`crate::btle::BtleplugTransport`] implements these traits on the host
//! radio; [`crate::mock::MockTransport`] implements them in memory for tests.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::types::DeviceHandle;

/// Raw notification payloads from one characteristic, in arrival order.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// Yields once when the platform reports the peripheral gone.
pub type DisconnectStream = BoxStream<'static, ()>;

/// Devices that matched a scan's name filter, as they are seen.
pub type DiscoveryStream = BoxStream<'static, DeviceHandle>;

/// A characteristic located by [`GattSession::resolve_characteristic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// Host-level BLE capability: discovery and opening GATT sessions.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Start discovery, reporting devices whose advertised name starts with
    /// `name_prefix`.  The stream may repeat a device.
    async fn start_scan(&self, name_prefix: &str) -> Result<DiscoveryStream>;

    async fn stop_scan(&self) -> Result<()>;

    /// Let the platform choose a device (a picker dialog, or the first
    /// matching advertisement).  Fails with
    /// [`crate::error::LinkError::NoDeviceSelected`] when nothing is chosen
    /// within `timeout`.
    async fn request_device(&self, name_prefix: &str, timeout: Duration) -> Result<DeviceHandle>;

    /// Open a GATT connection to `device`.
    async fn connect(&self, device: &DeviceHandle) -> Result<Box<dyn GattSession>>;
}

/// One open GATT connection.
#[async_trait]
pub trait GattSession: Send + Sync {
    async fn resolve_service(&self, service: Uuid) -> Result<()>;

    async fn resolve_characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef>;

    async fn write_value(&self, characteristic: &CharacteristicRef, value: &[u8]) -> Result<()>;

    async fn subscribe(&self, characteristic: &CharacteristicRef) -> Result<NotificationStream>;

    async fn disconnect_events(&self) -> Result<DisconnectStream>;

    async fn disconnect(&self) -> Result<()>;
}
