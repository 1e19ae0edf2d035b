//! In-memory transport for exercising the connection manager without a radio.
//!
//! [`MockTransport`] is cheap to clone; every clone shares the same fake
//! peripheral, so a test keeps one clone to drive notifications and link
//! loss while the manager owns another.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use uuid::Uuid;

use crate::error::{HandshakeStep, LinkError, Result};
use crate::protocol::{NOTIFY_CHARACTERISTIC, SERVICE_UUID, WRITE_CHARACTERISTIC};
use crate::transport::{
    BleTransport, CharacteristicRef, DisconnectStream, DiscoveryStream, GattSession,
    NotificationStream,
};
use crate::types::DeviceHandle;

/// How an injected handshake fault behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The step returns a transport error.
    Fail,
    /// The step never completes.
    Stall,
}

#[derive(Debug, Default)]
struct MockState {
    unavailable: bool,
    devices: Vec<DeviceHandle>,
    picker: Option<DeviceHandle>,
    fault: Option<(HandshakeStep, Fault)>,

    scan_prefix: String,
    scan_tx: Option<UnboundedSender<DeviceHandle>>,

    connected: Option<String>,
    notify_tx: Option<UnboundedSender<Vec<u8>>>,
    disconnect_tx: Option<UnboundedSender<()>>,

    writes: Vec<(Uuid, Vec<u8>)>,
    connect_attempts: usize,
    disconnect_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn checkpoint(state: &Mutex<MockState>, step: HandshakeStep) -> Result<()> {
    let fault = lock(state).fault.filter(|(s, _)| *s == step).map(|(_, f)| f);
    match fault {
        None => Ok(()),
        Some(Fault::Fail) => Err(LinkError::Transport(format!("injected failure at {step}"))),
        Some(Fault::Stall) => std::future::pending().await,
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host with no Bluetooth adapter.
    pub fn unavailable() -> Self {
        let t = Self::new();
        lock(&t.state).unavailable = true;
        t
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    /// Make a device visible.  Reported immediately to a running scan whose
    /// prefix matches.
    pub fn add_device(&self, device: DeviceHandle) {
        let mut s = self.state();
        if let (Some(tx), Some(name)) = (&s.scan_tx, &device.name) {
            if name.starts_with(&s.scan_prefix) {
                let _ = tx.unbounded_send(device.clone());
            }
        }
        s.devices.push(device);
    }

    /// What the platform picker returns; `None` means the user cancelled.
    pub fn set_picker(&self, device: Option<DeviceHandle>) {
        self.state().picker = device;
    }

    pub fn fail_at(&self, step: HandshakeStep) {
        self.state().fault = Some((step, Fault::Fail));
    }

    pub fn stall_at(&self, step: HandshakeStep) {
        self.state().fault = Some((step, Fault::Stall));
    }

    pub fn clear_fault(&self) {
        self.state().fault = None;
    }

    /// Deliver one notification.  Returns `false` if nobody is subscribed.
    pub fn notify(&self, data: &[u8]) -> bool {
        match &self.state().notify_tx {
            Some(tx) => tx.unbounded_send(data.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Simulate the peripheral vanishing (out of range, powered off).
    pub fn drop_link(&self) {
        let mut s = self.state();
        s.connected = None;
        if let Some(tx) = s.disconnect_tx.take() {
            let _ = tx.unbounded_send(());
        }
    }

    /// Close the notification stream without a disconnect event.
    pub fn end_notifications(&self) {
        self.state().notify_tx = None;
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// Every value written, with the characteristic it was written to.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state().writes.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scan_tx.is_some()
    }

    pub fn connected_device(&self) -> Option<String> {
        self.state().connected.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }

    fn ensure_available(&self) -> Result<()> {
        if self.state().unavailable {
            Err(LinkError::CapabilityAbsent)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&self, name_prefix: &str) -> Result<DiscoveryStream> {
        self.ensure_available()?;
        let (tx, rx) = unbounded();
        let mut s = self.state();
        for d in &s.devices {
            if d.name.as_deref().is_some_and(|n| n.starts_with(name_prefix)) {
                let _ = tx.unbounded_send(d.clone());
            }
        }
        s.scan_prefix = name_prefix.to_owned();
        s.scan_tx = Some(tx);
        Ok(rx.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.state().scan_tx = None;
        Ok(())
    }

    async fn request_device(&self, _name_prefix: &str, _timeout: Duration) -> Result<DeviceHandle> {
        self.ensure_available()?;
        self.state().picker.clone().ok_or(LinkError::NoDeviceSelected)
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<Box<dyn GattSession>> {
        self.ensure_available()?;
        self.state().connect_attempts += 1;
        checkpoint(&self.state, HandshakeStep::OpenSession).await?;
        self.state().connected = Some(device.id.clone());
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl GattSession for MockSession {
    async fn resolve_service(&self, service: Uuid) -> Result<()> {
        checkpoint(&self.state, HandshakeStep::ResolveService).await?;
        if service == SERVICE_UUID {
            Ok(())
        } else {
            Err(LinkError::ServiceNotFound(service))
        }
    }

    async fn resolve_characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef> {
        let step = if uuid == WRITE_CHARACTERISTIC {
            HandshakeStep::ResolveWriteCharacteristic
        } else {
            HandshakeStep::ResolveNotifyCharacteristic
        };
        checkpoint(&self.state, step).await?;
        if service != SERVICE_UUID {
            return Err(LinkError::ServiceNotFound(service));
        }
        if uuid != WRITE_CHARACTERISTIC && uuid != NOTIFY_CHARACTERISTIC {
            return Err(LinkError::CharacteristicNotFound(uuid));
        }
        Ok(CharacteristicRef { service, uuid })
    }

    async fn write_value(&self, characteristic: &CharacteristicRef, value: &[u8]) -> Result<()> {
        checkpoint(&self.state, HandshakeStep::WriteEnable).await?;
        lock(&self.state)
            .writes
            .push((characteristic.uuid, value.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, _characteristic: &CharacteristicRef) -> Result<NotificationStream> {
        checkpoint(&self.state, HandshakeStep::Subscribe).await?;
        let (tx, rx) = unbounded();
        lock(&self.state).notify_tx = Some(tx);
        Ok(rx.boxed())
    }

    async fn disconnect_events(&self) -> Result<DisconnectStream> {
        checkpoint(&self.state, HandshakeStep::WatchDisconnect).await?;
        let (tx, rx) = unbounded();
        lock(&self.state).disconnect_tx = Some(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut s = lock(&self.state);
        s.disconnect_calls += 1;
        s.connected = None;
        s.notify_tx = None;
        s.disconnect_tx = None;
        Ok(())
    }
}
