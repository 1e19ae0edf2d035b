use std::future::Future;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::error::{HandshakeStep, LinkError, Result};
use crate::parse::decode_frame;
use crate::protocol::{
    DEFAULT_NAME_PREFIX, DEFAULT_SCAN_DURATION, DROP_THRESHOLD, ENABLE_COMMAND,
    HANDSHAKE_STEP_TIMEOUT, NOTIFY_CHARACTERISTIC, SERVICE_UUID, WATCHDOG_PERIOD,
    WRITE_CHARACTERISTIC,
};
use crate::reassembler::{FrameReassembler, Reassembled};
use crate::store::{now_ms, SessionSnapshot, TelemetryStore};
use crate::timer::Schedule;
use crate::transport::{
    BleTransport, DisconnectStream, DiscoveryStream, GattSession, NotificationStream,
};
use crate::types::{
    ConnectionRecord, ConnectionState, DeviceHandle, DisconnectReason, LinkDiagnostics,
    LinkEvent, LiveMetrics,
};
use crate::watchdog::LivenessWatchdog;

// ── LinkConfig ────────────────────────────────────────────────────────────────

/// Configuration for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long a scan runs before it gives up.  Default: 10 s.
    pub scan_duration: Duration,
    /// Match devices whose advertised name starts with this string.
    /// Default: `"BioLink"`.
    pub name_prefix: String,
    /// Upper bound on each GATT handshake step.  Default: 10 s.
    pub step_timeout: Duration,
    /// Watchdog tick period.  Default: 1 s.
    pub watchdog_period: Duration,
    /// Silence after which the watchdog flags a possible drop.  Default: 3 s.
    pub drop_threshold: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            name_prefix: DEFAULT_NAME_PREFIX.into(),
            step_timeout: HANDSHAKE_STEP_TIMEOUT,
            watchdog_period: WATCHDOG_PERIOD,
            drop_threshold: DROP_THRESHOLD,
        }
    }
}

/// Parameters of one scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub name_prefix: String,
    pub duration: Duration,
}

impl From<&LinkConfig> for ScanRequest {
    fn from(config: &LinkConfig) -> Self {
        Self {
            name_prefix: config.name_prefix.clone(),
            duration: config.scan_duration,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn next_item<T>(stream: &mut Option<BoxStream<'static, T>>) -> Option<T> {
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

/// Run one handshake step under `limit`, tagging any failure with `step`.
async fn step<T>(
    step: HandshakeStep,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(LinkError::CapabilityAbsent)) => Err(LinkError::CapabilityAbsent),
        Ok(Err(e)) => Err(LinkError::handshake(step, e)),
        Err(_) => Err(LinkError::handshake(step, LinkError::Timeout(limit))),
    }
}

/// What woke [`ConnectionManager::next_event`].
enum Wake {
    Notification(Option<Vec<u8>>),
    LinkLost(Option<()>),
    Discovered(Option<DeviceHandle>),
    ScanExpired,
    WatchdogTick,
}

/// Holds the manager in `Connecting` for one attempt.  Dropped without
/// [`ConnectingGuard::finish`], it puts the state back to `Idle`, which also
/// covers a caller that drops the `connect` future mid-handshake.
struct ConnectingGuard<'a> {
    state: &'a mut ConnectionState,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn enter(state: &'a mut ConnectionState) -> Self {
        *state = ConnectionState::Connecting;
        Self { state, armed: true }
    }

    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state = ConnectionState::Idle;
        }
    }
}

/// Open a session into `slot` and negotiate the stream.
///
/// The session sits in `slot` while negotiation runs, so an abandoned attempt
/// leaves it where the manager can close it later.  A failed attempt closes
/// it here.
async fn handshake<T: BleTransport>(
    transport: &T,
    limit: Duration,
    device: &DeviceHandle,
    slot: &mut Option<Box<dyn GattSession>>,
) -> Result<(NotificationStream, DisconnectStream)> {
    let session = step(HandshakeStep::OpenSession, limit, transport.connect(device)).await?;
    let session = slot.insert(session);

    let negotiated = negotiate(&**session, limit).await;
    match negotiated {
        Ok(streams) => Ok(streams),
        Err(e) => {
            if let Some(session) = slot.take() {
                if let Err(close) = session.disconnect().await {
                    warn!("closing half-open session failed: {close}");
                }
            }
            Err(e)
        }
    }
}

/// Enable the stream and subscribe, in the order the headband expects.
async fn negotiate(
    session: &dyn GattSession,
    limit: Duration,
) -> Result<(NotificationStream, DisconnectStream)> {
    step(
        HandshakeStep::ResolveService,
        limit,
        session.resolve_service(SERVICE_UUID),
    )
    .await?;
    let write = step(
        HandshakeStep::ResolveWriteCharacteristic,
        limit,
        session.resolve_characteristic(SERVICE_UUID, WRITE_CHARACTERISTIC),
    )
    .await?;
    step(
        HandshakeStep::WriteEnable,
        limit,
        session.write_value(&write, &ENABLE_COMMAND),
    )
    .await?;
    let notify = step(
        HandshakeStep::ResolveNotifyCharacteristic,
        limit,
        session.resolve_characteristic(SERVICE_UUID, NOTIFY_CHARACTERISTIC),
    )
    .await?;
    let notifications = step(HandshakeStep::Subscribe, limit, session.subscribe(&notify)).await?;
    let link_events = step(
        HandshakeStep::WatchDisconnect,
        limit,
        session.disconnect_events(),
    )
    .await?;
    Ok((notifications, link_events))
}

// ── ConnectionManager ─────────────────────────────────────────────────────────

/// Owns the single headband connection and everything fed by it.
///
/// All state (connection state, pending half-frame, telemetry store, timers)
/// lives in this value and is only touched through `&mut self`, so one
/// operation always runs to completion before the next begins.  External
/// events are pulled with [`ConnectionManager::next_event`]; user actions are
/// the other public methods.
///
/// ```no_run
/// use biolink::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = BtleplugTransport::new().await?;
/// let mut link = ConnectionManager::new(transport, LinkConfig::default());
/// link.connect_first().await?;
/// link.start_session();
/// while let Some(ev) = link.next_event().await {
///     if let LinkEvent::Sample(s) = ev {
///         println!("focus={} relax={}", s.focus, s.relax);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<T: BleTransport> {
    config: LinkConfig,
    transport: T,
    state: ConnectionState,

    scan_timer: Schedule,
    discovery: Option<DiscoveryStream>,
    discovered: Vec<DeviceHandle>,

    device: Option<DeviceHandle>,
    session: Option<Box<dyn GattSession>>,
    notifications: Option<NotificationStream>,
    link_events: Option<DisconnectStream>,
    last_connection: Option<ConnectionRecord>,

    reassembler: FrameReassembler,
    store: TelemetryStore,
    watchdog: LivenessWatchdog,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: T, config: LinkConfig) -> Self {
        let watchdog = LivenessWatchdog::new(config.watchdog_period, config.drop_threshold);
        Self {
            config,
            transport,
            state: ConnectionState::Idle,
            scan_timer: Schedule::new(),
            discovery: None,
            discovered: Vec::new(),
            device: None,
            session: None,
            notifications: None,
            link_events: None,
            last_connection: None,
            reassembler: FrameReassembler::new(),
            store: TelemetryStore::new(),
            watchdog,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The connected device, if any.
    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// The most recent successful connection, kept after disconnect for
    /// display.
    pub fn last_connection(&self) -> Option<&ConnectionRecord> {
        self.last_connection.as_ref()
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn live(&self) -> LiveMetrics {
        self.store.live()
    }

    pub fn possible_drop(&self) -> bool {
        self.store.possible_drop()
    }

    pub fn reassembler(&self) -> &FrameReassembler {
        &self.reassembler
    }

    pub fn diagnostics(&self) -> &LinkDiagnostics {
        self.reassembler.diagnostics()
    }

    // ── Scan ──────────────────────────────────────────────────────────────────

    /// `Idle → Scanning`.  Devices are reported through
    /// [`LinkEvent::DeviceDiscovered`]; the scan ends with
    /// [`LinkEvent::ScanFinished`] when `request.duration` elapses.
    pub async fn start_scan(&mut self, request: ScanRequest) -> Result<()> {
        self.close_abandoned_session().await;
        if self.state != ConnectionState::Idle {
            return Err(LinkError::Busy(self.state));
        }
        let stream = self.transport.start_scan(&request.name_prefix).await?;
        info!(
            "scanning for '{}*' ({} ms)",
            request.name_prefix,
            request.duration.as_millis()
        );
        self.discovery = Some(stream);
        self.discovered.clear();
        self.scan_timer.arm_once(request.duration);
        self.state = ConnectionState::Scanning;
        Ok(())
    }

    /// `Scanning → Idle`.  Returns everything found so far.  No-op outside
    /// a scan.
    pub async fn stop_scan(&mut self) -> Vec<DeviceHandle> {
        if self.state != ConnectionState::Scanning {
            return Vec::new();
        }
        self.finish_scan().await
    }

    async fn finish_scan(&mut self) -> Vec<DeviceHandle> {
        if let Err(e) = self.transport.stop_scan().await {
            warn!("stop_scan failed: {e}");
        }
        self.scan_timer.cancel();
        self.discovery = None;
        self.state = ConnectionState::Idle;
        let found = std::mem::take(&mut self.discovered);
        info!("scan finished: {} device(s) found", found.len());
        found
    }

    /// Scan for the configured duration and return every matching device.
    pub async fn scan_all(&mut self) -> Result<Vec<DeviceHandle>> {
        self.start_scan(ScanRequest::from(&self.config)).await?;
        loop {
            match self.next_event().await {
                Some(LinkEvent::ScanFinished(found)) => return Ok(found),
                Some(_) => {}
                None => return Ok(Vec::new()),
            }
        }
    }

    // ── Connect ───────────────────────────────────────────────────────────────

    /// Scan until the first matching device appears, then connect to it.
    pub async fn connect_first(&mut self) -> Result<ConnectionRecord> {
        self.start_scan(ScanRequest::from(&self.config)).await?;
        loop {
            match self.next_event().await {
                Some(LinkEvent::DeviceDiscovered(device)) => return self.connect(device).await,
                Some(LinkEvent::ScanFinished(_)) | None => return Err(LinkError::NoDeviceSelected),
                Some(_) => {}
            }
        }
    }

    /// Ask the platform to pick a device, then connect to it.
    pub async fn connect_picked(&mut self) -> Result<ConnectionRecord> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Scanning => {
                self.stop_scan().await;
            }
            other => return Err(LinkError::Busy(other)),
        }
        let device = self
            .transport
            .request_device(&self.config.name_prefix, self.config.scan_duration)
            .await?;
        self.connect(device).await
    }

    /// `Idle | Scanning → Connecting → Connected`.
    ///
    /// Any scan in progress is stopped first.  On failure the manager is
    /// back in `Idle` with nothing retained from the attempt.
    pub async fn connect(&mut self, device: DeviceHandle) -> Result<ConnectionRecord> {
        self.close_abandoned_session().await;
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Scanning => {
                self.stop_scan().await;
            }
            other => return Err(LinkError::Busy(other)),
        }

        let attempt = ConnectingGuard::enter(&mut self.state);
        info!("connecting to {} ({})", device.display_name(), device.id);

        let result = handshake(
            &self.transport,
            self.config.step_timeout,
            &device,
            &mut self.session,
        )
        .await;
        let (notifications, link_events) = match result {
            Ok(streams) => streams,
            Err(e) => {
                warn!("connection to {} failed: {e}", device.display_name());
                return Err(e);
            }
        };
        attempt.finish();

        self.notifications = Some(notifications);
        self.link_events = Some(link_events);
        self.reassembler.reset();
        self.store.mark_link_up();
        self.watchdog.start();

        let record = ConnectionRecord {
            id: device.id.clone(),
            name: device.name.clone(),
            connected_at_ms: now_ms(),
        };
        self.last_connection = Some(record.clone());
        self.device = Some(device);
        self.state = ConnectionState::Connected;
        info!("connected: {}", record.name.as_deref().unwrap_or(&record.id));
        Ok(record)
    }

    /// Close a session left behind by a `connect` whose future was dropped
    /// before the handshake finished.
    async fn close_abandoned_session(&mut self) {
        if self.state == ConnectionState::Connected {
            return;
        }
        if let Some(session) = self.session.take() {
            warn!("closing session left by an abandoned connect");
            if let Err(e) = session.disconnect().await {
                warn!("closing abandoned session failed: {e}");
            }
        }
    }

    // ── Disconnect ────────────────────────────────────────────────────────────

    /// Return to `Idle` from any state.
    ///
    /// Local state is always reset; a platform error closing the link is
    /// returned afterwards.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Scanning {
            self.stop_scan().await;
        }
        let session = self.session.take();
        self.teardown(DisconnectReason::Requested);
        match session {
            Some(session) => session.disconnect().await,
            None => Ok(()),
        }
    }

    fn teardown(&mut self, reason: DisconnectReason) {
        self.link_events = None;
        self.notifications = None;
        self.session = None;
        self.reassembler.reset();
        self.store.mark_link_down();
        self.watchdog.stop();
        if let Some(device) = self.device.take() {
            info!("disconnected from {} ({reason:?})", device.display_name());
        }
        self.state = ConnectionState::Idle;
    }

    // ── Session commands ──────────────────────────────────────────────────────

    pub fn start_session(&mut self) {
        self.store.start_session();
    }

    pub fn stop_session(&mut self) -> SessionSnapshot {
        self.store.stop_session()
    }

    pub fn clear_session(&mut self) {
        self.store.clear();
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Decode one notification payload and route it to the store.
    ///
    /// Ignored unless connected.  Malformed frames are logged and counted.
    pub fn handle_notification(&mut self, data: &[u8]) -> Option<LinkEvent> {
        if self.state != ConnectionState::Connected {
            debug!("ignoring {}-byte notification while {:?}", data.len(), self.state);
            return None;
        }
        self.reassembler.note_notification();
        match self.reassembler.push(decode_frame(data))? {
            Reassembled::Partial(first) => {
                self.store
                    .update_live_metrics(first.signal_quality, first.focus, first.relax);
                Some(LinkEvent::Metrics(self.store.live()))
            }
            Reassembled::Full(sample) => {
                self.store.append_full_sample(&sample);
                Some(LinkEvent::Sample(sample))
            }
        }
    }

    /// Wait for the next external event and apply it.
    ///
    /// Returns `None` once there is nothing left to wait for (idle, not
    /// scanning).  Cancel-safe: dropping the future between events loses
    /// nothing.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        loop {
            if !self.has_event_sources() {
                return None;
            }
            let wake = tokio::select! {
                biased;
                d = next_item(&mut self.link_events) => Wake::LinkLost(d),
                n = next_item(&mut self.notifications) => Wake::Notification(n),
                hit = next_item(&mut self.discovery) => Wake::Discovered(hit),
                _ = self.scan_timer.fired() => Wake::ScanExpired,
                _ = self.watchdog.tick() => Wake::WatchdogTick,
            };
            if let Some(event) = self.apply(wake).await {
                return Some(event);
            }
        }
    }

    fn has_event_sources(&self) -> bool {
        self.notifications.is_some()
            || self.link_events.is_some()
            || self.discovery.is_some()
            || self.scan_timer.is_armed()
            || self.watchdog.is_running()
    }

    async fn apply(&mut self, wake: Wake) -> Option<LinkEvent> {
        match wake {
            Wake::Notification(Some(data)) => self.handle_notification(&data),
            Wake::Notification(None) => {
                let session = self.session.take();
                self.teardown(DisconnectReason::StreamEnded);
                if let Some(session) = session {
                    if let Err(e) = session.disconnect().await {
                        warn!("closing session after the stream ended failed: {e}");
                    }
                }
                Some(LinkEvent::Disconnected(DisconnectReason::StreamEnded))
            }
            Wake::LinkLost(Some(())) => {
                self.teardown(DisconnectReason::LinkLost);
                Some(LinkEvent::Disconnected(DisconnectReason::LinkLost))
            }
            Wake::LinkLost(None) => {
                debug!("disconnect event source closed");
                self.link_events = None;
                None
            }
            Wake::Discovered(Some(device)) => {
                if self.discovered.iter().any(|d| d.id == device.id) {
                    return None;
                }
                info!("found {} ({})", device.display_name(), device.id);
                self.discovered.push(device.clone());
                Some(LinkEvent::DeviceDiscovered(device))
            }
            Wake::Discovered(None) => {
                self.discovery = None;
                None
            }
            Wake::ScanExpired => {
                let found = self.finish_scan().await;
                Some(LinkEvent::ScanFinished(found))
            }
            Wake::WatchdogTick => self
                .watchdog
                .inspect(self.state, &mut self.store, Instant::now())
                .then_some(LinkEvent::PossibleDrop),
        }
    }
}
