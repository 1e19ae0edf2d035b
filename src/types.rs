use serde::Serialize;

use crate::error::FrameError;

/// The first half of a telemetry reading.
///
/// Carries the headband's own derived metrics (focus and relax, both 0–100)
/// together with the four lower band powers.  Published to the live metrics
/// as soon as it arrives, without waiting for its [`SecondSegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirstSegment {
    /// Electrode contact indicator.  `0` means good contact; anything else
    /// means the headband is off the head or poorly seated.
    pub signal_quality: u8,
    pub focus: u8,
    pub relax: u8,
    /// `round(raw / 50 × 3)` of the 24-bit delta power.
    pub delta: u32,
    /// `round(raw / 3)` of the 24-bit theta power.
    pub theta: u32,
    pub low_alpha: u32,
    pub high_alpha: u32,
}

/// The second half of a telemetry reading: beta and gamma band powers,
/// unscaled 24-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecondSegment {
    pub low_beta: u32,
    pub high_beta: u32,
    pub low_gamma: u32,
    pub high_gamma: u32,
}

/// Result of decoding one notification payload.
///
/// Produced by [`crate::parse::decode_frame`].  The variant alone tells the
/// reassembler which half of a reading it is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    FirstSegment(FirstSegment),
    SecondSegment(SecondSegment),
    /// The payload did not match either layout.  Carries the reason for
    /// diagnostics; never stops the stream.
    Invalid(FrameError),
}

/// A complete reading: one [`FirstSegment`] merged with the
/// [`SecondSegment`] that followed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FullSample {
    pub signal_quality: u8,
    pub focus: u8,
    pub relax: u8,
    pub delta: u32,
    pub theta: u32,
    pub low_alpha: u32,
    pub high_alpha: u32,
    pub low_beta: u32,
    pub high_beta: u32,
    pub low_gamma: u32,
    pub high_gamma: u32,
}

impl FullSample {
    pub fn merge(first: FirstSegment, second: SecondSegment) -> Self {
        Self {
            signal_quality: first.signal_quality,
            focus: first.focus,
            relax: first.relax,
            delta: first.delta,
            theta: first.theta,
            low_alpha: first.low_alpha,
            high_alpha: first.high_alpha,
            low_beta: second.low_beta,
            high_beta: second.high_beta,
            low_gamma: second.low_gamma,
            high_gamma: second.high_gamma,
        }
    }
}

/// One recorded point on the focus/relax timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimePoint {
    /// Wall-clock milliseconds since Unix epoch at which the sample was stored.
    pub timestamp_ms: f64,
    pub focus: u8,
    pub relax: u8,
}

/// Whether the headband appears to be worn, derived from the signal-quality
/// byte of the most recent first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WearStatus {
    /// No frame has arrived yet.
    #[default]
    Unknown,
    Worn,
    NotWorn,
}

impl WearStatus {
    pub fn from_signal_quality(signal_quality: u8) -> Self {
        if signal_quality == 0 {
            WearStatus::Worn
        } else {
            WearStatus::NotWorn
        }
    }
}

/// The metrics a display shows between full samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LiveMetrics {
    pub signal_quality: u8,
    pub focus: u8,
    pub relax: u8,
    pub wear: WearStatus,
}

/// Lifecycle of the single headband connection.
///
/// ```text
/// Idle ──scan──▶ Scanning ──expiry/stop──▶ Idle
///   │               │
///   └──connect──────┴──▶ Connecting ──ok──▶ Connected ──disconnect──▶ Idle
///                            └──────failure──────▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
}

/// A headband discovered by a scan or chosen through the platform picker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle {
    /// Platform BLE identifier.
    /// • macOS / Windows — a UUID string
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    /// Advertised local name, when the platform reported one.
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// The name if advertised, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// In-memory record of the most recent successful connection, kept for
/// display.  Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub name: Option<String>,
    /// Wall-clock milliseconds since Unix epoch.
    pub connected_at_ms: f64,
}

/// Why the link went back to [`ConnectionState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for it.
    Requested,
    /// The platform reported the link gone (out of range, powered off).
    LinkLost,
    /// The notification stream closed without a disconnect event.
    StreamEnded,
}

/// Events produced by [`crate::connection::ConnectionManager::next_event`].
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A new headband matching the scan prefix was seen.
    DeviceDiscovered(DeviceHandle),
    /// The scan bound elapsed.  Carries every device seen during the scan;
    /// the manager keeps no copy.
    ScanFinished(Vec<DeviceHandle>),
    /// A first segment updated the live metrics.
    Metrics(LiveMetrics),
    /// A first/second segment pair was merged.
    Sample(FullSample),
    /// The watchdog saw no telemetry for longer than the drop threshold.
    /// Advisory; the link is still considered connected.
    PossibleDrop,
    /// The link returned to idle.
    Disconnected(DisconnectReason),
}

/// Running counters for the notification path.  Malformed and unpaired
/// frames never surface as errors; they show up here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkDiagnostics {
    pub notifications: u64,
    pub first_segments: u64,
    pub second_segments: u64,
    pub invalid_frames: u64,
    /// Second segments dropped because no first segment was pending.
    pub orphan_second_segments: u64,
    /// Pending first segments replaced before their second segment arrived.
    pub overwritten_first_segments: u64,
    pub full_samples: u64,
}
