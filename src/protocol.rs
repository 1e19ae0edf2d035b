//! GATT UUIDs, frame layout constants, and timing defaults for the headband.
//!
//! The headband exposes one vendor service with two characteristics: a write
//! characteristic that accepts the enable command, and a notify
//! characteristic that streams telemetry frames.

use std::time::Duration;

use uuid::Uuid;

// ── Service ──────────────────────────────────────────────────────────────────

/// Vendor GATT service carrying the telemetry characteristics.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Host → headband command channel.
///
/// Written exactly once per connection with [`ENABLE_COMMAND`] before the
/// host subscribes to [`NOTIFY_CHARACTERISTIC`].
pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ffe3_0000_1000_8000_00805f9b34fb);

/// Headband → host telemetry stream.
///
/// Every notification is one frame, either a first or a second segment.
/// See [`crate::parse::decode_frame`].
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ffe4_0000_1000_8000_00805f9b34fb);

// ── Commands ──────────────────────────────────────────────────────────────────

/// Starts the telemetry stream (`"MG"` followed by `0x01`).
pub const ENABLE_COMMAND: [u8; 3] = [0x4D, 0x47, 0x01];

// ── Frame layout ──────────────────────────────────────────────────────────────

/// Prefix of the first segment (signal quality, focus, relax, low bands).
pub const FIRST_SEGMENT_PREFIX: [u8; 4] = [0xAA, 0x01, 0x01, 0x0F];

/// Prefix of the second segment (beta and gamma bands).
pub const SECOND_SEGMENT_PREFIX: [u8; 4] = [0xAA, 0x01, 0x02, 0x0C];

/// Length of the type prefix shared by both segments.
pub const PREFIX_LEN: usize = 4;

/// Minimum length of a first-segment frame:
///
/// | Offset | Field |
/// |---|---|
/// | 0–3 | prefix |
/// | 4 | signal quality |
/// | 5 | focus |
/// | 6 | relax |
/// | 7–9 | delta (uint24 BE, scaled) |
/// | 10–12 | theta (uint24 BE, scaled) |
/// | 13–15 | low alpha (uint24 BE) |
/// | 16–18 | high alpha (uint24 BE) |
pub const FIRST_SEGMENT_LEN: usize = 19;

/// Minimum length of a second-segment frame:
///
/// | Offset | Field |
/// |---|---|
/// | 0–3 | prefix |
/// | 4–6 | low beta |
/// | 7–9 | high beta |
/// | 10–12 | low gamma |
/// | 13–15 | high gamma |
pub const SECOND_SEGMENT_LEN: usize = 16;

// ── Timing defaults ───────────────────────────────────────────────────────────

/// Default scan bound before discovery gives up.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_millis(10_000);

/// Watchdog tick period.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Silence on the telemetry stream after which the link is flagged as a
/// possible drop.
pub const DROP_THRESHOLD: Duration = Duration::from_millis(3_000);

/// Upper bound on each individual GATT handshake step.
pub const HANDSHAKE_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Name prefix advertised by the headband.
pub const DEFAULT_NAME_PREFIX: &str = "BioLink";
