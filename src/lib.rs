//! # biolink
//!
//! Async Rust library for the live Bluetooth Low Energy link to a
//! single-purpose biosignal headband: discovery, the GATT enable handshake,
//! reassembly of the headband's two-part telemetry frames, live metrics,
//! recording buffers, and a watchdog for links that stall without
//! disconnecting.
//!
//! ## Quick start
//!
//! ```no_run
//! use biolink::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = BtleplugTransport::new().await?;
//!     let mut link = ConnectionManager::new(transport, LinkConfig::default());
//!     link.connect_first().await?;
//!     link.start_session();
//!
//!     while let Some(event) = link.next_event().await {
//!         match event {
//!             LinkEvent::Sample(s) => println!("focus={} relax={}", s.focus, s.relax),
//!             LinkEvent::PossibleDrop => eprintln!("no data for a while…"),
//!             LinkEvent::Disconnected(_) => break,
//!             _ => {}
//!         }
//!     }
//!     let snapshot = link.stop_session();
//!     println!("{}", snapshot.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`connection`] | The connection state machine and event loop ([`connection::ConnectionManager`]) |
//! | [`parse`] | Pure byte-to-frame decoder |
//! | [`reassembler`] | Pairs first and second segments into full samples |
//! | [`store`] | Live metrics, recording session, series buffers |
//! | [`watchdog`] | Possible-drop detection |
//! | [`timer`] | Cancellable deadline shared by the scan bound and the watchdog |
//! | [`transport`] | The BLE capability traits |
//! | [`btle`] | btleplug implementation of the transport |
//! | [`mock`] | In-memory transport for tests |
//! | [`protocol`] | GATT UUIDs, frame layout, timing defaults |
//! | [`types`] | Frames, samples, events, connection state |
//! | [`error`] | Error types |

pub mod btle;
pub mod connection;
pub mod error;
pub mod mock;
pub mod parse;
pub mod protocol;
pub mod reassembler;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;
pub mod watchdog;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Connection ────────────────────────────────────────────────────────────
    pub use crate::btle::BtleplugTransport;
    pub use crate::connection::{ConnectionManager, LinkConfig, ScanRequest};
    pub use crate::error::{HandshakeStep, LinkError};
    pub use crate::transport::{BleTransport, GattSession};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::store::{Series, SeriesBuffers, SessionSnapshot};
    pub use crate::types::{
        ConnectionRecord, ConnectionState, DeviceHandle, DisconnectReason, FullSample,
        LinkDiagnostics, LinkEvent, LiveMetrics, TimePoint, WearStatus,
    };
}
