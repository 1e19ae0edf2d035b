//! Error types for the link and the frame decoder.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::ConnectionState;

/// Why a notification payload was rejected by the decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short for a type prefix ({len} bytes)")]
    TooShort { len: usize },

    #[error("unknown frame prefix {0:02X?}")]
    UnknownPrefix([u8; 4]),

    #[error("truncated frame: {actual} bytes, layout needs {expected}")]
    Truncated { expected: usize, actual: usize },
}

/// The GATT handshake steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    OpenSession,
    ResolveService,
    ResolveWriteCharacteristic,
    WriteEnable,
    ResolveNotifyCharacteristic,
    Subscribe,
    WatchDisconnect,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeStep::OpenSession => "open GATT session",
            HandshakeStep::ResolveService => "resolve service",
            HandshakeStep::ResolveWriteCharacteristic => "resolve write characteristic",
            HandshakeStep::WriteEnable => "write enable command",
            HandshakeStep::ResolveNotifyCharacteristic => "resolve notify characteristic",
            HandshakeStep::Subscribe => "subscribe to notifications",
            HandshakeStep::WatchDisconnect => "register disconnect events",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by [`crate::connection::ConnectionManager`] and the
/// transport traits.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The host has no usable Bluetooth adapter.  Not retryable.
    #[error("no Bluetooth capability available on this host")]
    CapabilityAbsent,

    /// The device picker closed without a selection, or nothing matched.
    #[error("no device selected")]
    NoDeviceSelected,

    #[error("connection handshake failed at '{step}': {source}")]
    Handshake {
        step: HandshakeStep,
        #[source]
        source: Box<LinkError>,
    },

    #[error("operation not allowed while {0:?}")]
    Busy(ConnectionState),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("service {0} not found")]
    ServiceNotFound(uuid::Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),

    /// Any other failure reported by the platform BLE stack.
    #[error("transport error: {0}")]
    Transport(String),
}

impl LinkError {
    pub(crate) fn handshake(step: HandshakeStep, source: LinkError) -> Self {
        LinkError::Handshake {
            step,
            source: Box::new(source),
        }
    }

    /// Whether the caller may reasonably try the same operation again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LinkError::CapabilityAbsent)
    }
}

pub type Result<T, E = LinkError> = std::result::Result<T, E>;
