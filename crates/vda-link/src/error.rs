//! Adapter Error Types

use crate::code::ReturnCode;
use crate::Channel;
use thiserror::Error;

/// Errors raised by the vendor driver capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Client could not be opened on a channel
    #[error("Failed to open {channel} client: {reason}")]
    Open { channel: Channel, reason: String },

    /// The driver returned a non-zero status
    #[error("Driver returned {code:?} ({})", code.description())]
    Driver { code: ReturnCode },

    /// Operation on a channel that has no open client
    #[error("{0} channel is not connected")]
    NotConnected(Channel),

    /// Outbound queue for a channel is full or closed
    #[error("Outbound queue for {0} is unavailable")]
    QueueUnavailable(Channel),
}

impl From<ReturnCode> for DeviceError {
    fn from(code: ReturnCode) -> Self {
        DeviceError::Driver { code }
    }
}

/// Errors parsing an adapter receive buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer shorter than the channel's header
    #[error("{channel} buffer too short: {len} bytes, need at least {min}")]
    TooShort {
        channel: Channel,
        len: usize,
        min: usize,
    },
}
