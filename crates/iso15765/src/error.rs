//! ISO 15765 / UDS Error Types

use thiserror::Error;
use vda_link::DeviceError;

/// Segmented transfer failures; the reassembly in progress is discarded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsoTpError {
    #[error("Empty ISO 15765 frame")]
    Empty,

    #[error("Unknown protocol control information {0:02X}")]
    UnknownPci(u8),

    #[error("Invalid length {0}")]
    InvalidLength(usize),

    #[error("Consecutive frame without a first frame")]
    Unexpected,

    #[error("Expected sequence {expected}, got {got}")]
    OutOfSequence { expected: u8, got: u8 },
}

/// Errors returned to the caller of a UDS request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UdsError {
    /// No response before the deadline
    #[error("No response to DID {did:04X} before timeout")]
    Timeout { did: u16 },

    /// Server answered with a negative response code
    #[error("Negative response to service {service:02X}: NRC {code:02X}")]
    Negative { service: u8, code: u8 },

    /// Request could not be encoded
    #[error("Failed to encode request: {0}")]
    Encode(#[from] IsoTpError),

    /// Request could not be sent
    #[error("Failed to send request: {0}")]
    Device(#[from] DeviceError),

    /// Response tap is gone
    #[error("CAN channel not connected")]
    NotConnected,
}
