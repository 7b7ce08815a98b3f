//! J1939 Error Types

use crate::transport::SessionKey;
use thiserror::Error;

/// Transport protocol failures. The affected session is always destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection management or data frame shorter than 8 bytes
    #[error("Transport frame too short: {0} bytes")]
    Truncated(usize),

    /// Announce declared sizes that cannot be transferred
    #[error("Invalid announce for PGN {pgn}: {total_bytes} bytes in {packets} packets")]
    InvalidAnnounce {
        pgn: u32,
        total_bytes: usize,
        packets: u8,
    },

    /// Data transfer with no open session
    #[error("No transport session for {0:?}")]
    NoSession(SessionKey),

    /// Session deadline passed before the next packet
    #[error("Transport session for PGN {pgn} expired")]
    Expired { pgn: u32 },

    /// Sequence number gap or reorder
    #[error("PGN {pgn}: expected sequence {expected}, got {got}")]
    OutOfSequence { pgn: u32, expected: u8, got: u8 },

    /// Sender or receiver aborted the connection
    #[error("Transport of PGN {pgn} aborted (reason {reason})")]
    Aborted { pgn: u32, reason: u8 },

    /// Outbound payload exceeds the transport protocol limit
    #[error("Payload of {0} bytes exceeds transport protocol limit")]
    TooLarge(usize),
}

/// Errors decoding a J1939 frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum J1939Error {
    /// CAN channel frame without an identifier
    #[error("Frame carries no CAN identifier")]
    MissingIdentifier,

    /// 11-bit identifiers are not J1939
    #[error("Standard 11-bit identifier {0:03X} is not J1939")]
    NotExtended(u32),

    /// J1939 client payload shorter than its header
    #[error("J1939 message too short: {0} bytes")]
    Truncated(usize),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
