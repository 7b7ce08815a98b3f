//! ISO 15765 / UDS
//!
//! Diagnostic requests are carried on the J1939 CAN network using 29-bit
//! normal fixed addressing (PGN 0xDA00). The driver issues one
//! read-data-by-identifier request at a time and waits for the correlated
//! response on a tap of the CAN queue.

mod error;
mod isotp;
mod uds;

pub use error::{IsoTpError, UdsError};
pub use isotp::{flow_control, parse_frame, segment, single_frame, IsoTpFrame, IsoTpReassembler, Reassembly};
pub use uds::{
    is_diagnostic_frame, request_id, response_id, CanSender, ExchangeState, UdsConfig, UdsDriver,
    IDENTIFICATION_DIDS,
};

/// UDS service identifiers
pub mod service {
    /// ReadDataByIdentifier
    pub const READ_DATA_BY_ID: u8 = 0x22;
    /// Negative response
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
    /// Offset added to the service id in a positive response
    pub const POSITIVE_OFFSET: u8 = 0x40;
}

/// Negative response codes
pub mod nrc {
    /// Request correctly received, response pending
    pub const RESPONSE_PENDING: u8 = 0x78;
}
