//! SAE J1939 Implementation
//!
//! Decodes 29-bit identifiers, reassembles transport protocol transfers,
//! and keeps the parameter group, SPN, trouble code and vehicle
//! information tables current.

mod decoder;
mod diagnostics;
mod error;
mod id;
mod message;
mod spn;
mod transport;
mod vehicle;

pub use decoder::{J1939Decoder, J1939Record, RecordKey};
pub use diagnostics::{parse_diagnostic_message, parse_freeze_frames, LampStatus};
pub use error::{J1939Error, TransportError};
pub use id::J1939Id;
pub use message::{encode_request, J1939Message};
pub use spn::{extract_spn, SpnKey, SpnRecord, SpnValue};
pub use transport::{
    segment_broadcast, Reassembled, SessionKey, TransportConfig, TransportReassembler, TransportStats,
    MAX_TRANSPORT_BYTES,
};
pub use vehicle::{decode_time_date, ComponentIdentity, VehicleInfo};

/// Parameter group numbers
pub mod pgn {
    /// Request
    pub const REQUEST: u32 = 0xEA00;
    /// Transport protocol data transfer (TP.DT)
    pub const TP_DT: u32 = 0xEB00;
    /// Transport protocol connection management (TP.CM)
    pub const TP_CM: u32 = 0xEC00;
    /// High resolution vehicle distance
    pub const HIGH_RES_DISTANCE: u32 = 65217;
    /// Active diagnostic trouble codes
    pub const DM1: u32 = 65226;
    /// Previously active diagnostic trouble codes
    pub const DM2: u32 = 65227;
    /// Freeze frame parameters
    pub const DM4: u32 = 65229;
    /// Software identification
    pub const SOFTWARE_ID: u32 = 65242;
    /// Vehicle distance
    pub const VEHICLE_DISTANCE: u32 = 65248;
    /// Engine hours, revolutions
    pub const ENGINE_HOURS: u32 = 65253;
    /// Time/Date
    pub const TIME_DATE: u32 = 65254;
    /// Component identification
    pub const COMPONENT_ID: u32 = 65259;
    /// Vehicle identification
    pub const VEHICLE_ID: u32 = 65260;
}
