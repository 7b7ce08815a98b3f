//! SAE J1587 Implementation
//!
//! J1708 messages carry a message identifier (MID) followed by any number
//! of parameters, each a parameter identifier (PID) and its data. PIDs 256
//! and above are sent as an escape byte 255 followed by the page two PID.

mod decoder;
mod error;
mod pid;
mod request;

pub use decoder::{parse_message, J1587Decoder, J1587Parameter, J1587Record};
pub use error::J1587Error;
pub use pid::{standard_width, ParameterWidth, PAGE_EXTENSION};
pub use request::encode_request;

/// MID used by this tool when requesting parameters
pub const DEFAULT_TOOL_MID: u8 = 0xB6;

/// Well known parameter identifiers
pub mod pids {
    /// Request parameter
    pub const REQUEST: u16 = 0;
    /// Engine speed
    pub const ENGINE_SPEED: u16 = 190;
    /// Clock
    pub const CLOCK: u16 = 251;
    /// Date
    pub const DATE: u16 = 252;
}
