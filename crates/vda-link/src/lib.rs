//! Vehicle Diagnostic Adapter Link
//!
//! This crate describes the boundary to an RP1210-style vehicle diagnostic
//! adapter (VDA). The vendor driver itself is an opaque capability
//! ([`FrameSource`]); this crate owns the channel model, the layout of the
//! adapter's receive and transmit buffers, and a [`SimulatedAdapter`] that
//! stands in for real hardware.

mod channel;
mod code;
mod error;
mod frame;
mod simulated;
mod source;
mod status;

pub use channel::Channel;
pub use code::ReturnCode;
pub use error::{DeviceError, FrameError};
pub use frame::{encode_can_message, CanId, RawFrame};
pub use simulated::{Responder, SimulatedAdapter};
pub use source::{ClientCommand, ClientHandle, FrameSource, SessionSettings};
pub use status::{HardwareStatus, LinkStatus};

/// Standard receive buffer size used by the acquisition threads
pub const RECEIVE_BUFFER_SIZE: usize = 2048;

/// Broadcast / global destination address
pub const GLOBAL_ADDRESS: u8 = 0xFF;

/// Default source address used by this tool when transmitting
pub const TOOL_ADDRESS: u8 = 0xF9;
