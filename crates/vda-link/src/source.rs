//! Raw Frame Source Capability
//!
//! The vendor driver is loaded and bound elsewhere; the core only needs to
//! open a client per channel, read and send raw buffers, issue a handful of
//! client commands and query hardware status.

use crate::error::DeviceError;
use crate::status::HardwareStatus;
use crate::Channel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client identifier handed out by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(pub i16);

/// Persisted device selection used to open clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Vendor driver library name
    pub dll_name: Option<String>,
    /// Protocol the device was selected for
    pub protocol: String,
    /// Vendor device identifier
    pub device_id: u16,
    /// CAN bus speed (kbit/s) or "Auto"
    pub speed: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dll_name: None,
            protocol: "J1939".to_string(),
            device_id: 1,
            speed: "250".to_string(),
        }
    }
}

/// Client commands issued while setting up a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Echo frames transmitted by this client back into its receive queue
    EchoTransmittedMessages(bool),
    /// Open every receive filter
    SetAllFiltersToPass,
    /// Time between J1939 transport packets in milliseconds
    SetJ1939InterpacketTime(u32),
}

impl ClientCommand {
    /// Driver command number
    pub fn number(&self) -> u16 {
        match self {
            ClientCommand::SetAllFiltersToPass => 3,
            ClientCommand::EchoTransmittedMessages(_) => 16,
            ClientCommand::SetJ1939InterpacketTime(_) => 41,
        }
    }

    /// Command argument buffer
    pub fn payload(&self) -> Vec<u8> {
        match self {
            ClientCommand::SetAllFiltersToPass => Vec::new(),
            ClientCommand::EchoTransmittedMessages(on) => vec![u8::from(*on)],
            ClientCommand::SetJ1939InterpacketTime(ms) => ms.to_le_bytes().to_vec(),
        }
    }
}

/// Capability offered by a vendor diagnostic adapter.
///
/// Reads are bounded by `timeout`; a read may return after the caller has
/// lost interest in it and the caller must tolerate that. `Ok(0)` means no
/// frame was available.
pub trait FrameSource: Send + Sync {
    /// Open a client on `channel`
    fn open(&self, channel: Channel, settings: &SessionSettings) -> Result<ClientHandle, DeviceError>;

    /// Read one receive buffer into `buffer`, returning its length
    fn read(&self, handle: ClientHandle, buffer: &mut [u8], timeout: Duration) -> Result<usize, DeviceError>;

    /// Transmit one buffer
    fn send(&self, handle: ClientHandle, message: &[u8]) -> Result<(), DeviceError>;

    /// Issue a client command
    fn command(&self, handle: ClientHandle, command: ClientCommand) -> Result<(), DeviceError>;

    /// Query adapter status
    fn hardware_status(&self, handle: ClientHandle) -> Result<HardwareStatus, DeviceError>;

    /// Release the client
    fn close(&self, handle: ClientHandle);
}
