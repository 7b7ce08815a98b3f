//! Network Channel Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vehicle network channels a VDA client can be opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Raw CAN (29-bit identifiers carried in the receive buffer)
    Can,
    /// J1939 client; the adapter delivers parameter groups
    J1939,
    /// J1708 serial network carrying J1587
    J1708,
}

impl Channel {
    /// Every channel, in slot order
    pub const ALL: [Channel; 3] = [Channel::Can, Channel::J1939, Channel::J1708];

    /// Slot index used by fixed-size registries
    pub fn index(&self) -> usize {
        match self {
            Channel::Can => 0,
            Channel::J1939 => 1,
            Channel::J1708 => 2,
        }
    }

    /// Protocol name as understood by the vendor driver
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Channel::Can => "CAN",
            Channel::J1939 => "J1939",
            Channel::J1708 => "J1708",
        }
    }

    /// Build the connect string passed to the driver's client-connect call.
    ///
    /// CAN based channels carry the bus speed (`J1939:Baud=500`); J1708
    /// always auto-bauds.
    pub fn connect_string(&self, speed: &str) -> String {
        match self {
            Channel::J1708 => self.protocol_name().to_string(),
            _ if speed.is_empty() => self.protocol_name().to_string(),
            _ => format!("{}:Baud={}", self.protocol_name(), speed),
        }
    }

    /// Whether frames on this channel carry a CAN identifier
    pub fn is_can(&self) -> bool {
        matches!(self, Channel::Can)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_indices_are_dense() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }

    #[test]
    fn test_connect_string() {
        assert_eq!(Channel::J1939.connect_string("500"), "J1939:Baud=500");
        assert_eq!(Channel::Can.connect_string(""), "CAN");
        assert_eq!(Channel::J1708.connect_string("500"), "J1708");
    }
}
