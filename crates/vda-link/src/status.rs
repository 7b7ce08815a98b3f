//! Hardware Status Decoding

use crate::Channel;

/// Status of one network link on the adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub activated: bool,
    /// Traffic seen within the last second
    pub traffic_detected: bool,
    pub bus_off: bool,
    pub clients: u8,
}

impl LinkStatus {
    fn decode(flags: u8, clients: u8) -> Self {
        Self {
            activated: flags & 0x01 != 0,
            traffic_detected: flags & 0x02 != 0,
            bus_off: flags & 0x04 != 0,
            clients,
        }
    }

    fn encode(&self) -> [u8; 2] {
        let flags = u8::from(self.activated)
            | u8::from(self.traffic_detected) << 1
            | u8::from(self.bus_off) << 2;
        [flags, self.clients]
    }
}

/// Decoded hardware status block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareStatus {
    pub device_located: bool,
    pub internal: bool,
    pub external: bool,
    pub clients: u8,
    pub j1939: LinkStatus,
    pub j1708: LinkStatus,
    pub can: LinkStatus,
    pub j1850: LinkStatus,
    pub iso15765: LinkStatus,
}

impl HardwareStatus {
    /// Length of the status block
    pub const LEN: usize = 18;

    /// Decode the status block returned by the driver
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        Some(Self {
            device_located: bytes[0] & 0x01 != 0,
            internal: bytes[0] & 0x02 != 0,
            external: bytes[0] & 0x04 != 0,
            clients: bytes[1],
            j1939: LinkStatus::decode(bytes[2], bytes[3]),
            j1708: LinkStatus::decode(bytes[4], bytes[5]),
            can: LinkStatus::decode(bytes[6], bytes[7]),
            j1850: LinkStatus::decode(bytes[8], bytes[9]),
            iso15765: LinkStatus::decode(bytes[16], bytes[17]),
        })
    }

    /// Encode back into the driver's layout
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[0] = u8::from(self.device_located)
            | u8::from(self.internal) << 1
            | u8::from(self.external) << 2;
        bytes[1] = self.clients;
        bytes[2..4].copy_from_slice(&self.j1939.encode());
        bytes[4..6].copy_from_slice(&self.j1708.encode());
        bytes[6..8].copy_from_slice(&self.can.encode());
        bytes[8..10].copy_from_slice(&self.j1850.encode());
        bytes[16..18].copy_from_slice(&self.iso15765.encode());
        bytes
    }

    /// Link status for a channel
    pub fn link(&self, channel: Channel) -> &LinkStatus {
        match channel {
            Channel::Can => &self.can,
            Channel::J1939 => &self.j1939,
            Channel::J1708 => &self.j1708,
        }
    }

    pub fn link_mut(&mut self, channel: Channel) -> &mut LinkStatus {
        match channel {
            Channel::Can => &mut self.can,
            Channel::J1939 => &mut self.j1939,
            Channel::J1708 => &mut self.j1708,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status_block() {
        let mut bytes = [0u8; 18];
        bytes[0] = 0x05;
        bytes[1] = 3;
        bytes[2] = 0x03;
        bytes[3] = 1;
        bytes[6] = 0x05;
        bytes[16] = 0x02;

        let status = HardwareStatus::decode(&bytes).unwrap();
        assert!(status.device_located);
        assert!(!status.internal);
        assert!(status.external);
        assert_eq!(status.clients, 3);
        assert!(status.j1939.activated && status.j1939.traffic_detected);
        assert_eq!(status.j1939.clients, 1);
        assert!(status.can.bus_off);
        assert!(!status.j1708.activated);
        assert!(status.iso15765.traffic_detected);
        assert_eq!(HardwareStatus::decode(&status.encode()), Some(status));
    }

    #[test]
    fn test_short_block() {
        assert!(HardwareStatus::decode(&[0u8; 10]).is_none());
    }
}
