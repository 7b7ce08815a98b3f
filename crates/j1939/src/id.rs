//! 29-bit Identifier Fields

use vda_link::GLOBAL_ADDRESS;

/// Fields of a J1939 CAN identifier.
///
/// Always derived from the frame's 29-bit identifier, never stored on its
/// own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct J1939Id {
    pub priority: u8,
    pub extended_data_page: bool,
    pub data_page: bool,
    pub pdu_format: u8,
    pub pdu_specific: u8,
    pub source_address: u8,
}

impl J1939Id {
    /// Split a 29-bit CAN identifier
    pub fn from_can_id(raw: u32) -> Self {
        Self {
            priority: ((raw >> 26) & 0x07) as u8,
            extended_data_page: (raw >> 25) & 0x01 != 0,
            data_page: (raw >> 24) & 0x01 != 0,
            pdu_format: (raw >> 16) as u8,
            pdu_specific: (raw >> 8) as u8,
            source_address: raw as u8,
        }
    }

    /// Build an identifier for `pgn`. For PDU1 groups `destination` fills
    /// the PDU specific byte; PDU2 groups carry their group extension there.
    pub fn new(priority: u8, pgn: u32, source: u8, destination: u8) -> Self {
        let pdu_format = (pgn >> 8) as u8;
        let pdu_specific = if pdu_format < 0xF0 {
            destination
        } else {
            pgn as u8
        };
        Self {
            priority: priority & 0x07,
            extended_data_page: (pgn >> 17) & 0x01 != 0,
            data_page: (pgn >> 16) & 0x01 != 0,
            pdu_format,
            pdu_specific,
            source_address: source,
        }
    }

    /// Reassemble the 29-bit identifier
    pub fn to_can_id(&self) -> u32 {
        (self.priority as u32) << 26
            | (self.extended_data_page as u32) << 25
            | (self.data_page as u32) << 24
            | (self.pdu_format as u32) << 16
            | (self.pdu_specific as u32) << 8
            | self.source_address as u32
    }

    /// Peer-to-peer (PDU1) format
    pub fn is_pdu1(&self) -> bool {
        self.pdu_format < 0xF0
    }

    /// Parameter group number; the PDU specific byte is dropped for PDU1
    pub fn pgn(&self) -> u32 {
        let base = (self.extended_data_page as u32) << 17
            | (self.data_page as u32) << 16
            | (self.pdu_format as u32) << 8;
        if self.is_pdu1() {
            base
        } else {
            base | self.pdu_specific as u32
        }
    }

    /// Destination address; global for PDU2
    pub fn destination(&self) -> u8 {
        if self.is_pdu1() {
            self.pdu_specific
        } else {
            GLOBAL_ADDRESS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pdu2_broadcast() {
        // EEC1 from the engine
        let id = J1939Id::from_can_id(0x0CF00400);
        assert_eq!(id.priority, 3);
        assert_eq!(id.pgn(), 61444);
        assert_eq!(id.source_address, 0x00);
        assert_eq!(id.destination(), 0xFF);
    }

    #[test]
    fn test_pdu1_destination_from_pdu_specific() {
        // Request from the tool (0xF9) to the engine (0x00)
        let id = J1939Id::from_can_id(0x18EA00F9);
        assert_eq!(id.priority, 6);
        assert!(id.is_pdu1());
        assert_eq!(id.pgn(), 0xEA00);
        assert_eq!(id.destination(), 0x00);
        assert_eq!(id.source_address, 0xF9);
    }

    #[test]
    fn test_data_page_bits() {
        let id = J1939Id::from_can_id(0x19FECA00);
        assert!(id.data_page);
        assert!(!id.extended_data_page);
        assert_eq!(id.pgn(), 0x1FECA);
    }

    #[test]
    fn test_builder_matches_parser() {
        let id = J1939Id::new(6, 0xEA00, 0xF9, 0x00);
        assert_eq!(id.to_can_id(), 0x18EA00F9);
        let id = J1939Id::new(7, 0xFEEC, 0x00, 0x12);
        assert_eq!(id.destination(), 0xFF);
        assert_eq!(id.to_can_id(), 0x1CFEEC00);
    }

    proptest! {
        #[test]
        fn prop_identifier_derivation_is_deterministic(raw in 0u32..0x2000_0000) {
            let first = J1939Id::from_can_id(raw);
            let second = J1939Id::from_can_id(raw);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.pgn(), second.pgn());
            prop_assert_eq!(first.to_can_id(), raw);
        }
    }
}
