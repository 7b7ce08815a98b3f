//! Diagnostic Messages (DM1, DM2, DM4)

use vehicle_state::{DtcKey, DtcUpdate};

const DTC_LEN: usize = 4;

/// Two-bit lamp states from the first byte of DM1/DM2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LampStatus {
    pub malfunction_indicator: u8,
    pub red_stop: u8,
    pub amber_warning: u8,
    pub protect: u8,
}

impl LampStatus {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            malfunction_indicator: (byte >> 6) & 0x03,
            red_stop: (byte >> 4) & 0x03,
            amber_warning: (byte >> 2) & 0x03,
            protect: byte & 0x03,
        }
    }

    /// Any lamp on (state 01)
    pub fn any_on(&self) -> bool {
        [self.malfunction_indicator, self.red_stop, self.amber_warning, self.protect]
            .iter()
            .any(|&state| state == 0x01)
    }
}

/// Decode one 4-byte trouble code. SPN 0 and all-ones padding yield `None`.
fn decode_dtc(source: u8, bytes: &[u8]) -> Option<DtcUpdate> {
    if bytes.len() < DTC_LEN || bytes[..DTC_LEN].iter().all(|&b| b == 0xFF) {
        return None;
    }
    let spn = bytes[0] as u32 | (bytes[1] as u32) << 8 | ((bytes[2] & 0xE0) as u32) << 11;
    if spn == 0 {
        return None;
    }
    Some(DtcUpdate {
        key: DtcKey {
            spn,
            fmi: bytes[2] & 0x1F,
        },
        source,
        occurrence_count: bytes[3] & 0x7F,
        conversion_method: bytes[3] & 0x80 != 0,
        snapshot: Vec::new(),
    })
}

/// Decode a DM1 or DM2 payload: two lamp bytes followed by 4-byte codes
pub fn parse_diagnostic_message(source: u8, data: &[u8]) -> (LampStatus, Vec<DtcUpdate>) {
    let lamps = data.first().copied().map(LampStatus::from_byte).unwrap_or_default();
    let codes = data
        .get(2..)
        .unwrap_or_default()
        .chunks_exact(DTC_LEN)
        .filter_map(|chunk| decode_dtc(source, chunk))
        .collect();
    (lamps, codes)
}

/// Decode a DM4 payload: repeated `[length][dtc:4][length - 4 snapshot bytes]`.
/// Decoding stops at the first record that overruns the payload.
pub fn parse_freeze_frames(source: u8, data: &[u8]) -> Vec<DtcUpdate> {
    let mut updates = Vec::new();
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if len < DTC_LEN || tail.len() < len {
            break;
        }
        if let Some(mut update) = decode_dtc(source, &tail[..DTC_LEN]) {
            update.snapshot = tail[DTC_LEN..len].to_vec();
            updates.push(update);
        }
        rest = &tail[len..];
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dm1_single_code() {
        // SPN 100 FMI 1, occurrence 3, amber lamp on
        let data = [0x04, 0xFF, 0x64, 0x00, 0x01, 0x03, 0xFF, 0xFF];
        let (lamps, codes) = parse_diagnostic_message(0x00, &data);
        assert_eq!(lamps.amber_warning, 1);
        assert!(lamps.any_on());
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].key, DtcKey { spn: 100, fmi: 1 });
        assert_eq!(codes[0].occurrence_count, 3);
        assert!(!codes[0].conversion_method);
    }

    #[test]
    fn test_high_spn_bits() {
        // SPN 0x7FFFE: high bits come from the top of byte 2
        let data = [0x00, 0xFF, 0xFE, 0xFF, 0xE5, 0x81];
        let (_, codes) = parse_diagnostic_message(0x03, &data);
        assert_eq!(codes[0].key, DtcKey { spn: 0x7FFFE, fmi: 5 });
        assert!(codes[0].conversion_method);
        assert_eq!(codes[0].occurrence_count, 1);
        assert_eq!(codes[0].source, 0x03);
    }

    #[test]
    fn test_no_active_codes() {
        let data = [0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF];
        let (lamps, codes) = parse_diagnostic_message(0x00, &data);
        assert!(!lamps.any_on());
        assert!(codes.is_empty());
    }

    #[test]
    fn test_multiple_codes_over_transport() {
        let data = [
            0x40, 0xFF, 0x64, 0x00, 0x01, 0x01, 0x6E, 0x00, 0x00, 0x02, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        let (lamps, codes) = parse_diagnostic_message(0x00, &data);
        assert_eq!(lamps.malfunction_indicator, 1);
        let keys: Vec<_> = codes.iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![DtcKey { spn: 100, fmi: 1 }, DtcKey { spn: 110, fmi: 0 }]);
    }

    #[test]
    fn test_freeze_frames() {
        let data = [
            0x06, 0x64, 0x00, 0x01, 0x01, 0xAA, 0xBB, // SPN 100 with 2 snapshot bytes
            0x04, 0x6E, 0x00, 0x00, 0x02, // SPN 110, no snapshot
            0x09, 0x01, // overruns
        ];
        let frames = parse_freeze_frames(0x00, &data);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].snapshot, vec![0xAA, 0xBB]);
        assert_eq!(frames[1].key.spn, 110);
        assert!(frames[1].snapshot.is_empty());
    }
}
