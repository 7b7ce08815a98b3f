//! Raw Frames and Adapter Buffer Layouts
//!
//! Receive buffers start with a 4-byte big-endian adapter timestamp and, when
//! echo mode is on, one byte flagging frames this tool transmitted itself.
//! What follows depends on the channel:
//!
//! - CAN: `[extended:1][id:4 BE | id:2 BE][data..]`
//! - J1939: `[pgn:3 LE][priority:1][source:1][destination:1][data..]`
//! - J1708: `[mid:1][data..]`

use crate::error::FrameError;
use crate::Channel;
use std::time::Instant;

const TIMESTAMP_LEN: usize = 4;

/// CAN identifier as reported by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanId {
    /// Identifier bits (11 or 29 significant bits)
    pub raw: u32,
    /// 29-bit extended frame
    pub extended: bool,
}

impl CanId {
    /// A 29-bit extended identifier
    pub fn extended(raw: u32) -> Self {
        Self {
            raw: raw & 0x1FFF_FFFF,
            extended: true,
        }
    }

    /// An 11-bit standard identifier
    pub fn standard(raw: u16) -> Self {
        Self {
            raw: (raw & 0x07FF) as u32,
            extended: false,
        }
    }
}

/// A frame read from a channel, timestamped on receipt.
///
/// Frames are immutable once built and consumed exactly once by the dispatch
/// loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Channel the frame arrived on
    pub channel: Channel,
    /// Host receive time
    pub receive_time: Instant,
    /// Adapter timestamp, when the buffer carried one
    pub vendor_timestamp: Option<u32>,
    /// Frame was transmitted by this tool and echoed back
    pub echoed: bool,
    /// CAN identifier (CAN channel only)
    pub can_id: Option<CanId>,
    /// Channel payload after the adapter header
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Build a frame from an already stripped payload (log playback, tests)
    pub fn new(channel: Channel, receive_time: Instant, payload: Vec<u8>) -> Self {
        Self {
            channel,
            receive_time,
            vendor_timestamp: None,
            echoed: false,
            can_id: None,
            payload,
        }
    }

    /// Build a CAN channel frame with a 29-bit identifier
    pub fn can(id: u32, data: &[u8], receive_time: Instant) -> Self {
        Self {
            channel: Channel::Can,
            receive_time,
            vendor_timestamp: None,
            echoed: false,
            can_id: Some(CanId::extended(id)),
            payload: data.to_vec(),
        }
    }

    /// Parse an adapter receive buffer.
    ///
    /// `echo` must match the echo mode the client was configured with since
    /// it shifts every field after the timestamp by one byte.
    pub fn from_receive_buffer(
        channel: Channel,
        buffer: &[u8],
        echo: bool,
        receive_time: Instant,
    ) -> Result<Self, FrameError> {
        let header = TIMESTAMP_LEN + usize::from(echo);
        let min = match channel {
            Channel::Can => header + 3,
            Channel::J1939 => header + 6,
            Channel::J1708 => header + 1,
        };
        if buffer.len() < min {
            return Err(FrameError::TooShort {
                channel,
                len: buffer.len(),
                min,
            });
        }

        let vendor_timestamp = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let echoed = echo && buffer[TIMESTAMP_LEN] != 0;

        let (can_id, payload) = match channel {
            Channel::Can => {
                let extended = buffer[header] != 0;
                let id_start = header + 1;
                if extended {
                    if buffer.len() < id_start + 4 {
                        return Err(FrameError::TooShort {
                            channel,
                            len: buffer.len(),
                            min: id_start + 4,
                        });
                    }
                    let raw = u32::from_be_bytes([
                        buffer[id_start],
                        buffer[id_start + 1],
                        buffer[id_start + 2],
                        buffer[id_start + 3],
                    ]);
                    (Some(CanId::extended(raw)), buffer[id_start + 4..].to_vec())
                } else {
                    let raw = u16::from_be_bytes([buffer[id_start], buffer[id_start + 1]]);
                    (Some(CanId::standard(raw)), buffer[id_start + 2..].to_vec())
                }
            }
            Channel::J1939 | Channel::J1708 => (None, buffer[header..].to_vec()),
        };

        Ok(Self {
            channel,
            receive_time,
            vendor_timestamp: Some(vendor_timestamp),
            echoed,
            can_id,
            payload,
        })
    }
}

/// Encode a CAN transmit buffer: `[extended][id BE][data]`
pub fn encode_can_message(id: CanId, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(5 + data.len());
    if id.extended {
        message.push(0x01);
        message.extend_from_slice(&id.raw.to_be_bytes());
    } else {
        message.push(0x00);
        message.extend_from_slice(&(id.raw as u16).to_be_bytes());
    }
    message.extend_from_slice(data);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_extended_can_buffer() {
        let buffer = [
            0x00, 0x00, 0x10, 0x00, // timestamp
            0x00, // echo
            0x01, // extended
            0x18, 0xFE, 0xF1, 0x00, // id
            0x11, 0x22, 0x33,
        ];
        let frame = RawFrame::from_receive_buffer(Channel::Can, &buffer, true, Instant::now()).unwrap();
        assert_eq!(frame.vendor_timestamp, Some(0x1000));
        assert!(!frame.echoed);
        assert_eq!(frame.can_id, Some(CanId::extended(0x18FEF100)));
        assert_eq!(frame.payload, vec![0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_parse_standard_can_buffer_without_echo() {
        let buffer = [0, 0, 0, 1, 0x00, 0x07, 0xE8, 0x02, 0x41];
        let frame = RawFrame::from_receive_buffer(Channel::Can, &buffer, false, Instant::now()).unwrap();
        assert_eq!(frame.can_id, Some(CanId::standard(0x7E8)));
        assert_eq!(frame.payload, vec![0x02, 0x41]);
    }

    #[test]
    fn test_parse_j1939_buffer_keeps_header_fields() {
        let buffer = [0, 0, 0, 0, 0x01, 0xF1, 0xFE, 0x00, 0x06, 0x00, 0xFF, 0xAA];
        let frame = RawFrame::from_receive_buffer(Channel::J1939, &buffer, true, Instant::now()).unwrap();
        assert!(frame.echoed);
        assert!(frame.can_id.is_none());
        assert_eq!(frame.payload, vec![0xF1, 0xFE, 0x00, 0x06, 0x00, 0xFF, 0xAA]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = RawFrame::from_receive_buffer(Channel::J1939, &[0, 0, 0, 0, 0], true, Instant::now())
            .unwrap_err();
        assert!(matches!(err, FrameError::TooShort { min: 11, .. }));
    }

    #[test]
    fn test_encode_extended_can() {
        let bytes = encode_can_message(CanId::extended(0x18DA00F9), &[0x03, 0x22]);
        assert_eq!(bytes, vec![0x01, 0x18, 0xDA, 0x00, 0xF9, 0x03, 0x22]);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_buffers_never_panic(buffer in proptest::collection::vec(any::<u8>(), 0..32), echo: bool) {
            for channel in Channel::ALL {
                if let Ok(frame) = RawFrame::from_receive_buffer(channel, &buffer, echo, Instant::now()) {
                    prop_assert!(frame.payload.len() < buffer.len());
                }
            }
        }
    }
}
