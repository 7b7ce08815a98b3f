//! ISO 15765-2 Segmentation

use crate::error::IsoTpError;

const SF_PCI: u8 = 0x00; // Single Frame
const FF_PCI: u8 = 0x10; // First Frame
const CF_PCI: u8 = 0x20; // Consecutive Frame
const FC_PCI: u8 = 0x30; // Flow Control

/// Classic CAN frame length
const FRAME_LEN: usize = 8;
/// Largest payload a first frame can announce
const MAX_LENGTH: usize = 4095;

/// A decoded ISO 15765 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsoTpFrame {
    Single(Vec<u8>),
    First { total: usize, data: Vec<u8> },
    Consecutive { sequence: u8, data: Vec<u8> },
    FlowControl { status: u8, block_size: u8, st_min: u8 },
}

/// Decode the protocol control information of a CAN payload
pub fn parse_frame(data: &[u8]) -> Result<IsoTpFrame, IsoTpError> {
    let pci = *data.first().ok_or(IsoTpError::Empty)?;
    match pci & 0xF0 {
        SF_PCI => {
            let len = (pci & 0x0F) as usize;
            if len == 0 || len > data.len() - 1 {
                return Err(IsoTpError::InvalidLength(len));
            }
            Ok(IsoTpFrame::Single(data[1..=len].to_vec()))
        }
        FF_PCI => {
            if data.len() < 2 {
                return Err(IsoTpError::InvalidLength(data.len()));
            }
            let total = ((pci & 0x0F) as usize) << 8 | data[1] as usize;
            if total < FRAME_LEN {
                return Err(IsoTpError::InvalidLength(total));
            }
            Ok(IsoTpFrame::First {
                total,
                data: data[2..].to_vec(),
            })
        }
        CF_PCI => Ok(IsoTpFrame::Consecutive {
            sequence: pci & 0x0F,
            data: data[1..].to_vec(),
        }),
        FC_PCI => Ok(IsoTpFrame::FlowControl {
            status: pci & 0x0F,
            block_size: data.get(1).copied().unwrap_or(0),
            st_min: data.get(2).copied().unwrap_or(0),
        }),
        _ => Err(IsoTpError::UnknownPci(pci)),
    }
}

/// Encode a single frame padded to 8 bytes. Payloads longer than 7 bytes
/// need [`segment`].
pub fn single_frame(payload: &[u8], padding: u8) -> Result<Vec<u8>, IsoTpError> {
    if payload.is_empty() || payload.len() > FRAME_LEN - 1 {
        return Err(IsoTpError::InvalidLength(payload.len()));
    }
    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.push(SF_PCI | payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.resize(FRAME_LEN, padding);
    Ok(frame)
}

/// Split a payload of 8..=4095 bytes into its first frame and the
/// consecutive frames sent once the receiver answers with flow control
pub fn segment(payload: &[u8], padding: u8) -> Result<(Vec<u8>, Vec<Vec<u8>>), IsoTpError> {
    if payload.len() < FRAME_LEN || payload.len() > MAX_LENGTH {
        return Err(IsoTpError::InvalidLength(payload.len()));
    }
    let (head, rest) = payload.split_at(FRAME_LEN - 2);
    let mut first = vec![FF_PCI | (payload.len() >> 8) as u8, payload.len() as u8];
    first.extend_from_slice(head);

    let consecutive = rest
        .chunks(FRAME_LEN - 1)
        .enumerate()
        .map(|(i, chunk)| {
            let mut frame = vec![CF_PCI | ((i + 1) & 0x0F) as u8];
            frame.extend_from_slice(chunk);
            frame.resize(FRAME_LEN, padding);
            frame
        })
        .collect();
    Ok((first, consecutive))
}

/// Flow control "continue to send" with no block size limit and no
/// separation time
pub fn flow_control(padding: u8) -> Vec<u8> {
    let mut frame = vec![FC_PCI, 0x00, 0x00];
    frame.resize(FRAME_LEN, padding);
    frame
}

/// Outcome of feeding one frame to the reassembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// A whole message is available
    Complete(Vec<u8>),
    /// First frame accepted; the sender waits for flow control
    SendFlowControl,
    /// More consecutive frames are needed
    InProgress,
    /// Flow control frames are ignored on receive
    Ignored,
}

/// Receive side of one segmented transfer
#[derive(Debug, Default)]
pub struct IsoTpReassembler {
    total: usize,
    next_sequence: u8,
    buffer: Vec<u8>,
    active: bool,
}

impl IsoTpReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        self.active = false;
        self.total = 0;
        self.buffer.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed a CAN payload. Any error discards the partial message.
    pub fn feed(&mut self, data: &[u8]) -> Result<Reassembly, IsoTpError> {
        let frame = match parse_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        match frame {
            IsoTpFrame::Single(payload) => {
                self.reset();
                Ok(Reassembly::Complete(payload))
            }
            IsoTpFrame::First { total, data } => {
                if total > MAX_LENGTH {
                    self.reset();
                    return Err(IsoTpError::InvalidLength(total));
                }
                self.active = true;
                self.total = total;
                self.next_sequence = 1;
                self.buffer.clear();
                self.buffer.extend_from_slice(&data[..data.len().min(total)]);
                Ok(Reassembly::SendFlowControl)
            }
            IsoTpFrame::Consecutive { sequence, data } => {
                if !self.active {
                    return Err(IsoTpError::Unexpected);
                }
                if sequence != self.next_sequence {
                    let expected = self.next_sequence;
                    self.reset();
                    return Err(IsoTpError::OutOfSequence {
                        expected,
                        got: sequence,
                    });
                }
                let remaining = self.total - self.buffer.len();
                self.buffer.extend_from_slice(&data[..data.len().min(remaining)]);
                self.next_sequence = (self.next_sequence + 1) & 0x0F;

                if self.buffer.len() < self.total {
                    return Ok(Reassembly::InProgress);
                }
                self.active = false;
                Ok(Reassembly::Complete(std::mem::take(&mut self.buffer)))
            }
            IsoTpFrame::FlowControl { .. } => Ok(Reassembly::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_encoding() {
        assert_eq!(
            single_frame(&[0x22, 0xF1, 0x90], 0x00).unwrap(),
            vec![0x03, 0x22, 0xF1, 0x90, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(single_frame(&[0; 8], 0x00), Err(IsoTpError::InvalidLength(8)));
        assert_eq!(single_frame(&[], 0x00), Err(IsoTpError::InvalidLength(0)));
    }

    #[test]
    fn test_segmented_payload_reassembles() {
        let payload: Vec<u8> = (0..20).collect();
        let (first, consecutive) = segment(&payload, 0xCC).unwrap();
        assert_eq!(&first[..2], &[0x10, 20]);
        assert_eq!(consecutive.len(), 2);
        assert_eq!(consecutive[1], vec![0x22, 13, 14, 15, 16, 17, 18, 19]);

        let mut rx = IsoTpReassembler::new();
        assert_eq!(rx.feed(&first), Ok(Reassembly::SendFlowControl));
        assert_eq!(rx.feed(&consecutive[0]), Ok(Reassembly::InProgress));
        assert_eq!(rx.feed(&consecutive[1]), Ok(Reassembly::Complete(payload)));

        assert_eq!(segment(&[0; 7], 0x00), Err(IsoTpError::InvalidLength(7)));
    }

    #[test]
    fn test_flow_control_encoding() {
        assert_eq!(flow_control(0xAA), vec![0x30, 0x00, 0x00, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn test_multi_frame_reassembly() {
        let mut rx = IsoTpReassembler::new();
        // 20 byte VIN response
        assert_eq!(
            rx.feed(&[0x10, 20, 0x62, 0xF1, 0x90, b'1', b'X', b'K']).unwrap(),
            Reassembly::SendFlowControl
        );
        assert_eq!(
            rx.feed(&[0x21, b'W', b'D', b'4', b'9', b'X', b'0', b'J']).unwrap(),
            Reassembly::InProgress
        );
        let done = rx.feed(&[0x22, b'J', b'1', b'2', b'3', b'4', b'5', b'6']).unwrap();
        assert_eq!(done, Reassembly::Complete(b"\x62\xF1\x901XKWD49X0JJ123456".to_vec()));
        assert!(!rx.is_active());
    }

    #[test]
    fn test_sequence_wraps_after_fifteen() {
        let mut rx = IsoTpReassembler::new();
        let total = 6 + 7 * 16;
        rx.feed(&[0x10 | (total >> 8) as u8, total as u8, 0, 0, 0, 0, 0, 0]).unwrap();
        for n in 1..=16u8 {
            let result = rx.feed(&[0x20 | (n & 0x0F), n, n, n, n, n, n, n]).unwrap();
            if n < 16 {
                assert_eq!(result, Reassembly::InProgress);
            } else {
                assert!(matches!(result, Reassembly::Complete(ref data) if data.len() == total as usize));
            }
        }
    }

    #[test]
    fn test_gap_discards_message() {
        let mut rx = IsoTpReassembler::new();
        rx.feed(&[0x10, 20, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            rx.feed(&[0x22, 0, 0, 0, 0, 0, 0, 0]),
            Err(IsoTpError::OutOfSequence { expected: 1, got: 2 })
        );
        assert!(!rx.is_active());
        assert_eq!(rx.feed(&[0x21, 0, 0, 0, 0, 0, 0, 0]), Err(IsoTpError::Unexpected));
    }

    #[test]
    fn test_invalid_single_frame_length() {
        assert_eq!(parse_frame(&[0x07, 1, 2]), Err(IsoTpError::InvalidLength(7)));
        assert_eq!(parse_frame(&[]), Err(IsoTpError::Empty));
    }
}
