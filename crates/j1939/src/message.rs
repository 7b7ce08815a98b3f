//! J1939 Client Messages
//!
//! The adapter's J1939 client exchanges whole parameter groups in the form
//! `[pgn 3 LE][how/priority][source][destination][data...]`. The adapter
//! runs the transport protocol itself on this client.

use crate::error::J1939Error;
use crate::pgn;

const HEADER_LEN: usize = 6;
const BAM_FLAG: u8 = 0x80;

/// A parameter group as carried on the J1939 client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1939Message {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
}

impl J1939Message {
    /// Parse a receive body (adapter header already stripped)
    pub fn from_client_payload(payload: &[u8]) -> Result<Self, J1939Error> {
        if payload.len() < HEADER_LEN {
            return Err(J1939Error::Truncated(payload.len()));
        }
        Ok(Self {
            pgn: u32::from_le_bytes([payload[0], payload[1], payload[2], 0]),
            priority: payload[3] & 0x07,
            source: payload[4],
            destination: payload[5],
            data: payload[HEADER_LEN..].to_vec(),
        })
    }

    /// Encode a transmit buffer. With `bam` set, payloads over 8 bytes are
    /// broadcast by the adapter instead of using RTS/CTS.
    pub fn to_client_payload(&self, bam: bool) -> Vec<u8> {
        let mut message = Vec::with_capacity(HEADER_LEN + self.data.len());
        message.extend_from_slice(&self.pgn.to_le_bytes()[..3]);
        let how = if bam { BAM_FLAG } else { 0 };
        message.extend_from_slice(&[how | (self.priority & 0x07), self.source, self.destination]);
        message.extend_from_slice(&self.data);
        message
    }

    /// Request for `requested` from `source` to `destination`
    pub fn request(requested: u32, source: u8, destination: u8) -> Self {
        Self {
            pgn: pgn::REQUEST,
            priority: 6,
            source,
            destination,
            data: requested.to_le_bytes()[..3].to_vec(),
        }
    }
}

/// Encode a J1939 request client buffer
pub fn encode_request(requested: u32, source: u8, destination: u8) -> Vec<u8> {
    J1939Message::request(requested, source, destination).to_client_payload(false)
}
