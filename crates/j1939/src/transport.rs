//! Transport Protocol Reassembly
//!
//! Multi-packet parameter groups arrive as a connection management announce
//! (TP.CM_BAM for broadcasts, TP.CM_RTS for peer-to-peer) followed by
//! TP.DT packets numbered from 1, each carrying 7 data bytes. This module
//! only listens; it never answers RTS with CTS.

use crate::error::TransportError;
use crate::id::J1939Id;
use crate::pgn;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use vda_link::GLOBAL_ADDRESS;

/// Largest transport protocol payload (255 packets of 7 bytes)
pub const MAX_TRANSPORT_BYTES: usize = 255 * 7;

const CM_RTS: u8 = 0x10;
const CM_CTS: u8 = 0x11;
const CM_END_OF_MSG_ACK: u8 = 0x13;
const CM_BAM: u8 = 0x20;
const CM_ABORT: u8 = 0xFF;

const DATA_PER_PACKET: usize = 7;

/// Identifies a transfer in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// BAM transfer to the global address
    Broadcast { source: u8 },
    /// RTS/CTS transfer between two controllers
    PeerToPeer { source: u8, destination: u8 },
}

impl SessionKey {
    fn new(source: u8, destination: u8) -> Self {
        if destination == GLOBAL_ADDRESS {
            SessionKey::Broadcast { source }
        } else {
            SessionKey::PeerToPeer {
                source,
                destination,
            }
        }
    }
}

/// Session timeouts
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Inactivity allowed for most transfers
    pub default_timeout: Duration,
    /// Inactivity allowed for PGNs in `long_pgns`
    pub long_timeout: Duration,
    /// Slow, large broadcasts such as identification and DM2
    pub long_pgns: Vec<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(100),
            long_timeout: Duration::from_secs(2),
            long_pgns: vec![
                pgn::DM2,
                pgn::SOFTWARE_ID,
                pgn::COMPONENT_ID,
                pgn::VEHICLE_ID,
            ],
        }
    }
}

impl TransportConfig {
    /// Inactivity timeout for a transported PGN
    pub fn timeout_for(&self, pgn: u32) -> Duration {
        if self.long_pgns.contains(&pgn) {
            self.long_timeout
        } else {
            self.default_timeout
        }
    }
}

/// A completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct TransportSession {
    pgn: u32,
    priority: u8,
    total_bytes: usize,
    next_sequence: u8,
    buffer: Vec<u8>,
    timeout: Duration,
    deadline: Instant,
}

/// Counters for discarded and delivered transfers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub completed: u64,
    pub aborted: u64,
    pub expired: u64,
}

/// Tracks every open transfer, at most one per [`SessionKey`]
#[derive(Debug, Default)]
pub struct TransportReassembler {
    config: TransportConfig,
    sessions: HashMap<SessionKey, TransportSession>,
    stats: TransportStats,
}

fn transported_pgn(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[5], data[6], data[7], 0])
}

impl TransportReassembler {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            stats: TransportStats::default(),
        }
    }

    /// Handle a TP.CM frame
    pub fn connection_management(&mut self, id: &J1939Id, data: &[u8], now: Instant) -> Result<(), TransportError> {
        if data.len() < 8 {
            return Err(TransportError::Truncated(data.len()));
        }
        let source = id.source_address;
        let destination = id.destination();

        match data[0] {
            CM_BAM | CM_RTS => {
                let total_bytes = u16::from_le_bytes([data[1], data[2]]) as usize;
                let packets = data[3];
                let pgn = transported_pgn(data);
                if total_bytes == 0
                    || total_bytes > MAX_TRANSPORT_BYTES
                    || (packets as usize) * DATA_PER_PACKET < total_bytes
                {
                    return Err(TransportError::InvalidAnnounce {
                        pgn,
                        total_bytes,
                        packets,
                    });
                }

                let key = if data[0] == CM_BAM {
                    SessionKey::Broadcast { source }
                } else {
                    SessionKey::PeerToPeer {
                        source,
                        destination,
                    }
                };
                let timeout = self.config.timeout_for(pgn);
                let session = TransportSession {
                    pgn,
                    priority: id.priority,
                    total_bytes,
                    next_sequence: 1,
                    buffer: Vec::with_capacity(total_bytes),
                    timeout,
                    deadline: now + timeout,
                };
                if let Some(previous) = self.sessions.insert(key, session) {
                    self.stats.aborted += 1;
                    debug!(
                        "Transport of PGN {} from {:02X} superseded by PGN {}",
                        previous.pgn, source, pgn
                    );
                }
                Ok(())
            }
            CM_ABORT => {
                let pgn = transported_pgn(data);
                // Either side of a connection may abort it
                let keys = [
                    SessionKey::PeerToPeer {
                        source,
                        destination,
                    },
                    SessionKey::PeerToPeer {
                        source: destination,
                        destination: source,
                    },
                ];
                for key in keys {
                    if self.sessions.get(&key).map_or(false, |s| s.pgn == pgn) {
                        self.sessions.remove(&key);
                        self.stats.aborted += 1;
                        return Err(TransportError::Aborted {
                            pgn,
                            reason: data[1],
                        });
                    }
                }
                Ok(())
            }
            CM_CTS | CM_END_OF_MSG_ACK => Ok(()),
            other => {
                debug!("Ignoring TP.CM control byte {:02X} from {:02X}", other, source);
                Ok(())
            }
        }
    }

    /// Handle a TP.DT frame, returning the payload once it is complete
    pub fn data_transfer(
        &mut self,
        id: &J1939Id,
        data: &[u8],
        now: Instant,
    ) -> Result<Option<Reassembled>, TransportError> {
        if data.is_empty() {
            return Err(TransportError::Truncated(0));
        }
        let key = SessionKey::new(id.source_address, id.destination());
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or(TransportError::NoSession(key))?;

        if now > session.deadline {
            let pgn = session.pgn;
            self.sessions.remove(&key);
            self.stats.expired += 1;
            return Err(TransportError::Expired { pgn });
        }

        let sequence = data[0];
        if sequence != session.next_sequence {
            let err = TransportError::OutOfSequence {
                pgn: session.pgn,
                expected: session.next_sequence,
                got: sequence,
            };
            self.sessions.remove(&key);
            self.stats.aborted += 1;
            return Err(err);
        }

        let remaining = session.total_bytes - session.buffer.len();
        let chunk = &data[1..];
        session
            .buffer
            .extend_from_slice(&chunk[..chunk.len().min(DATA_PER_PACKET).min(remaining)]);
        session.next_sequence = session.next_sequence.wrapping_add(1);
        session.deadline = now + session.timeout;

        if session.buffer.len() < session.total_bytes {
            return Ok(None);
        }

        let session = match self.sessions.remove(&key) {
            Some(session) => session,
            None => return Ok(None),
        };
        self.stats.completed += 1;
        Ok(Some(Reassembled {
            pgn: session.pgn,
            priority: session.priority,
            source: id.source_address,
            destination: id.destination(),
            data: session.buffer,
        }))
    }

    /// Destroy every session whose deadline has passed
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, session| {
            let alive = now <= session.deadline;
            if !alive {
                debug!(
                    "Transport of PGN {} for {:?} timed out after {} of {} bytes",
                    session.pgn,
                    key,
                    session.buffer.len(),
                    session.total_bytes
                );
            }
            alive
        });
        let expired = before - self.sessions.len();
        self.stats.expired += expired as u64;
        expired
    }

    /// Number of transfers in progress
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Drop every open transfer
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

/// Split an outbound broadcast into CAN frames.
///
/// Payloads up to 8 bytes go out as one frame; larger ones become a
/// TP.CM_BAM announce followed by TP.DT packets padded with 0xFF.
pub fn segment_broadcast(
    pgn: u32,
    priority: u8,
    source: u8,
    data: &[u8],
) -> Result<Vec<(J1939Id, Vec<u8>)>, TransportError> {
    if data.len() <= 8 {
        return Ok(vec![(J1939Id::new(priority, pgn, source, GLOBAL_ADDRESS), data.to_vec())]);
    }
    if data.len() > MAX_TRANSPORT_BYTES {
        return Err(TransportError::TooLarge(data.len()));
    }

    let packets = data.len().div_ceil(DATA_PER_PACKET);
    let size = (data.len() as u16).to_le_bytes();
    let group = pgn.to_le_bytes();
    let mut frames = Vec::with_capacity(packets + 1);
    frames.push((
        J1939Id::new(7, pgn::TP_CM, source, GLOBAL_ADDRESS),
        vec![CM_BAM, size[0], size[1], packets as u8, 0xFF, group[0], group[1], group[2]],
    ));

    let dt = J1939Id::new(7, pgn::TP_DT, source, GLOBAL_ADDRESS);
    for (i, chunk) in data.chunks(DATA_PER_PACKET).enumerate() {
        let mut packet = Vec::with_capacity(8);
        packet.push(i as u8 + 1);
        packet.extend_from_slice(chunk);
        packet.resize(8, 0xFF);
        frames.push((dt, packet));
    }
    Ok(frames)
}
