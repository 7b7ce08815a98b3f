//! Outbound Requests
//!
//! Fire-and-forget transmissions. Responses come back as ordinary frames
//! through the dispatch loop.

use crate::error::DispatchError;
use crate::registry::ChannelRegistry;
use j1939::{encode_request, segment_broadcast, J1939Id, J1939Message};
use tracing::debug;
use vda_link::{encode_can_message, CanId, Channel, GLOBAL_ADDRESS};

impl ChannelRegistry {
    /// Request a parameter group, preferring the J1939 client over raw CAN
    pub fn send_j1939_request(&self, pgn: u32, destination: u8, source: u8) -> Result<(), DispatchError> {
        if self.is_connected(Channel::J1939) {
            self.send(Channel::J1939, encode_request(pgn, source, destination))?;
        } else if self.is_connected(Channel::Can) {
            let request = J1939Message::request(pgn, source, destination);
            let id = J1939Id::new(request.priority, request.pgn, source, destination);
            self.send_can_message(CanId::extended(id.to_can_id()), &request.data)?;
        } else {
            return Err(DispatchError::NoRoute("J1939 request"));
        }
        debug!("Requested PGN {} from {:02X}", pgn, destination);
        Ok(())
    }

    /// Request a J1587 parameter from every MID
    pub fn send_j1587_request(&self, pid: u16, tool: u8) -> Result<(), DispatchError> {
        let request = j1587::encode_request(pid, tool)?;
        self.send(Channel::J1708, request)?;
        Ok(())
    }

    /// Transmit one raw CAN frame
    pub fn send_can_message(&self, id: CanId, data: &[u8]) -> Result<(), DispatchError> {
        self.send(Channel::Can, encode_can_message(id, data))?;
        Ok(())
    }

    /// Transmit a parameter group.
    ///
    /// The J1939 client runs the transport protocol itself. On raw CAN,
    /// broadcasts over 8 bytes are split into a BAM sequence; peer-to-peer
    /// transfers of that size are refused.
    pub fn send_j1939_message(&self, message: &J1939Message) -> Result<(), DispatchError> {
        let broadcast = message.destination == GLOBAL_ADDRESS;
        if self.is_connected(Channel::J1939) {
            let bam = broadcast && message.data.len() > 8;
            self.send(Channel::J1939, message.to_client_payload(bam))?;
            return Ok(());
        }
        if !self.is_connected(Channel::Can) {
            return Err(DispatchError::NoRoute("J1939 message"));
        }

        if message.data.len() <= 8 {
            let id = J1939Id::new(message.priority, message.pgn, message.source, message.destination);
            return self.send_can_message(CanId::extended(id.to_can_id()), &message.data);
        }
        if !broadcast {
            return Err(DispatchError::PeerToPeerTooLarge {
                destination: message.destination,
                len: message.data.len(),
            });
        }
        let frames = segment_broadcast(message.pgn, message.priority, message.source, &message.data)?
            .into_iter()
            .map(|(id, data)| encode_can_message(CanId::extended(id.to_can_id()), &data))
            .collect();
        // the announce and its packets are queued together or not at all
        self.send_batch(Channel::Can, frames)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use vda_link::{SessionSettings, SimulatedAdapter, TOOL_ADDRESS};

    fn connected(adapter: &Arc<SimulatedAdapter>, channels: &[Channel]) -> ChannelRegistry {
        let config = DispatchConfig {
            read_timeout_ms: 5,
            ..DispatchConfig::default()
        };
        let mut registry = ChannelRegistry::new(adapter.clone(), SessionSettings::default(), config);
        for channel in channels {
            registry.connect(*channel).unwrap();
        }
        registry
    }

    fn wait_for_sent(adapter: &SimulatedAdapter, channel: Channel, count: usize) -> Vec<Vec<u8>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let sent = adapter.sent(channel);
            if sent.len() >= count || Instant::now() > deadline {
                return sent;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_j1939_request_on_client() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::J1939]);
        registry.send_j1939_request(65254, GLOBAL_ADDRESS, TOOL_ADDRESS).unwrap();
        assert_eq!(
            wait_for_sent(&adapter, Channel::J1939, 1),
            vec![vec![0x00, 0xEA, 0x00, 0x06, 0xF9, 0xFF, 0xE6, 0xFE, 0x00]]
        );
    }

    #[test]
    fn test_j1939_request_falls_back_to_can() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::Can]);
        registry.send_j1939_request(65259, 0x00, TOOL_ADDRESS).unwrap();
        assert_eq!(
            wait_for_sent(&adapter, Channel::Can, 1),
            vec![vec![0x01, 0x18, 0xEA, 0x00, 0xF9, 0xEB, 0xFE, 0x00]]
        );
    }

    #[test]
    fn test_no_route() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::J1708]);
        assert!(matches!(
            registry.send_j1939_request(65254, GLOBAL_ADDRESS, TOOL_ADDRESS),
            Err(DispatchError::NoRoute(_))
        ));
    }

    #[test]
    fn test_j1587_request() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::J1708]);
        registry.send_j1587_request(251, 0xB6).unwrap();
        assert_eq!(wait_for_sent(&adapter, Channel::J1708, 1), vec![vec![0x03, 0xB6, 0x00, 0xFB]]);
        assert!(matches!(
            registry.send_j1587_request(600, 0xB6),
            Err(DispatchError::J1587(_))
        ));
    }

    #[test]
    fn test_broadcast_segmented_on_can() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::Can]);
        let message = J1939Message {
            pgn: 65259,
            priority: 6,
            source: TOOL_ADDRESS,
            destination: GLOBAL_ADDRESS,
            data: b"VDA*Monitor*0001*1*".to_vec(),
        };
        registry.send_j1939_message(&message).unwrap();

        let sent = wait_for_sent(&adapter, Channel::Can, 4);
        assert_eq!(sent.len(), 4);
        // TP.CM_BAM then three TP.DT
        assert_eq!(&sent[0][1..5], &[0x1C, 0xEC, 0xFF, 0xF9]);
        assert_eq!(sent[0][5], 0x20);
        assert_eq!(&sent[1][1..6], &[0x1C, 0xEB, 0xFF, 0xF9, 0x01]);
    }

    #[test]
    fn test_peer_to_peer_too_large_on_can() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::Can]);
        let message = J1939Message {
            pgn: 0xEF00,
            priority: 6,
            source: TOOL_ADDRESS,
            destination: 0x00,
            data: vec![0; 12],
        };
        assert!(matches!(
            registry.send_j1939_message(&message),
            Err(DispatchError::PeerToPeerTooLarge { destination: 0x00, len: 12 })
        ));
    }

    #[test]
    fn test_largest_broadcast_queued_whole() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let registry = connected(&adapter, &[Channel::Can]);
        let message = J1939Message {
            pgn: 65226,
            priority: 6,
            source: TOOL_ADDRESS,
            destination: GLOBAL_ADDRESS,
            data: vec![0x5A; 1785],
        };
        registry.send_j1939_message(&message).unwrap();

        let sent = wait_for_sent(&adapter, Channel::Can, 256);
        assert_eq!(sent.len(), 256);
        assert_eq!(sent[0][5], 0x20);
        assert_eq!(sent[255][5], 255);
    }
}
