//! Dispatch Error Types

use j1587::J1587Error;
use j1939::{J1939Error, TransportError};
use thiserror::Error;
use vda_link::{Channel, DeviceError};

/// Errors from outbound operations and channel management
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Neither a J1939 nor a CAN client is connected
    #[error("No channel available for {0}")]
    NoRoute(&'static str),

    /// Peer-to-peer payloads over 8 bytes need RTS/CTS on the J1939 client
    #[error("Cannot send {len} bytes to {destination:02X} on the CAN channel")]
    PeerToPeerTooLarge { destination: u8, len: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    J1587(#[from] J1587Error),
}

/// A frame the decoders could not use
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{channel}: {source}")]
    J1939 {
        channel: Channel,
        #[source]
        source: J1939Error,
    },

    #[error("J1708: {0}")]
    J1587(#[from] J1587Error),
}

impl DecodeError {
    /// Expected under normal traffic; logged at debug level
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            DecodeError::J1939 {
                source: J1939Error::Transport(_) | J1939Error::NotExtended(_),
                ..
            }
        )
    }
}
