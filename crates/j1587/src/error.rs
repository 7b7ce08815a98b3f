//! J1587 Error Types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum J1587Error {
    /// Message without a MID
    #[error("Empty J1708 message")]
    Empty,

    /// Parameter data runs past the end of the message
    #[error("PID {pid} needs {needed} bytes, {available} available")]
    Truncated {
        pid: u16,
        needed: usize,
        available: usize,
    },

    /// Escape byte 255 at the end of the message
    #[error("Page extension without a PID")]
    DanglingExtension,

    /// PID cannot be encoded in a request
    #[error("PID {0} cannot be requested")]
    NotRequestable(u16),
}
