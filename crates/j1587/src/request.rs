//! Parameter Requests

use crate::error::J1587Error;
use crate::pid::PAGE_EXTENSION;

/// Transmit priority for requests
const REQUEST_PRIORITY: u8 = 3;

/// Encode a J1708 client buffer requesting `pid` from all MIDs.
///
/// Page one: `[priority, tool, 0, pid]`. Page two:
/// `[priority + 1, tool, 255, 0, pid - 256]`.
pub fn encode_request(pid: u16, tool: u8) -> Result<Vec<u8>, J1587Error> {
    match pid {
        0..=254 => Ok(vec![REQUEST_PRIORITY, tool, 0, pid as u8]),
        256..=511 => Ok(vec![
            REQUEST_PRIORITY + 1,
            tool,
            PAGE_EXTENSION,
            0,
            (pid - 256) as u8,
        ]),
        _ => Err(J1587Error::NotRequestable(pid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_one_request() {
        assert_eq!(encode_request(251, 0xB6).unwrap(), vec![0x03, 0xB6, 0x00, 0xFB]);
    }

    #[test]
    fn test_page_two_request() {
        assert_eq!(encode_request(256, 0xB6).unwrap(), vec![0x04, 0xB6, 0xFF, 0x00, 0x00]);
        assert_eq!(encode_request(266, 0xAC).unwrap(), vec![0x04, 0xAC, 0xFF, 0x00, 0x0A]);
    }

    #[test]
    fn test_not_requestable() {
        assert_eq!(encode_request(255, 0xB6), Err(J1587Error::NotRequestable(255)));
        assert_eq!(encode_request(512, 0xB6), Err(J1587Error::NotRequestable(512)));
    }
}
