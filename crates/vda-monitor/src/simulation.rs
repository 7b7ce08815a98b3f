//! Simulated Vehicle
//!
//! Responder wired into the simulated adapter so the monitor has something
//! to talk to without hardware: an engine ECU that answers UDS
//! identification reads on raw CAN and J1939 requests for identity and
//! time/date on the J1939 client.

use chrono::{DateTime, Datelike, Timelike, Utc};
use iso15765::{segment, service, single_frame};
use j1939::pgn;
use std::sync::Mutex;
use vda_link::{encode_can_message, CanId, Channel, Responder};

/// Source address of the simulated engine ECU
pub const ENGINE_ADDRESS: u8 = 0x00;

const VIN: &str = "1SIMVDA0000000001";
const NRC_REQUEST_OUT_OF_RANGE: u8 = 0x31;
const PADDING: u8 = 0xAA;

/// Identification data the simulated ECU reports by DID
fn identification(did: u16) -> Option<&'static [u8]> {
    match did {
        0xF187 => Some(b"SP-4471"),
        0xF18C => Some(b"SN000001"),
        0xF190 => Some(VIN.as_bytes()),
        0xF193 => Some(b"H1"),
        0xF195 => Some(b"SW1.2"),
        _ => None,
    }
}

/// Build a responder answering as engine ECU `ENGINE_ADDRESS` to `tester`
pub fn vehicle_responder(tester: u8) -> Responder {
    let ecu = UdsEcu::new(tester);
    Box::new(move |channel, message| match channel {
        Channel::Can => ecu.respond(message),
        Channel::J1939 => j1939_response(message, Utc::now()).into_iter().collect(),
        Channel::J1708 => Vec::new(),
    })
}

/// UDS server over ISO 15765 with 29-bit normal fixed addressing
struct UdsEcu {
    request_id: u32,
    response_id: u32,
    /// Consecutive frames waiting for flow control
    pending: Mutex<Vec<Vec<u8>>>,
}

impl UdsEcu {
    fn new(tester: u8) -> Self {
        Self {
            request_id: 0x18DA_0000 | ((ENGINE_ADDRESS as u32) << 8) | tester as u32,
            response_id: 0x18DA_0000 | ((tester as u32) << 8) | ENGINE_ADDRESS as u32,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn respond(&self, message: &[u8]) -> Vec<Vec<u8>> {
        // [extended][id BE][data]
        if message.len() < 6 || message[0] != 0x01 {
            return Vec::new();
        }
        let id = u32::from_be_bytes([message[1], message[2], message[3], message[4]]);
        if id != self.request_id {
            return Vec::new();
        }
        let data = &message[5..];
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());

        match data {
            [0x03, service::READ_DATA_BY_ID, hi, lo, ..] => {
                let did = u16::from_be_bytes([*hi, *lo]);
                let response = match identification(did) {
                    Some(value) => {
                        let mut response = vec![service::READ_DATA_BY_ID + service::POSITIVE_OFFSET, *hi, *lo];
                        response.extend_from_slice(value);
                        response
                    }
                    None => vec![
                        service::NEGATIVE_RESPONSE,
                        service::READ_DATA_BY_ID,
                        NRC_REQUEST_OUT_OF_RANGE,
                    ],
                };

                if let Ok(frame) = single_frame(&response, PADDING) {
                    return vec![self.frame(&frame)];
                }
                match segment(&response, PADDING) {
                    Ok((first, consecutive)) => {
                        *pending = consecutive;
                        vec![self.frame(&first)]
                    }
                    Err(_) => Vec::new(),
                }
            }
            [0x30, ..] => {
                let consecutive = std::mem::take(&mut *pending);
                consecutive.iter().map(|frame| self.frame(frame)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn frame(&self, data: &[u8]) -> Vec<u8> {
        encode_can_message(CanId::extended(self.response_id), data)
    }
}

/// Answer a J1939 client request buffer `[pgn LE][how][sa][da][requested LE]`
fn j1939_response(message: &[u8], now: DateTime<Utc>) -> Option<Vec<u8>> {
    if message.len() < 9 {
        return None;
    }
    let group = u32::from_le_bytes([message[0], message[1], message[2], 0]);
    let requester = message[4];
    let destination = message[5];
    if group != pgn::REQUEST || !(destination == ENGINE_ADDRESS || destination == vda_link::GLOBAL_ADDRESS) {
        return None;
    }
    let requested = u32::from_le_bytes([message[6], message[7], message[8], 0]);

    let data = match requested {
        pgn::VEHICLE_ID => format!("{VIN}*").into_bytes(),
        pgn::COMPONENT_ID => b"SIM*VDA-ECU*SN000001*ENGINE*".to_vec(),
        pgn::TIME_DATE => vec![
            (now.second() * 4) as u8,
            now.minute() as u8,
            now.hour() as u8,
            now.month() as u8,
            (now.day() * 4) as u8,
            (now.year() - 1985).clamp(0, 250) as u8,
            0x7D,
            0x7D,
        ],
        _ => return None,
    };

    let mut body = requested.to_le_bytes()[..3].to_vec();
    body.extend_from_slice(&[6, ENGINE_ADDRESS, requester]);
    body.extend_from_slice(&data);
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn uds_request(did: u16) -> Vec<u8> {
        let [hi, lo] = did.to_be_bytes();
        encode_can_message(CanId::extended(0x18DA00F9), &[0x03, 0x22, hi, lo, 0, 0, 0, 0])
    }

    #[test]
    fn test_short_identification_single_frame() {
        let ecu = UdsEcu::new(0xF9);
        let frames = ecu.respond(&uds_request(0xF193));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][1..5], &0x18DAF900u32.to_be_bytes());
        assert_eq!(&frames[0][5..], &[0x05, 0x62, 0xF1, 0x93, b'H', b'1', PADDING, PADDING][..]);
    }

    #[test]
    fn test_eight_byte_response_needs_first_frame() {
        let ecu = UdsEcu::new(0xF9);
        let first = ecu.respond(&uds_request(0xF195));
        assert_eq!(&first[0][5..], &[0x10, 0x08, 0x62, 0xF1, 0x95, b'S', b'W', b'1'][..]);

        let flow = encode_can_message(CanId::extended(0x18DA00F9), &[0x30, 0, 0, 0, 0, 0, 0, 0]);
        let rest = ecu.respond(&flow);
        assert_eq!(rest.len(), 1);
        assert_eq!(&rest[0][5..], &[0x21, b'.', b'2', PADDING, PADDING, PADDING, PADDING, PADDING][..]);
    }

    #[test]
    fn test_vin_multi_frame_after_flow_control() {
        let ecu = UdsEcu::new(0xF9);
        let first = ecu.respond(&uds_request(0xF190));
        assert_eq!(first.len(), 1);
        assert_eq!(&first[0][5..8], &[0x10, 20, 0x62]);

        let flow = encode_can_message(CanId::extended(0x18DA00F9), &[0x30, 0, 0, 0, 0, 0, 0, 0]);
        let rest = ecu.respond(&flow);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0][5], 0x21);
        assert_eq!(rest[1][5], 0x22);
    }

    #[test]
    fn test_unknown_did_is_refused() {
        let ecu = UdsEcu::new(0xF9);
        let frames = ecu.respond(&uds_request(0xF180));
        assert_eq!(&frames[0][5..], &[0x03, 0x7F, 0x22, 0x31, PADDING, PADDING, PADDING, PADDING][..]);
    }

    #[test]
    fn test_requests_for_other_ecus_ignored() {
        let ecu = UdsEcu::new(0xF9);
        let other = encode_can_message(CanId::extended(0x18DA03F9), &[0x03, 0x22, 0xF1, 0x90]);
        assert!(ecu.respond(&other).is_empty());
    }

    #[test]
    fn test_time_date_request_answer() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 13, 45, 30).unwrap();
        let request = j1939::encode_request(pgn::TIME_DATE, 0xF9, 0x00);
        let body = j1939_response(&request, now).unwrap();

        assert_eq!(&body[..6], &[0xE6, 0xFE, 0x00, 6, 0x00, 0xF9]);
        let decoded = j1939::decode_time_date(&body[6..]).unwrap();
        assert_eq!(decoded, now.naive_utc());
    }

    #[test]
    fn test_unsupported_request_unanswered() {
        let request = j1939::encode_request(pgn::DM1, 0xF9, 0xFF);
        assert!(j1939_response(&request, Utc::now()).is_none());
    }
}
