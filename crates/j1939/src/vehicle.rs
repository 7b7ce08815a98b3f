//! Vehicle Identification and Counters

use crate::pgn;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

/// Component identification (PGN 65259)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub unit_number: String,
}

impl ComponentIdentity {
    /// Parse `make*model*serial*unit`; missing trailing fields stay empty
    pub fn parse(data: &[u8]) -> Self {
        let text = ascii_text(data);
        let mut fields = text.split('*').map(str::to_string);
        Self {
            make: fields.next().unwrap_or_default(),
            model: fields.next().unwrap_or_default(),
            serial_number: fields.next().unwrap_or_default(),
            unit_number: fields.next().unwrap_or_default(),
        }
    }
}

/// Identification and odometer style values, keyed by source address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleInfo {
    pub vin: BTreeMap<u8, String>,
    pub components: BTreeMap<u8, ComponentIdentity>,
    pub software: BTreeMap<u8, Vec<String>>,
    pub clock: BTreeMap<u8, NaiveDateTime>,
    /// Total engine hours
    pub engine_hours: BTreeMap<u8, f64>,
    /// Total vehicle distance, km
    pub distance_km: BTreeMap<u8, f64>,
    /// High resolution total vehicle distance, km
    pub high_res_distance_km: BTreeMap<u8, f64>,
}

fn ascii_text(data: &[u8]) -> String {
    data.iter()
        .filter(|b| b.is_ascii() && !b.is_ascii_control())
        .map(|&b| b as char)
        .collect()
}

fn u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    // 0xFExxxxxx and above are error / not available
    (value < 0xFE00_0000).then_some(value)
}

/// Decode Time/Date (PGN 65254)
pub fn decode_time_date(data: &[u8]) -> Option<NaiveDateTime> {
    if data.len() < 6 {
        return None;
    }
    let seconds = (data[0] / 4) as u32;
    let minutes = data[1] as u32;
    let hours = data[2] as u32;
    let month = data[3] as u32;
    let day = (data[4] / 4) as u32;
    let year = 1985 + data[5] as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hours, minutes, seconds)
}

impl VehicleInfo {
    /// Apply a parameter group. Returns false for groups this table does
    /// not track or values that are not available.
    pub fn update(&mut self, group: u32, source: u8, data: &[u8]) -> bool {
        match group {
            pgn::VEHICLE_ID => {
                let text = ascii_text(data);
                let vin = text.split('*').next().unwrap_or_default().to_string();
                if vin.is_empty() {
                    return false;
                }
                self.vin.insert(source, vin);
            }
            pgn::COMPONENT_ID => {
                self.components.insert(source, ComponentIdentity::parse(data));
            }
            pgn::SOFTWARE_ID => {
                let Some((&count, rest)) = data.split_first() else {
                    return false;
                };
                let text = ascii_text(rest);
                let fields = text
                    .split('*')
                    .take(count as usize)
                    .map(str::to_string)
                    .collect();
                self.software.insert(source, fields);
            }
            pgn::TIME_DATE => match decode_time_date(data) {
                Some(at) => {
                    self.clock.insert(source, at);
                }
                None => {
                    debug!("Invalid time/date from {:02X}: {:02X?}", source, data);
                    return false;
                }
            },
            pgn::ENGINE_HOURS => match u32_le(data, 0) {
                Some(raw) => {
                    self.engine_hours.insert(source, raw as f64 * 0.05);
                }
                None => return false,
            },
            pgn::VEHICLE_DISTANCE => match u32_le(data, 4) {
                Some(raw) => {
                    self.distance_km.insert(source, raw as f64 * 0.125);
                }
                None => return false,
            },
            pgn::HIGH_RES_DISTANCE => match u32_le(data, 0) {
                Some(raw) => {
                    self.high_res_distance_km.insert(source, raw as f64 * 0.005);
                }
                None => return false,
            },
            _ => return false,
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
