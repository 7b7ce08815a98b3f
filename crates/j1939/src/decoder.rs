//! J1939 Frame Decoder
//!
//! Owns the parameter group table and the tables derived from it: SPN
//! values, trouble codes, lamps and vehicle identity. Frames
//! reach the decoder either raw from the CAN client, where transport
//! protocol frames are reassembled here, or as whole parameter groups from
//! the adapter's J1939 client.

use crate::diagnostics::{parse_diagnostic_message, parse_freeze_frames, LampStatus};
use crate::error::J1939Error;
use crate::id::J1939Id;
use crate::message::J1939Message;
use crate::pgn;
use crate::spn::{extract_spn, SpnKey, SpnRecord};
use crate::transport::{Reassembled, TransportConfig, TransportReassembler};
use crate::vehicle::VehicleInfo;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use vda_link::RawFrame;
use vehicle_state::{DtcCategory, DtcSets, ParameterDefinitions, ValueTable};

/// Latest payload for one (PGN, source address)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1939Record {
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    pub priority: u8,
    pub data: Vec<u8>,
    pub receive_time: Instant,
    /// Number of updates since the record was created
    pub count: u64,
}

/// Key of the parameter group table
pub type RecordKey = (u32, u8);

#[derive(Debug)]
pub struct J1939Decoder {
    transport: TransportReassembler,
    definitions: Arc<ParameterDefinitions>,
    parameters: ValueTable<RecordKey, J1939Record>,
    spns: ValueTable<SpnKey, SpnRecord>,
    dtcs: DtcSets,
    lamps: BTreeMap<u8, LampStatus>,
    vehicle: VehicleInfo,
}

impl Default for J1939Decoder {
    fn default() -> Self {
        Self::new(TransportConfig::default(), Arc::new(ParameterDefinitions::builtin()))
    }
}

impl J1939Decoder {
    pub fn new(config: TransportConfig, definitions: Arc<ParameterDefinitions>) -> Self {
        Self {
            transport: TransportReassembler::new(config),
            definitions,
            parameters: ValueTable::new("J1939 parameter group"),
            spns: ValueTable::new("J1939 SPN"),
            dtcs: DtcSets::new(),
            lamps: BTreeMap::new(),
            vehicle: VehicleInfo::default(),
        }
    }

    /// Decode a frame from the CAN client.
    ///
    /// Returns the key of the updated record, or `None` when the frame only
    /// advanced a transport session.
    pub fn decode_can(&mut self, frame: &RawFrame) -> Result<Option<RecordKey>, J1939Error> {
        let can_id = frame.can_id.ok_or(J1939Error::MissingIdentifier)?;
        if !can_id.extended {
            return Err(J1939Error::NotExtended(can_id.raw));
        }
        let id = J1939Id::from_can_id(can_id.raw);

        match id.pgn() {
            pgn::TP_CM => {
                self.transport
                    .connection_management(&id, &frame.payload, frame.receive_time)?;
                Ok(None)
            }
            pgn::TP_DT => {
                match self
                    .transport
                    .data_transfer(&id, &frame.payload, frame.receive_time)?
                {
                    Some(Reassembled {
                        pgn,
                        priority,
                        source,
                        destination,
                        data,
                    }) => Ok(Some(self.apply(
                        pgn,
                        priority,
                        source,
                        destination,
                        data,
                        frame.receive_time,
                    ))),
                    None => Ok(None),
                }
            }
            group => Ok(Some(self.apply(
                group,
                id.priority,
                id.source_address,
                id.destination(),
                frame.payload.clone(),
                frame.receive_time,
            ))),
        }
    }

    /// Decode a whole parameter group from the J1939 client
    pub fn decode_client(&mut self, frame: &RawFrame) -> Result<RecordKey, J1939Error> {
        let message = J1939Message::from_client_payload(&frame.payload)?;
        Ok(self.apply(
            message.pgn,
            message.priority,
            message.source,
            message.destination,
            message.data,
            frame.receive_time,
        ))
    }

    fn apply(
        &mut self,
        group: u32,
        priority: u8,
        source: u8,
        destination: u8,
        data: Vec<u8>,
        at: Instant,
    ) -> RecordKey {
        match group {
            pgn::DM1 | pgn::DM2 => {
                let category = if group == pgn::DM1 {
                    DtcCategory::Active
                } else {
                    DtcCategory::Previous
                };
                let (lamps, codes) = parse_diagnostic_message(source, &data);
                if group == pgn::DM1 {
                    self.lamps.insert(source, lamps);
                }
                for code in codes {
                    self.dtcs.record(category, code, at);
                }
            }
            pgn::DM4 => {
                for code in parse_freeze_frames(source, &data) {
                    self.dtcs.record(DtcCategory::FreezeFrame, code, at);
                }
            }
            _ => {
                self.vehicle.update(group, source, &data);
            }
        }

        for (spn, definition) in self.definitions.spns_in(group) {
            let extracted = extract_spn(spn, definition, &data);
            if !extracted.complete {
                debug!(
                    "PGN {} from {:02X}: {} bytes end before SPN {}",
                    group,
                    source,
                    data.len(),
                    spn
                );
            }
            let inserted = extracted.clone();
            self.spns.upsert(
                (spn, source),
                || SpnRecord {
                    spn,
                    source,
                    pgn: group,
                    value: inserted.value,
                    raw: inserted.raw,
                    complete: inserted.complete,
                    receive_time: at,
                    count: 1,
                },
                |record| {
                    record.value = extracted.value;
                    record.raw = extracted.raw;
                    record.complete = extracted.complete;
                    record.receive_time = record.receive_time.max(at);
                    record.count += 1;
                },
            );
        }

        let key = (group, source);
        let inserted = data.clone();
        self.parameters.upsert(
            key,
            || J1939Record {
                pgn: group,
                source,
                destination,
                priority,
                data: inserted,
                receive_time: at,
                count: 1,
            },
            |record| {
                record.destination = destination;
                record.priority = priority;
                record.data = data;
                record.receive_time = record.receive_time.max(at);
                record.count += 1;
            },
        );
        key
    }

    /// Destroy transport sessions whose deadline has passed
    pub fn expire_sessions(&mut self, now: Instant) -> usize {
        let expired = self.transport.expire(now);
        if expired > 0 {
            debug!("{} J1939 transport sessions expired", expired);
        }
        expired
    }

    pub fn parameters(&self) -> &ValueTable<RecordKey, J1939Record> {
        &self.parameters
    }

    /// Latest bytes for a PGN from a source address
    pub fn find(&self, group: u32, source: u8) -> Option<&[u8]> {
        self.parameters
            .get(&(group, source))
            .map(|record| record.data.as_slice())
    }

    /// Decoded SPN values keyed by (SPN, source address)
    pub fn spns(&self) -> &ValueTable<SpnKey, SpnRecord> {
        &self.spns
    }

    /// Latest value of an SPN from a source address
    pub fn find_spn(&self, spn: u32, source: u8) -> Option<&SpnRecord> {
        self.spns.get(&(spn, source))
    }

    pub fn dtcs(&self) -> &DtcSets {
        &self.dtcs
    }

    /// Lamp status from the latest DM1 per source
    pub fn lamps(&self) -> &BTreeMap<u8, LampStatus> {
        &self.lamps
    }

    pub fn vehicle(&self) -> &VehicleInfo {
        &self.vehicle
    }

    pub fn transport(&self) -> &TransportReassembler {
        &self.transport
    }

    /// Clear every table and open transfer
    pub fn reset(&mut self) {
        self.transport.clear();
        self.parameters.clear();
        self.spns.clear();
        self.dtcs.clear();
        self.lamps.clear();
        self.vehicle.clear();
    }
}
