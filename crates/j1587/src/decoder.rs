//! J1587 Message Decoder

use crate::error::J1587Error;
use crate::pid::{standard_width, ParameterWidth, PAGE_EXTENSION};
use std::sync::Arc;
use std::time::Instant;
use vda_link::RawFrame;
use vehicle_state::{DecodedValue, ParameterDefinitions, Protocol, ValueTable};

/// One parameter split out of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1587Parameter {
    pub pid: u16,
    /// Data bytes without the PID or the count byte
    pub data: Vec<u8>,
    /// False when the message ended before all data bytes arrived
    pub complete: bool,
}

/// A message split into parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1587Message {
    pub mid: u8,
    pub parameters: Vec<J1587Parameter>,
    /// Why parsing stopped early, if it did
    pub error: Option<J1587Error>,
}

/// Latest value for one (MID, PID)
#[derive(Debug, Clone, PartialEq)]
pub struct J1587Record {
    pub mid: u8,
    pub pid: u16,
    pub name: Option<String>,
    pub value: DecodedValue,
    pub unit: Option<String>,
    pub raw: Vec<u8>,
    pub last_seen: Instant,
    pub count: u64,
}

fn width_of(pid: u16, definitions: &ParameterDefinitions) -> ParameterWidth {
    match definitions.lookup(Protocol::J1587, pid as u32) {
        Some(definition) => match definition.width {
            Some(width) => ParameterWidth::Fixed(width as usize),
            None => ParameterWidth::Variable,
        },
        None => standard_width(pid),
    }
}

/// Split a J1708 message (MID first, checksum already removed)
pub fn parse_message(message: &[u8], definitions: &ParameterDefinitions) -> Result<J1587Message, J1587Error> {
    let (&mid, mut rest) = message.split_first().ok_or(J1587Error::Empty)?;
    let mut parameters = Vec::new();
    let mut error = None;

    while let Some((&first, tail)) = rest.split_first() {
        let (pid, tail) = if first == PAGE_EXTENSION {
            match tail.split_first() {
                Some((&page_two, tail)) => (256 + page_two as u16, tail),
                None => {
                    error = Some(J1587Error::DanglingExtension);
                    break;
                }
            }
        } else {
            (first as u16, tail)
        };

        let (start, needed) = match width_of(pid, definitions) {
            ParameterWidth::Fixed(width) => (0, width),
            ParameterWidth::Variable => match tail.first() {
                Some(&count) => (1, count as usize),
                None => (0, 1),
            },
        };

        if tail.len() < start + needed {
            parameters.push(J1587Parameter {
                pid,
                data: tail.get(start..).unwrap_or_default().to_vec(),
                complete: false,
            });
            error = Some(J1587Error::Truncated {
                pid,
                needed,
                available: tail.len().saturating_sub(start),
            });
            break;
        }

        parameters.push(J1587Parameter {
            pid,
            data: tail[start..start + needed].to_vec(),
            complete: true,
        });
        rest = &tail[start + needed..];
    }

    Ok(J1587Message {
        mid,
        parameters,
        error,
    })
}

#[derive(Debug)]
pub struct J1587Decoder {
    definitions: Arc<ParameterDefinitions>,
    parameters: ValueTable<(u8, u16), J1587Record>,
}

impl J1587Decoder {
    pub fn new(definitions: Arc<ParameterDefinitions>) -> Self {
        Self {
            definitions,
            parameters: ValueTable::new("J1587 parameter"),
        }
    }

    /// Decode a J1708 frame into the parameter table.
    ///
    /// Parameters cut short by the end of the message are still recorded
    /// with their raw bytes before the error is returned.
    pub fn decode(&mut self, frame: &RawFrame) -> Result<usize, J1587Error> {
        let message = parse_message(&frame.payload, &self.definitions)?;
        let recorded = message.parameters.len();
        for parameter in message.parameters {
            self.record(message.mid, parameter, frame.receive_time);
        }
        match message.error {
            Some(err) => Err(err),
            None => Ok(recorded),
        }
    }

    fn record(&mut self, mid: u8, parameter: J1587Parameter, at: Instant) {
        let J1587Parameter { pid, data, complete } = parameter;
        let definition = self.definitions.lookup(Protocol::J1587, pid as u32);
        let value = match definition {
            Some(definition) if complete => definition.interpret(&data),
            _ => DecodedValue::Raw(data.clone()),
        };
        let name = definition.map(|d| d.name.clone());
        let unit = definition.and_then(|d| d.unit.clone());

        let inserted = (value.clone(), data.clone());
        self.parameters.upsert(
            (mid, pid),
            || J1587Record {
                mid,
                pid,
                name,
                value: inserted.0,
                unit,
                raw: inserted.1,
                last_seen: at,
                count: 1,
            },
            |record| {
                record.value = value;
                record.raw = data;
                record.last_seen = record.last_seen.max(at);
                record.count += 1;
            },
        );
    }

    pub fn parameters(&self) -> &ValueTable<(u8, u16), J1587Record> {
        &self.parameters
    }

    pub fn find(&self, mid: u8, pid: u16) -> Option<&J1587Record> {
        self.parameters.get(&(mid, pid))
    }

    pub fn reset(&mut self) {
        self.parameters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vda_link::Channel;

    fn decoder() -> J1587Decoder {
        J1587Decoder::new(Arc::new(ParameterDefinitions::builtin()))
    }

    fn frame(message: &[u8]) -> RawFrame {
        RawFrame::new(Channel::J1708, Instant::now(), message.to_vec())
    }

    #[test]
    fn test_pid_254_is_single_byte_pid() {
        let parsed = parse_message(&[128, 254, 2, 0xAA, 0xBB], &ParameterDefinitions::default()).unwrap();
        assert_eq!(parsed.parameters.len(), 1);
        assert_eq!(parsed.parameters[0].pid, 254);
        assert_eq!(parsed.parameters[0].data, vec![0xAA, 0xBB]);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_page_extension() {
        let parsed = parse_message(&[128, 255, 10, 0x42], &ParameterDefinitions::default()).unwrap();
        assert_eq!(parsed.parameters[0].pid, 266);
        assert_eq!(parsed.parameters[0].data, vec![0x42]);
    }

    #[test]
    fn test_multiple_parameters() {
        // Road speed, engine speed 1200 rpm, coolant temperature
        let message = [128, 84, 100, 190, 0xC0, 0x12, 110, 0x96];
        let mut decoder = decoder();
        assert_eq!(decoder.decode(&frame(&message)).unwrap(), 3);

        let speed = decoder.find(128, 190).unwrap();
        assert_eq!(speed.value, DecodedValue::Number(1200.0));
        assert_eq!(speed.unit.as_deref(), Some("rpm"));
        assert_eq!(speed.name.as_deref(), Some("Engine Speed"));
        assert!(decoder.find(128, 84).is_some());
        assert!(decoder.find(128, 110).is_some());
    }

    #[test]
    fn test_unknown_pid_kept_raw() {
        let mut decoder = decoder();
        decoder.decode(&frame(&[140, 150, 0x01, 0x02])).unwrap();
        let record = decoder.find(140, 150).unwrap();
        assert_eq!(record.value, DecodedValue::Raw(vec![0x01, 0x02]));
        assert!(record.name.is_none());
    }

    #[test]
    fn test_truncated_parameter_recorded_raw() {
        let mut decoder = decoder();
        let err = decoder.decode(&frame(&[128, 84, 50, 190, 0x10])).unwrap_err();
        assert_eq!(
            err,
            J1587Error::Truncated {
                pid: 190,
                needed: 2,
                available: 1
            }
        );
        assert!(decoder.find(128, 84).is_some());
        assert_eq!(decoder.find(128, 190).unwrap().value, DecodedValue::Raw(vec![0x10]));
    }

    #[test]
    fn test_dangling_extension() {
        let parsed = parse_message(&[128, 84, 0, 255], &ParameterDefinitions::default()).unwrap();
        assert_eq!(parsed.parameters.len(), 1);
        assert_eq!(parsed.error, Some(J1587Error::DanglingExtension));
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(decoder().decode(&frame(&[])), Err(J1587Error::Empty));
    }

    #[test]
    fn test_repeat_updates_count() {
        let mut decoder = decoder();
        decoder.decode(&frame(&[128, 84, 100])).unwrap();
        decoder.decode(&frame(&[128, 84, 101])).unwrap();
        let record = decoder.find(128, 84).unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.raw, vec![101]);
        assert_eq!(decoder.parameters().len(), 1);

        decoder.reset();
        assert!(decoder.parameters().is_empty());
    }

    proptest! {
        #[test]
        fn prop_parse_consumes_or_reports(message in proptest::collection::vec(any::<u8>(), 1..64)) {
            let definitions = ParameterDefinitions::builtin();
            let parsed = parse_message(&message, &definitions).unwrap();
            prop_assert_eq!(parsed.mid, message[0]);
            let incomplete = parsed.parameters.iter().filter(|p| !p.complete).count();
            prop_assert!(incomplete <= 1);
            if incomplete == 1 {
                prop_assert!(parsed.error.is_some());
            }
        }
    }
}
