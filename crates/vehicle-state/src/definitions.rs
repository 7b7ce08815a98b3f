//! Parameter Definition Lookup
//!
//! Read-only mapping from protocol + parameter id to the information needed
//! to turn raw bytes into a value. The full databases live outside this
//! workspace and are loaded from JSON; a small built-in set covers the
//! parameters this tool requests itself and the common engine SPNs. Missing ids never fail, callers fall
//! back to raw bytes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Errors loading a definition file
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read definition file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid definition file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Protocol a parameter id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Keys are SPNs
    J1939,
    /// Keys are PIDs (page two PIDs are 256 and up)
    J1587,
}

fn unit_resolution() -> f64 {
    1.0
}

/// How to interpret one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    /// Byte width; `None` marks a variable-length parameter preceded by a count byte
    #[serde(default)]
    pub width: Option<u8>,
    #[serde(default = "unit_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub unit: Option<String>,
    /// Labels for enumerated values
    #[serde(default)]
    pub enumeration: BTreeMap<u32, String>,
    /// Parameter group carrying this SPN (J1939 only)
    #[serde(default)]
    pub pgn: Option<u32>,
    /// Least significant bit of the SPN within the group payload
    #[serde(default)]
    pub start_bit: u32,
    /// Field length in bits; defaults to `width` bytes
    #[serde(default)]
    pub bit_length: Option<u32>,
}

impl ParameterDefinition {
    fn scaled(name: &str, width: u8, resolution: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            width: Some(width),
            resolution,
            offset: 0.0,
            signed: false,
            unit: Some(unit.to_string()),
            enumeration: BTreeMap::new(),
            pgn: None,
            start_bit: 0,
            bit_length: None,
        }
    }

    /// Place a J1939 SPN at `start_bit` of `pgn`
    fn in_group(self, pgn: u32, start_bit: u32) -> Self {
        Self {
            pgn: Some(pgn),
            start_bit,
            ..self
        }
    }

    fn variable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: None,
            resolution: 1.0,
            offset: 0.0,
            signed: false,
            unit: None,
            enumeration: BTreeMap::new(),
            pgn: None,
            start_bit: 0,
            bit_length: None,
        }
    }

    /// Field length in bits, `None` for variable-length parameters
    pub fn bit_length(&self) -> Option<u32> {
        self.bit_length.or(self.width.map(|width| u32::from(width) * 8))
    }

    /// Interpret little-endian raw bytes
    pub fn interpret(&self, raw: &[u8]) -> DecodedValue {
        if self.width.is_none() || raw.is_empty() || raw.len() > 4 {
            return DecodedValue::Raw(raw.to_vec());
        }

        let mut value: u32 = 0;
        for (i, byte) in raw.iter().enumerate() {
            value |= (*byte as u32) << (8 * i);
        }
        self.interpret_bits(value, 8 * raw.len() as u32)
            .unwrap_or_else(|| DecodedValue::Raw(raw.to_vec()))
    }

    /// Interpret a `bits` wide field already extracted from its message.
    /// `None` for an enumerated value without a label.
    pub fn interpret_bits(&self, value: u32, bits: u32) -> Option<DecodedValue> {
        if !self.enumeration.is_empty() {
            return self.enumeration.get(&value).map(|label| DecodedValue::Enumerated {
                code: value,
                label: label.clone(),
            });
        }

        let number = if self.signed {
            let shift = 32 - bits.clamp(1, 32);
            (((value << shift) as i32) >> shift) as f64
        } else {
            value as f64
        };
        Some(DecodedValue::Number(number * self.resolution + self.offset))
    }
}

/// Value produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Scaled numeric value
    Number(f64),
    /// Enumerated state with its label
    Enumerated { code: u32, label: String },
    /// Undecoded bytes
    Raw(Vec<u8>),
}

impl DecodedValue {
    /// Numeric value when the parameter was scaled
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Number(n) => write!(f, "{n}"),
            DecodedValue::Enumerated { label, .. } => f.write_str(label),
            DecodedValue::Raw(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// Definition database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterDefinitions {
    #[serde(default)]
    j1939: HashMap<u32, ParameterDefinition>,
    #[serde(default)]
    j1587: HashMap<u32, ParameterDefinition>,
    /// SPNs carried by each parameter group, ascending
    #[serde(skip)]
    groups: HashMap<u32, Vec<u32>>,
}

impl ParameterDefinitions {
    /// Parse a JSON database: `{"j1587": {"190": {...}}, "j1939": {...}}`
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let mut definitions: Self = serde_json::from_str(json)?;
        definitions.index_groups();
        Ok(definitions)
    }

    /// Load a JSON database from disk, layered over the built-in set
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let text = std::fs::read_to_string(path)?;
        let loaded = Self::from_json(&text)?;
        let mut definitions = Self::builtin();
        definitions.j1939.extend(loaded.j1939);
        definitions.j1587.extend(loaded.j1587);
        definitions.index_groups();
        info!(
            "Loaded parameter definitions from {}: {} J1939, {} J1587",
            path.display(),
            definitions.j1939.len(),
            definitions.j1587.len()
        );
        Ok(definitions)
    }

    /// Definitions for the parameters this tool requests or relies on
    pub fn builtin() -> Self {
        let j1587 = [
            (84, ParameterDefinition::scaled("Road Speed", 1, 0.805, "km/h")),
            (100, ParameterDefinition::scaled("Engine Oil Pressure", 1, 3.447, "kPa")),
            (110, ParameterDefinition {
                offset: -17.78,
                ..ParameterDefinition::scaled("Engine Coolant Temperature", 1, 0.556, "°C")
            }),
            (190, ParameterDefinition::scaled("Engine Speed", 2, 0.25, "rpm")),
            (194, ParameterDefinition::variable("Transmitter System Diagnostic Code")),
            (234, ParameterDefinition::variable("Software Identification")),
            (237, ParameterDefinition::variable("Vehicle Identification Number")),
            (243, ParameterDefinition::variable("Component Identification")),
            (245, ParameterDefinition::scaled("Total Vehicle Distance", 4, 0.161, "km")),
            (247, ParameterDefinition::scaled("Total Engine Hours", 4, 0.05, "h")),
            (251, ParameterDefinition::variable("Clock")),
            (252, ParameterDefinition::variable("Date")),
        ]
        .into_iter()
        .collect();

        let j1939 = [
            (84, ParameterDefinition::scaled("Wheel-Based Vehicle Speed", 2, 1.0 / 256.0, "km/h").in_group(65265, 8)),
            (91, ParameterDefinition::scaled("Accelerator Pedal Position 1", 1, 0.4, "%").in_group(61443, 8)),
            (110, ParameterDefinition {
                offset: -40.0,
                ..ParameterDefinition::scaled("Engine Coolant Temperature", 1, 1.0, "°C").in_group(65262, 0)
            }),
            (190, ParameterDefinition::scaled("Engine Speed", 2, 0.125, "rpm").in_group(61444, 24)),
            (247, ParameterDefinition::scaled("Engine Total Hours of Operation", 4, 0.05, "h").in_group(65253, 0)),
            (899, ParameterDefinition {
                bit_length: Some(4),
                unit: None,
                ..ParameterDefinition::scaled("Engine Torque Mode", 1, 1.0, "").in_group(61444, 0)
            }),
            (917, ParameterDefinition::scaled("Total Vehicle Distance (High Resolution)", 4, 0.005, "km").in_group(65217, 0)),
        ]
        .into_iter()
        .collect();

        let mut definitions = Self {
            j1939,
            j1587,
            groups: HashMap::new(),
        };
        definitions.index_groups();
        definitions
    }

    fn index_groups(&mut self) {
        self.groups.clear();
        for (spn, definition) in &self.j1939 {
            if let Some(pgn) = definition.pgn {
                self.groups.entry(pgn).or_default().push(*spn);
            }
        }
        for spns in self.groups.values_mut() {
            spns.sort_unstable();
        }
    }

    /// J1939 SPNs laid out in parameter group `pgn`
    pub fn spns_in(&self, pgn: u32) -> impl Iterator<Item = (u32, &ParameterDefinition)> + '_ {
        self.groups
            .get(&pgn)
            .into_iter()
            .flatten()
            .filter_map(move |spn| self.j1939.get(spn).map(|definition| (*spn, definition)))
    }

    /// Look up a parameter; `None` when the id is unknown
    pub fn lookup(&self, protocol: Protocol, id: u32) -> Option<&ParameterDefinition> {
        match protocol {
            Protocol::J1939 => self.j1939.get(&id),
            Protocol::J1587 => self.j1587.get(&id),
        }
    }

    /// Number of definitions for a protocol
    pub fn len(&self, protocol: Protocol) -> usize {
        match protocol {
            Protocol::J1939 => self.j1939.len(),
            Protocol::J1587 => self.j1587.len(),
        }
    }
}
