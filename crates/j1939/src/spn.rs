//! Suspect Parameter Numbers
//!
//! SPNs are bit fields inside a parameter group payload, least significant
//! bit first. Where a field sits comes from the parameter definitions; groups
//! with no defined SPNs only ever appear in the parameter group table.

use std::time::Instant;
use vehicle_state::{DecodedValue, ParameterDefinition};

/// Key of the SPN table: (SPN, source address)
pub type SpnKey = (u32, u8);

/// One SPN pulled out of a parameter group payload
#[derive(Debug, Clone, PartialEq)]
pub struct SpnValue {
    pub spn: u32,
    pub value: DecodedValue,
    /// Bytes spanned by the field
    pub raw: Vec<u8>,
    /// False when the payload ended before the field did
    pub complete: bool,
}

/// Latest value of one SPN from one controller
#[derive(Debug, Clone, PartialEq)]
pub struct SpnRecord {
    pub spn: u32,
    pub source: u8,
    pub pgn: u32,
    pub value: DecodedValue,
    pub raw: Vec<u8>,
    pub complete: bool,
    pub receive_time: Instant,
    pub count: u64,
}

/// Extract `spn` from a group payload.
///
/// Numeric fields with every bit set are "not available" and stay raw, as
/// do fields wider than 32 bits and variable-length ones.
pub fn extract_spn(spn: u32, definition: &ParameterDefinition, data: &[u8]) -> SpnValue {
    let start = definition.start_bit as usize;
    let first = start / 8;
    let tail = || data.get(first..).unwrap_or_default().to_vec();

    let Some(bits) = definition.bit_length().map(|bits| bits as usize) else {
        let raw = tail();
        return SpnValue {
            spn,
            value: DecodedValue::Raw(raw.clone()),
            raw,
            complete: first <= data.len(),
        };
    };

    let end = (start + bits).div_ceil(8);
    if bits == 0 || data.len() < end {
        let raw = tail();
        return SpnValue {
            spn,
            value: DecodedValue::Raw(raw.clone()),
            raw,
            complete: bits == 0,
        };
    }

    let raw = data[first..end].to_vec();
    if bits > 32 {
        return SpnValue {
            spn,
            value: DecodedValue::Raw(raw.clone()),
            raw,
            complete: true,
        };
    }

    // at most 5 bytes for an unaligned 32-bit field
    let word = raw
        .iter()
        .enumerate()
        .fold(0u64, |word, (i, byte)| word | (*byte as u64) << (8 * i));
    let mask = (1u64 << bits) - 1;
    let field = (word >> (start % 8)) & mask;

    let not_available = definition.enumeration.is_empty() && bits >= 2 && field == mask;
    let value = if not_available {
        DecodedValue::Raw(raw.clone())
    } else {
        definition
            .interpret_bits(field as u32, bits as u32)
            .unwrap_or_else(|| DecodedValue::Raw(raw.clone()))
    };
    SpnValue {
        spn,
        value,
        raw,
        complete: true,
    }
}
