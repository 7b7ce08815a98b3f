//! Vehicle State
//!
//! Owned tables holding the latest decoded values per network, the
//! diagnostic trouble code sets, and the read-only parameter definition
//! lookup used by the decoders.

mod definitions;
mod dtc;
mod table;

pub use definitions::{DecodedValue, DefinitionError, ParameterDefinition, ParameterDefinitions, Protocol};
pub use dtc::{DtcCategory, DtcKey, DtcRecord, DtcSets, DtcUpdate};
pub use table::{TableEvent, ValueTable};
