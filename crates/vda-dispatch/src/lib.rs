//! Vehicle Diagnostic Adapter Dispatch
//!
//! Connects channels on the adapter, runs one reader and one writer thread
//! per connected channel, and drains the per-channel queues into the
//! protocol decoders on a fixed period.

mod acquisition;
mod config;
mod dispatcher;
mod error;
mod health;
mod registry;
mod requests;

pub use acquisition::OutboundSender;
pub use config::{DispatchConfig, HealthConfig};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{DecodeError, DispatchError};
pub use health::{ChannelCounters, ChannelHealth, HealthMonitor};
pub use registry::ChannelRegistry;
