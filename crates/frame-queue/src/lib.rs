//! Bounded Frame Queue
//!
//! The only shared-memory boundary between acquisition threads (producers)
//! and the dispatch loop (sole consumer).

mod queue;

pub use queue::{bounded, FrameConsumer, FrameProducer, QueueError, QueueStats, DEFAULT_CAPACITY};
