//! Queue Implementation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use vda_link::RawFrame;

/// Default queue capacity (reference sizing for a few hundred frames/s)
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The consumer side was dropped
    #[error("frame queue closed")]
    Closed,

    /// Non-blocking push found the queue at capacity
    #[error("frame queue full ({0} frames)")]
    Full(usize),
}

/// Counters shared by both ends of a queue
#[derive(Debug)]
pub struct QueueStats {
    capacity: usize,
    depth: AtomicUsize,
    total_written: AtomicUsize,
    total_read: AtomicUsize,
}

impl QueueStats {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            depth: AtomicUsize::new(0),
            total_written: AtomicUsize::new(0),
            total_read: AtomicUsize::new(0),
        }
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Total frames pushed (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written.load(Ordering::Relaxed)
    }

    /// Total frames popped
    pub fn total_read(&self) -> usize {
        self.total_read.load(Ordering::Relaxed)
    }

    fn pushed(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        self.total_written.fetch_add(1, Ordering::Relaxed);
    }

    fn popped(&self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
        self.total_read.fetch_add(1, Ordering::Relaxed);
    }
}

/// Create a bounded queue holding at most `capacity` frames
pub fn bounded(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(QueueStats::new(capacity.max(1)));
    (
        FrameProducer {
            tx,
            stats: stats.clone(),
        },
        FrameConsumer { rx, stats },
    )
}

/// Producer end; cheap to clone, one per acquisition thread
#[derive(Debug, Clone)]
pub struct FrameProducer {
    tx: mpsc::Sender<RawFrame>,
    stats: Arc<QueueStats>,
}

impl FrameProducer {
    /// Push a frame, waiting for room when the queue is full.
    ///
    /// Must be called from a plain OS thread, never from inside the async
    /// runtime.
    pub fn push_blocking(&self, frame: RawFrame) -> Result<(), QueueError> {
        // Count before sending so the consumer never sees depth underflow
        self.stats.pushed();
        self.tx.blocking_send(frame).map_err(|_| {
            self.stats.depth.fetch_sub(1, Ordering::AcqRel);
            QueueError::Closed
        })
    }

    /// Push a frame without waiting
    pub fn try_push(&self, frame: RawFrame) -> Result<(), QueueError> {
        self.stats.pushed();
        self.tx.try_send(frame).map_err(|e| {
            self.stats.depth.fetch_sub(1, Ordering::AcqRel);
            match e {
                TrySendError::Full(_) => QueueError::Full(self.stats.capacity),
                TrySendError::Closed(_) => QueueError::Closed,
            }
        })
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }

    /// Whether the consumer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end, owned by the dispatch loop
#[derive(Debug)]
pub struct FrameConsumer {
    rx: mpsc::Receiver<RawFrame>,
    stats: Arc<QueueStats>,
}

impl FrameConsumer {
    /// Pop the next frame if one is queued
    pub fn try_pop(&mut self) -> Option<RawFrame> {
        match self.rx.try_recv() {
            Ok(frame) => {
                self.stats.popped();
                Some(frame)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next frame; `None` once every producer is gone
    pub async fn pop(&mut self) -> Option<RawFrame> {
        let frame = self.rx.recv().await?;
        self.stats.popped();
        Some(frame)
    }

    /// Discard everything currently queued, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.try_pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use vda_link::Channel;

    fn frame(n: u8) -> RawFrame {
        RawFrame::new(Channel::J1708, Instant::now(), vec![n])
    }

    #[test]
    fn test_push_and_pop_in_order() {
        let (producer, mut consumer) = bounded(10);
        for i in 0..5 {
            producer.try_push(frame(i)).unwrap();
        }
        assert_eq!(consumer.len(), 5);

        let popped: Vec<u8> = std::iter::from_fn(|| consumer.try_pop())
            .map(|f| f.payload[0])
            .collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(consumer.is_empty());
        assert_eq!(consumer.stats().total_written(), 5);
        assert_eq!(consumer.stats().total_read(), 5);
    }

    #[test]
    fn test_try_push_when_full() {
        let (producer, _consumer) = bounded(2);
        producer.try_push(frame(0)).unwrap();
        producer.try_push(frame(1)).unwrap();
        assert_eq!(producer.try_push(frame(2)), Err(QueueError::Full(2)));
        assert_eq!(producer.stats().len(), 2);
        assert!((producer.stats().fill_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_closed_consumer() {
        let (producer, consumer) = bounded(2);
        drop(consumer);
        assert!(producer.is_closed());
        assert_eq!(producer.try_push(frame(0)), Err(QueueError::Closed));
    }

    #[test]
    fn test_blocking_producers_from_threads() {
        let (producer, mut consumer) = bounded(4);
        let handles: Vec<_> = (0..3)
            .map(|t| {
                let producer = producer.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        producer.push_blocking(frame(t * 10 + i)).unwrap();
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < 30 {
            match consumer.try_pop() {
                Some(f) => received.push(f.payload[0]),
                None => std::thread::yield_now(),
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }
        received.sort_unstable();
        assert_eq!(received, (0..30).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_async_pop() {
        let (producer, mut consumer) = bounded(2);
        producer.try_push(frame(7)).unwrap();
        assert_eq!(consumer.pop().await.unwrap().payload, vec![7]);
        drop(producer);
        assert!(consumer.pop().await.is_none());
    }
}
