//! Acquisition and Send Threads
//!
//! Each connected channel gets a reader thread that block-reads the adapter
//! and a writer thread that drains the channel's outbound queue. Both check
//! the channel's active flag between bounded waits, so clearing it stops
//! them within one read timeout.

use crate::health::ChannelCounters;
use frame_queue::{FrameProducer, QueueError};
use iso15765::CanSender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vda_link::{encode_can_message, CanId, Channel, ClientHandle, DeviceError, FrameSource, RawFrame};

/// Batches waiting for the writer thread
const OUTBOUND_CAPACITY: usize = 256;

/// Back-off after a failed read
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a reader thread needs
pub(crate) struct Reader {
    pub channel: Channel,
    pub source: Arc<dyn FrameSource>,
    pub handle: ClientHandle,
    pub echo: bool,
    pub queue: FrameProducer,
    /// Receives ISO 15765 frames for the UDS driver (CAN only)
    pub diagnostic_tap: Option<FrameProducer>,
    pub counters: Arc<ChannelCounters>,
    pub active: Arc<AtomicBool>,
    pub buffer_size: usize,
    pub read_timeout: Duration,
}

impl Reader {
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("{}-reader", self.channel.protocol_name().to_lowercase()))
            .spawn(move || self.run())
    }

    fn run(self) {
        info!("{} reader started", self.channel);
        let mut buffer = vec![0u8; self.buffer_size];

        while self.active.load(Ordering::SeqCst) {
            let len = match self.source.read(self.handle, &mut buffer, self.read_timeout) {
                Ok(0) => continue,
                Ok(len) => len,
                Err(e) => {
                    warn!("{} read error: {}", self.channel, e);
                    std::thread::sleep(READ_ERROR_BACKOFF);
                    continue;
                }
            };

            let frame = match RawFrame::from_receive_buffer(self.channel, &buffer[..len], self.echo, Instant::now()) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Dropping unreadable buffer: {}", e);
                    continue;
                }
            };
            self.counters.record_received();

            if let Some(tap) = &self.diagnostic_tap {
                if iso15765::is_diagnostic_frame(&frame) {
                    match tap.try_push(frame.clone()) {
                        Ok(()) | Err(QueueError::Closed) => {}
                        Err(QueueError::Full(_)) => debug!("Diagnostic tap full, dropping frame"),
                    }
                }
            }

            if self.queue.push_blocking(frame).is_err() {
                debug!("{} queue closed, stopping reader", self.channel);
                break;
            }
        }
        info!("{} reader stopped", self.channel);
    }
}

/// Handle for queuing transmit buffers on one channel
#[derive(Debug, Clone)]
pub struct OutboundSender {
    channel: Channel,
    tx: SyncSender<Vec<Vec<u8>>>,
}

impl OutboundSender {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Queue a buffer in the adapter's transmit format
    pub fn send(&self, message: Vec<u8>) -> Result<(), DeviceError> {
        self.send_batch(vec![message])
    }

    /// Queue buffers that must go out back to back. The batch takes one
    /// queue slot, so it is either queued whole or not at all.
    pub fn send_batch(&self, messages: Vec<Vec<u8>>) -> Result<(), DeviceError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.tx.try_send(messages).map_err(|e| {
            if let TrySendError::Full(_) = e {
                warn!("{} outbound queue full", self.channel);
            }
            DeviceError::QueueUnavailable(self.channel)
        })
    }
}

impl CanSender for OutboundSender {
    fn send_can(&self, id: CanId, data: &[u8]) -> Result<(), DeviceError> {
        if self.channel != Channel::Can {
            return Err(DeviceError::NotConnected(Channel::Can));
        }
        self.send(encode_can_message(id, data))
    }
}

/// Writer thread state
pub(crate) struct Writer {
    pub channel: Channel,
    pub source: Arc<dyn FrameSource>,
    pub handle: ClientHandle,
    pub counters: Arc<ChannelCounters>,
    pub active: Arc<AtomicBool>,
    pub poll: Duration,
    outbound: Receiver<Vec<Vec<u8>>>,
}

impl Writer {
    pub fn new(
        channel: Channel,
        source: Arc<dyn FrameSource>,
        handle: ClientHandle,
        counters: Arc<ChannelCounters>,
        active: Arc<AtomicBool>,
        poll: Duration,
    ) -> (Self, OutboundSender) {
        let (tx, outbound) = sync_channel(OUTBOUND_CAPACITY);
        (
            Self {
                channel,
                source,
                handle,
                counters,
                active,
                poll,
                outbound,
            },
            OutboundSender { channel, tx },
        )
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("{}-writer", self.channel.protocol_name().to_lowercase()))
            .spawn(move || self.run())
    }

    fn run(self) {
        while self.active.load(Ordering::SeqCst) {
            let batch = match self.outbound.recv_timeout(self.poll) {
                Ok(batch) => batch,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            for message in &batch {
                match self.source.send(self.handle, message) {
                    Ok(()) => self.counters.record_sent(),
                    Err(e) => {
                        self.counters.record_send_failure();
                        warn!("{} send failed: {}", self.channel, e);
                    }
                }
            }
        }
        debug!("{} writer stopped", self.channel);
    }
}
