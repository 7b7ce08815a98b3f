//! Channel Registry
//!
//! One fixed slot per channel. A slot exists only while its client is open
//! and holds the client's queue, threads and counters; connect and
//! disconnect build and tear down a slot as a unit.

use crate::acquisition::{OutboundSender, Reader, Writer};
use crate::config::DispatchConfig;
use crate::health::ChannelCounters;
use frame_queue::FrameConsumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};
use vda_link::{Channel, ClientCommand, ClientHandle, DeviceError, FrameSource, HardwareStatus, SessionSettings};

struct ChannelSlot {
    handle: ClientHandle,
    active: Arc<AtomicBool>,
    queue: FrameConsumer,
    outbound: OutboundSender,
    counters: Arc<ChannelCounters>,
    threads: Vec<JoinHandle<()>>,
}

pub struct ChannelRegistry {
    source: Arc<dyn FrameSource>,
    settings: SessionSettings,
    config: DispatchConfig,
    slots: [Option<ChannelSlot>; 3],
    diagnostic_tap: Option<FrameConsumer>,
}

fn spawn_failed(channel: Channel, e: std::io::Error) -> DeviceError {
    DeviceError::Open {
        channel,
        reason: format!("thread spawn failed: {e}"),
    }
}

impl ChannelRegistry {
    pub fn new(source: Arc<dyn FrameSource>, settings: SessionSettings, config: DispatchConfig) -> Self {
        Self {
            source,
            settings,
            config,
            slots: [None, None, None],
            diagnostic_tap: None,
        }
    }

    /// Open a client on `channel` and start its threads.
    ///
    /// A channel whose receive filters cannot be opened is closed again and
    /// gets no queue.
    pub fn connect(&mut self, channel: Channel) -> Result<(), DeviceError> {
        if self.is_connected(channel) {
            return Ok(());
        }

        let handle = self.source.open(channel, &self.settings).map_err(|e| {
            error!("Failed to connect {}: {}", channel, e);
            e
        })?;

        let echo = match self.source.command(handle, ClientCommand::EchoTransmittedMessages(true)) {
            Ok(()) => true,
            Err(e) => {
                warn!("{} echo not enabled: {}", channel, e);
                false
            }
        };
        if let Err(e) = self.source.command(handle, ClientCommand::SetAllFiltersToPass) {
            error!("{} filters could not be set to pass: {}", channel, e);
            self.source.close(handle);
            return Err(e);
        }
        if channel == Channel::J1939 {
            if let Err(e) = self.source.command(handle, ClientCommand::SetJ1939InterpacketTime(0)) {
                warn!("J1939 inter-packet time not set: {}", e);
            }
        }

        let (producer, queue) = frame_queue::bounded(self.config.queue_capacity);
        let (tap_producer, tap) = if channel == Channel::Can {
            let (producer, consumer) = frame_queue::bounded(self.config.queue_capacity);
            (Some(producer), Some(consumer))
        } else {
            (None, None)
        };
        let active = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(ChannelCounters::new());

        let (writer, outbound) = Writer::new(
            channel,
            self.source.clone(),
            handle,
            counters.clone(),
            active.clone(),
            self.config.read_timeout(),
        );
        let writer = match writer.spawn() {
            Ok(thread) => thread,
            Err(e) => {
                self.source.close(handle);
                return Err(spawn_failed(channel, e));
            }
        };
        let reader = Reader {
            channel,
            source: self.source.clone(),
            handle,
            echo,
            queue: producer,
            diagnostic_tap: tap_producer,
            counters: counters.clone(),
            active: active.clone(),
            buffer_size: self.config.read_buffer_size,
            read_timeout: self.config.read_timeout(),
        };
        let reader = match reader.spawn() {
            Ok(thread) => thread,
            Err(e) => {
                active.store(false, Ordering::SeqCst);
                let _ = writer.join();
                self.source.close(handle);
                return Err(spawn_failed(channel, e));
            }
        };

        if tap.is_some() {
            self.diagnostic_tap = tap;
        }
        self.slots[channel.index()] = Some(ChannelSlot {
            handle,
            active,
            queue,
            outbound,
            counters,
            threads: vec![reader, writer],
        });
        info!("{} connected (echo {})", channel, if echo { "on" } else { "off" });
        Ok(())
    }

    /// Connect every channel, returning the ones that failed
    pub fn connect_all(&mut self) -> Vec<(Channel, DeviceError)> {
        Channel::ALL
            .into_iter()
            .filter_map(|channel| self.connect(channel).err().map(|e| (channel, e)))
            .collect()
    }

    /// Stop a channel's threads and close its client.
    ///
    /// Blocks for up to one read timeout while the reader finishes its
    /// current read.
    pub fn disconnect(&mut self, channel: Channel) {
        let Some(slot) = self.slots[channel.index()].take() else {
            return;
        };
        let ChannelSlot {
            handle,
            active,
            queue,
            outbound,
            counters,
            threads,
        } = slot;

        active.store(false, Ordering::SeqCst);
        // Closing the queue releases a reader blocked on a full queue
        drop(queue);
        drop(outbound);
        for thread in threads {
            if thread.join().is_err() {
                warn!("{} thread panicked", channel);
            }
        }
        self.source.close(handle);
        if channel == Channel::Can {
            self.diagnostic_tap = None;
        }
        info!(
            "{} disconnected after {:?} ({} frames received)",
            channel,
            counters.uptime(),
            counters.received()
        );
    }

    pub fn disconnect_all(&mut self) {
        for channel in Channel::ALL {
            self.disconnect(channel);
        }
    }

    pub fn is_connected(&self, channel: Channel) -> bool {
        self.slots[channel.index()].is_some()
    }

    /// Channels with an open client
    pub fn connected(&self) -> Vec<Channel> {
        Channel::ALL.into_iter().filter(|c| self.is_connected(*c)).collect()
    }

    pub fn counters(&self, channel: Channel) -> Option<&Arc<ChannelCounters>> {
        self.slots[channel.index()].as_ref().map(|slot| &slot.counters)
    }

    pub(crate) fn queue_mut(&mut self, channel: Channel) -> Option<&mut FrameConsumer> {
        self.slots[channel.index()].as_mut().map(|slot| &mut slot.queue)
    }

    /// Transmit handle for `channel`
    pub fn sender(&self, channel: Channel) -> Option<OutboundSender> {
        self.slots[channel.index()]
            .as_ref()
            .map(|slot| slot.outbound.clone())
    }

    /// Hand the ISO 15765 tap of the CAN channel to a UDS driver
    pub fn take_diagnostic_tap(&mut self) -> Option<FrameConsumer> {
        self.diagnostic_tap.take()
    }

    /// Queue a buffer for transmission on `channel`
    pub fn send(&self, channel: Channel, message: Vec<u8>) -> Result<(), DeviceError> {
        self.slots[channel.index()]
            .as_ref()
            .ok_or(DeviceError::NotConnected(channel))?
            .outbound
            .send(message)
    }

    pub fn send_batch(&self, channel: Channel, messages: Vec<Vec<u8>>) -> Result<(), DeviceError> {
        self.slots[channel.index()]
            .as_ref()
            .ok_or(DeviceError::NotConnected(channel))?
            .outbound
            .send_batch(messages)
    }

    pub fn hardware_status(&self, channel: Channel) -> Result<HardwareStatus, DeviceError> {
        let slot = self.slots[channel.index()]
            .as_ref()
            .ok_or(DeviceError::NotConnected(channel))?;
        self.source.hardware_status(slot.handle)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
