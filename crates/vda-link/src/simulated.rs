//! Simulated Adapter
//!
//! Stands in for a vendor driver in tests and when no hardware is present.
//! Receive buffers are scripted per channel; when traffic generation is on,
//! an empty channel synthesizes engine data instead of idling.

use crate::error::DeviceError;
use crate::frame::{encode_can_message, CanId};
use crate::source::{ClientCommand, ClientHandle, FrameSource, SessionSettings};
use crate::status::HardwareStatus;
use crate::{Channel, ReturnCode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Hook that answers transmitted buffers with receive bodies on the same channel
pub type Responder = Box<dyn Fn(Channel, &[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Longest a read sleeps when nothing is queued
const IDLE_READ: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Client {
    echo: bool,
    /// Pending receive bodies and their echo flag
    pending: VecDeque<(Vec<u8>, bool)>,
    sent: Vec<Vec<u8>>,
    commands: Vec<ClientCommand>,
    delivered: u64,
}

/// In-memory adapter implementing [`FrameSource`]
#[derive(Default)]
pub struct SimulatedAdapter {
    clients: Mutex<HashMap<Channel, Client>>,
    unavailable: HashSet<Channel>,
    responder: Option<Responder>,
    traffic: bool,
    generated: AtomicU64,
    clock_ms: AtomicU64,
}

impl SimulatedAdapter {
    /// Adapter with every channel available and nothing scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter that synthesizes traffic on idle channels
    pub fn with_traffic() -> Self {
        info!("Creating simulated adapter with generated traffic");
        Self {
            traffic: true,
            ..Self::default()
        }
    }

    /// Refuse to open `channel`
    pub fn unavailable(mut self, channel: Channel) -> Self {
        self.unavailable.insert(channel);
        self
    }

    /// Answer transmitted buffers through `responder`
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Queue a receive body (everything after the timestamp/echo header)
    pub fn push_body(&self, channel: Channel, body: Vec<u8>) {
        self.lock().entry(channel).or_default().pending.push_back((body, false));
    }

    /// Queue a 29-bit CAN frame
    pub fn push_can(&self, id: u32, data: &[u8]) {
        self.push_body(Channel::Can, encode_can_message(CanId::extended(id), data));
    }

    /// Queue a parameter group on the J1939 client
    pub fn push_j1939(&self, pgn: u32, priority: u8, source: u8, destination: u8, data: &[u8]) {
        let mut body = pgn.to_le_bytes()[..3].to_vec();
        body.extend_from_slice(&[priority, source, destination]);
        body.extend_from_slice(data);
        self.push_body(Channel::J1939, body);
    }

    /// Queue a J1708 message (MID first, no checksum)
    pub fn push_j1708(&self, message: &[u8]) {
        self.push_body(Channel::J1708, message.to_vec());
    }

    /// Buffers transmitted on `channel`
    pub fn sent(&self, channel: Channel) -> Vec<Vec<u8>> {
        self.lock().get(&channel).map(|c| c.sent.clone()).unwrap_or_default()
    }

    /// Commands issued on `channel`
    pub fn commands(&self, channel: Channel) -> Vec<ClientCommand> {
        self.lock()
            .get(&channel)
            .map(|c| c.commands.clone())
            .unwrap_or_default()
    }

    /// Receive bodies still waiting to be read on `channel`
    pub fn pending(&self, channel: Channel) -> usize {
        self.lock().get(&channel).map(|c| c.pending.len()).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Channel, Client>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channel_of(handle: ClientHandle) -> Result<Channel, DeviceError> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.index() as i16 + 1 == handle.0)
            .ok_or(DeviceError::Driver {
                code: ReturnCode::InvalidClientId,
            })
    }

    fn synthesize(&self, channel: Channel) -> Vec<u8> {
        let count = self.generated.fetch_add(1, Ordering::Relaxed);
        let rpm = 800 + (count % 1200) as u16;
        match channel {
            // EEC1 engine speed, 0.125 rpm/bit
            Channel::Can => {
                let raw = (rpm * 8).to_le_bytes();
                encode_can_message(
                    CanId::extended(0x0CF0_0400),
                    &[0xF0, 0x7D, 0x7D, raw[0], raw[1], 0x00, 0xF0, 0x7D],
                )
            }
            // CCVS wheel based speed, 1/256 km/h per bit
            Channel::J1939 => {
                let speed = ((60 + count % 30) as u16 * 256).to_le_bytes();
                let mut body = vec![0xF1, 0xFE, 0x00, 0x06, 0x00, 0xFF];
                body.extend_from_slice(&[0xFF, speed[0], speed[1], 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
                body
            }
            // MID 128 engine, PID 190 engine speed at 0.25 rpm/bit
            Channel::J1708 => {
                let raw = (rpm * 4).to_le_bytes();
                vec![0x80, 190, raw[0], raw[1]]
            }
        }
    }
}

impl FrameSource for SimulatedAdapter {
    fn open(&self, channel: Channel, settings: &SessionSettings) -> Result<ClientHandle, DeviceError> {
        if self.unavailable.contains(&channel) {
            return Err(DeviceError::Open {
                channel,
                reason: ReturnCode::InvalidDevice.description().to_string(),
            });
        }
        debug!(
            "Simulated client connect: {}",
            channel.connect_string(&settings.speed)
        );
        self.lock().entry(channel).or_default();
        Ok(ClientHandle(channel.index() as i16 + 1))
    }

    fn read(&self, handle: ClientHandle, buffer: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        let channel = Self::channel_of(handle)?;
        let (next, echo) = {
            let mut clients = self.lock();
            let client = clients.entry(channel).or_default();
            let next = client.pending.pop_front();
            if next.is_some() {
                client.delivered += 1;
            }
            (next, client.echo)
        };

        let (body, echoed) = match next {
            Some(entry) => entry,
            // paced to roughly one generated frame per idle read
            None if self.traffic => {
                std::thread::sleep(timeout.min(IDLE_READ));
                (self.synthesize(channel), false)
            }
            None => {
                std::thread::sleep(timeout.min(IDLE_READ));
                return Ok(0);
            }
        };

        let timestamp = self.clock_ms.fetch_add(1, Ordering::Relaxed) as u32;
        let mut message = timestamp.to_be_bytes().to_vec();
        if echo {
            message.push(u8::from(echoed));
        }
        message.extend_from_slice(&body);

        let len = message.len().min(buffer.len());
        buffer[..len].copy_from_slice(&message[..len]);
        Ok(len)
    }

    fn send(&self, handle: ClientHandle, message: &[u8]) -> Result<(), DeviceError> {
        let channel = Self::channel_of(handle)?;
        let responses = self
            .responder
            .as_ref()
            .map(|respond| respond(channel, message))
            .unwrap_or_default();

        let mut clients = self.lock();
        let client = clients.entry(channel).or_default();
        client.sent.push(message.to_vec());
        if client.echo {
            // J1708 transmit buffers lead with a priority byte the receive side drops
            let body = match channel {
                Channel::J1708 => message.get(1..).unwrap_or_default().to_vec(),
                _ => message.to_vec(),
            };
            client.pending.push_back((body, true));
        }
        client.pending.extend(responses.into_iter().map(|body| (body, false)));
        Ok(())
    }

    fn command(&self, handle: ClientHandle, command: ClientCommand) -> Result<(), DeviceError> {
        let channel = Self::channel_of(handle)?;
        if matches!(command, ClientCommand::SetJ1939InterpacketTime(_)) && channel != Channel::J1939 {
            return Err(ReturnCode::InvalidCommand.into());
        }
        let mut clients = self.lock();
        let client = clients.entry(channel).or_default();
        if let ClientCommand::EchoTransmittedMessages(on) = command {
            client.echo = on;
        }
        client.commands.push(command);
        Ok(())
    }

    fn hardware_status(&self, handle: ClientHandle) -> Result<HardwareStatus, DeviceError> {
        Self::channel_of(handle)?;
        let clients = self.lock();
        let mut status = HardwareStatus {
            device_located: true,
            external: true,
            clients: clients.len() as u8,
            ..HardwareStatus::default()
        };
        for (channel, client) in clients.iter() {
            let link = status.link_mut(*channel);
            link.activated = true;
            link.traffic_detected = client.delivered > 0 || self.traffic;
            link.clients = 1;
        }
        Ok(status)
    }

    fn close(&self, handle: ClientHandle) {
        if let Ok(channel) = Self::channel_of(handle) {
            debug!("Simulated client disconnect: {}", channel);
            self.lock().remove(&channel);
        }
    }
}
