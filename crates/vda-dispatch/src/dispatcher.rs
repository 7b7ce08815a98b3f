//! Dispatch Loop
//!
//! The only consumer of the channel queues and the only writer of the
//! decoded value tables. Each pass drains what is queued, within a
//! wall-clock budget, and routes every frame to its channel's decoder.

use crate::config::{DispatchConfig, HealthConfig};
use crate::error::DecodeError;
use crate::health::HealthMonitor;
use crate::registry::ChannelRegistry;
use j1587::J1587Decoder;
use j1939::{J1939Decoder, TransportConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vda_link::{Channel, RawFrame};
use vehicle_state::ParameterDefinitions;

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Frames taken off each channel queue
    pub processed: [usize; 3],
    /// Frames the decoders rejected
    pub failures: usize,
    /// Channels left with queued frames when the budget ran out
    pub backlog: [bool; 3],
    pub elapsed: Duration,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.processed.iter().sum()
    }

    pub fn backlogged(&self) -> bool {
        self.backlog.iter().any(|b| *b)
    }
}

/// Route a frame to its channel's decoder
fn decode(j1939: &mut J1939Decoder, j1587: &mut J1587Decoder, frame: &RawFrame) -> Result<(), DecodeError> {
    let channel = frame.channel;
    match channel {
        Channel::Can => j1939
            .decode_can(frame)
            .map(|_| ())
            .map_err(|source| DecodeError::J1939 { channel, source }),
        Channel::J1939 => j1939
            .decode_client(frame)
            .map(|_| ())
            .map_err(|source| DecodeError::J1939 { channel, source }),
        Channel::J1708 => j1587.decode(frame).map(|_| ()).map_err(DecodeError::from),
    }
}

pub struct Dispatcher {
    registry: ChannelRegistry,
    j1939: J1939Decoder,
    j1587: J1587Decoder,
    health: HealthMonitor,
    config: DispatchConfig,
    /// Slot drained first on the next pass
    first_slot: usize,
}

impl Dispatcher {
    pub fn new(
        registry: ChannelRegistry,
        definitions: Arc<ParameterDefinitions>,
        config: DispatchConfig,
        health: HealthConfig,
    ) -> Self {
        let health = HealthMonitor::new(health, config.backlog_warn_periods);
        Self {
            registry,
            j1939: J1939Decoder::new(TransportConfig::default(), definitions.clone()),
            j1587: J1587Decoder::new(definitions),
            health,
            config,
            first_slot: 0,
        }
    }

    /// Drain every queue within the configured budget
    pub fn dispatch_once(&mut self) -> DispatchReport {
        self.drain(self.config.budget())
    }

    /// Drain every queue, stopping once `budget` has elapsed. Frames left
    /// queued stay there for the next pass.
    pub fn drain(&mut self, budget: Duration) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::default();
        let mut exhausted = false;

        for offset in 0..Channel::ALL.len() {
            let channel = Channel::ALL[(self.first_slot + offset) % Channel::ALL.len()];
            let slot = channel.index();
            let Some(queue) = self.registry.queue_mut(channel) else {
                continue;
            };
            if exhausted {
                report.backlog[slot] = !queue.is_empty();
                continue;
            }

            while let Some(frame) = queue.try_pop() {
                report.processed[slot] += 1;
                if let Err(e) = decode(&mut self.j1939, &mut self.j1587, &frame) {
                    report.failures += 1;
                    if e.is_routine() {
                        debug!("{}", e);
                    } else {
                        warn!("Decode failed: {}", e);
                    }
                }
                if started.elapsed() >= budget {
                    exhausted = true;
                    report.backlog[slot] = !queue.is_empty();
                    break;
                }
            }
        }

        if exhausted {
            // Let the next channel go first so one busy network cannot starve the rest
            self.first_slot = (self.first_slot + 1) % Channel::ALL.len();
        }
        self.j1939.expire_sessions(Instant::now());
        for channel in Channel::ALL {
            self.health.record_backlog(channel, report.backlog[channel.index()]);
        }
        report.elapsed = started.elapsed();
        report
    }

    /// Run the connection check now
    pub fn check_health(&mut self) {
        self.health.check(&self.registry, Instant::now());
    }

    /// Run the dispatch and health periods until `shutdown` flips to true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting dispatch loop: period {:?}, budget {:?}",
            self.config.period(),
            self.config.budget()
        );
        let mut dispatch = tokio::time::interval(self.config.period());
        dispatch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = tokio::time::interval(self.health.period());
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = dispatch.tick() => {
                    let report = self.dispatch_once();
                    if report.backlogged() {
                        debug!("Dispatch budget exhausted after {} frames", report.total());
                    }
                }
                _ = health.tick() => self.check_health(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Whatever was already queued still reaches the tables
        let report = self.drain(Duration::MAX);
        info!("Dispatch loop stopped ({} frames drained on exit)", report.total());
    }

    /// Clear every decoded table
    pub fn reset(&mut self) {
        info!("Resetting decoded tables");
        self.j1939.reset();
        self.j1587.reset();
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.registry
    }

    pub fn j1939(&self) -> &J1939Decoder {
        &self.j1939
    }

    pub fn j1587(&self) -> &J1587Decoder {
        &self.j1587
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }
}
