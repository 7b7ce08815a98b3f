//! Network Health Monitor

use crate::config::HealthConfig;
use crate::registry::ChannelRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vda_link::{Channel, HardwareStatus, GLOBAL_ADDRESS, TOOL_ADDRESS};

/// Counters shared between a channel's threads and the monitor
#[derive(Debug)]
pub struct ChannelCounters {
    received: AtomicU64,
    sent: AtomicU64,
    send_failures: AtomicU64,
    started: Instant,
}

impl ChannelCounters {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames read since the channel connected
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Time since the channel connected
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ChannelCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Status of one channel as of the last check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub connected: bool,
    /// Traffic arrived since the previous check
    pub online: bool,
    pub message_count: u64,
    /// Frames per second since the previous check
    pub rate: f64,
    /// Time since the channel connected
    pub duration: Duration,
    /// Consecutive dispatch periods that ended with frames left queued
    pub backlog_periods: u32,
}

/// Periodic connection check
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    backlog_warn_periods: u32,
    channels: [ChannelHealth; 3],
    /// Counters seen at the previous check; a new connection brings new ones
    counters: [Option<Arc<ChannelCounters>>; 3],
    last_check: Option<Instant>,
    hardware: Option<HardwareStatus>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, backlog_warn_periods: u32) -> Self {
        Self {
            config,
            backlog_warn_periods,
            channels: Default::default(),
            counters: Default::default(),
            last_check: None,
            hardware: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.config.period()
    }

    /// Record the outcome of one dispatch pass for `channel`
    pub fn record_backlog(&mut self, channel: Channel, backlogged: bool) {
        let health = &mut self.channels[channel.index()];
        if !backlogged {
            if health.backlog_periods >= self.backlog_warn_periods {
                info!("{} backlog cleared after {} periods", channel, health.backlog_periods);
            }
            health.backlog_periods = 0;
            return;
        }
        health.backlog_periods += 1;
        if health.backlog_periods == self.backlog_warn_periods {
            warn!(
                "{} dispatch backlog for {} consecutive periods",
                channel, health.backlog_periods
            );
        }
    }

    /// Update per-channel status and issue the periodic time requests
    pub fn check(&mut self, registry: &ChannelRegistry, now: Instant) {
        let elapsed = self
            .last_check
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_check = Some(now);

        for channel in Channel::ALL {
            match registry.counters(channel) {
                Some(counters) => self.observe(channel, counters, elapsed),
                None => {
                    if self.channels[channel.index()].connected {
                        info!("{} disconnected", channel);
                    }
                    self.channels[channel.index()] = ChannelHealth::default();
                    self.counters[channel.index()] = None;
                }
            }
        }

        self.refresh_hardware(registry);
        self.send_time_requests(registry);
    }

    fn observe(&mut self, channel: Channel, counters: &Arc<ChannelCounters>, elapsed: Duration) {
        let seen = &mut self.counters[channel.index()];
        let health = &mut self.channels[channel.index()];
        if !seen.as_ref().is_some_and(|previous| Arc::ptr_eq(previous, counters)) {
            // reconnected since the last check, the new counters start from zero
            health.message_count = 0;
            *seen = Some(counters.clone());
        }

        let count = counters.received();
        let delta = count.saturating_sub(health.message_count);
        let online = delta > 0;
        if online != health.online {
            if online {
                info!("{} network online", channel);
            } else {
                info!("{} network unavailable", channel);
            }
        }

        health.connected = true;
        health.online = online;
        health.rate = if elapsed.is_zero() {
            0.0
        } else {
            delta as f64 / elapsed.as_secs_f64()
        };
        health.message_count = count;
        health.duration = counters.uptime();
        debug!(
            "{}: {} frames, {:.1}/s, connected {:?}",
            channel, count, health.rate, health.duration
        );
    }

    fn refresh_hardware(&mut self, registry: &ChannelRegistry) {
        let Some(channel) = Channel::ALL.into_iter().find(|c| registry.is_connected(*c)) else {
            self.hardware = None;
            return;
        };
        match registry.hardware_status(channel) {
            Ok(status) => self.hardware = Some(status),
            Err(e) => debug!("Hardware status unavailable: {}", e),
        }
    }

    fn send_time_requests(&self, registry: &ChannelRegistry) {
        if self.config.j1587_time_requests && registry.is_connected(Channel::J1708) {
            for pid in [j1587::pids::CLOCK, j1587::pids::DATE] {
                if let Err(e) = registry.send_j1587_request(pid, j1587::DEFAULT_TOOL_MID) {
                    warn!("J1587 request for PID {} failed: {}", pid, e);
                }
            }
        }
        if self.config.j1939_time_requests
            && (registry.is_connected(Channel::J1939) || registry.is_connected(Channel::Can))
        {
            if let Err(e) = registry.send_j1939_request(j1939::pgn::TIME_DATE, GLOBAL_ADDRESS, TOOL_ADDRESS) {
                warn!("J1939 Time/Date request failed: {}", e);
            }
        }
    }

    pub fn channel(&self, channel: Channel) -> &ChannelHealth {
        &self.channels[channel.index()]
    }

    /// Adapter status from the last check
    pub fn hardware(&self) -> Option<&HardwareStatus> {
        self.hardware.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_counting() {
        let mut monitor = HealthMonitor::new(HealthConfig::default(), 3);
        for _ in 0..4 {
            monitor.record_backlog(Channel::Can, true);
        }
        assert_eq!(monitor.channel(Channel::Can).backlog_periods, 4);
        monitor.record_backlog(Channel::Can, false);
        assert_eq!(monitor.channel(Channel::Can).backlog_periods, 0);
        assert_eq!(monitor.channel(Channel::J1708).backlog_periods, 0);
    }

    #[test]
    fn test_counters() {
        let counters = ChannelCounters::new();
        counters.record_received();
        counters.record_received();
        counters.record_sent();
        counters.record_send_failure();
        assert_eq!(counters.received(), 2);
        assert_eq!(counters.sent(), 1);
        assert_eq!(counters.send_failures(), 1);
    }

    #[test]
    fn test_reconnect_between_checks_stays_online() {
        let mut monitor = HealthMonitor::new(HealthConfig::default(), 3);
        let period = Duration::from_secs(1);
        let first = Arc::new(ChannelCounters::new());
        for _ in 0..50 {
            first.record_received();
        }
        monitor.observe(Channel::Can, &first, period);
        assert!(monitor.channel(Channel::Can).online);
        assert_eq!(monitor.channel(Channel::Can).message_count, 50);

        // fresh counters after a reconnect, with less traffic than before
        let second = Arc::new(ChannelCounters::new());
        for _ in 0..5 {
            second.record_received();
        }
        monitor.observe(Channel::Can, &second, period);
        let health = monitor.channel(Channel::Can);
        assert!(health.online);
        assert_eq!(health.message_count, 5);
        assert_eq!(health.rate, 5.0);

        // same connection, no new traffic
        monitor.observe(Channel::Can, &second, period);
        assert!(!monitor.channel(Channel::Can).online);
    }
}
