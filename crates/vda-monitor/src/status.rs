//! Monitor status snapshot, logged as JSON

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use vda_dispatch::{ChannelHealth, Dispatcher};
use vda_link::Channel;
use vehicle_state::DtcCategory;

#[derive(Debug, Serialize)]
pub struct ChannelStatus {
    pub channel: String,
    #[serde(flatten)]
    pub health: ChannelHealth,
}

#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    pub version: String,
    pub uptime_seconds: u64,
    pub channels: Vec<ChannelStatus>,
    pub parameter_groups: usize,
    pub j1587_parameters: usize,
    pub transport_sessions: usize,
    /// VIN by source address
    pub vins: BTreeMap<String, String>,
    pub active_dtcs: Vec<String>,
    pub previous_dtcs: usize,
    /// Controllers with any lamp lit
    pub lamps_on: Vec<String>,
}

impl MonitorStatus {
    pub fn capture(dispatcher: &Dispatcher, started: Instant) -> Self {
        let j1939 = dispatcher.j1939();
        let mut active_dtcs: Vec<String> = j1939
            .dtcs()
            .table(DtcCategory::Active)
            .iter()
            .map(|(key, record)| format!("{key} from {:02X}", record.source))
            .collect();
        active_dtcs.sort();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: started.elapsed().as_secs(),
            channels: Channel::ALL
                .iter()
                .map(|&channel| ChannelStatus {
                    channel: channel.to_string(),
                    health: dispatcher.health().channel(channel).clone(),
                })
                .collect(),
            parameter_groups: j1939.parameters().len(),
            j1587_parameters: dispatcher.j1587().parameters().len(),
            transport_sessions: j1939.transport().active_sessions(),
            vins: j1939
                .vehicle()
                .vin
                .iter()
                .map(|(source, vin)| (format!("{source:02X}"), vin.clone()))
                .collect(),
            active_dtcs,
            previous_dtcs: j1939.dtcs().table(DtcCategory::Previous).len(),
            lamps_on: j1939
                .lamps()
                .iter()
                .filter(|(_, lamps)| lamps.any_on())
                .map(|(source, _)| format!("{source:02X}"))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use vda_dispatch::{ChannelRegistry, DispatchConfig, HealthConfig};
    use vda_link::{SessionSettings, SimulatedAdapter};
    use vehicle_state::ParameterDefinitions;

    #[test]
    fn test_status_reports_vin_and_active_codes() {
        let adapter = Arc::new(SimulatedAdapter::new());
        let mut registry = ChannelRegistry::new(adapter.clone(), SessionSettings::default(), DispatchConfig::default());
        registry.connect(Channel::J1939).unwrap();
        let mut dispatcher = Dispatcher::new(
            registry,
            Arc::new(ParameterDefinitions::builtin()),
            DispatchConfig::default(),
            HealthConfig::default(),
        );

        adapter.push_j1939(65260, 6, 0x00, 0xFF, b"1SIMVDA0000000001*");
        // DM1: amber lamp, SPN 100 FMI 1, one occurrence
        adapter.push_j1939(65226, 6, 0x00, 0xFF, &[0x04, 0xFF, 100, 0, 0x01, 0x01, 0xFF, 0xFF]);

        let deadline = Instant::now() + Duration::from_secs(2);
        let started = Instant::now();
        let mut status = MonitorStatus::capture(&dispatcher, started);
        while (status.vins.is_empty() || status.active_dtcs.is_empty()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            dispatcher.dispatch_once();
            status = MonitorStatus::capture(&dispatcher, started);
        }
        dispatcher.check_health();
        let status = MonitorStatus::capture(&dispatcher, started);

        assert_eq!(status.vins.get("00").map(String::as_str), Some("1SIMVDA0000000001"));
        assert_eq!(status.active_dtcs, vec!["SPN 100 FMI 1 from 00".to_string()]);
        assert_eq!(status.lamps_on, vec!["00".to_string()]);

        let json: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(json["channels"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["channels"][1]["connected"], serde_json::Value::Bool(true));
    }
}
