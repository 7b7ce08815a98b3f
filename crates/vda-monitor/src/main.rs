//! Heavy Vehicle Network Monitor - Main Entry Point

use anyhow::Context;
use clap::Parser;
use iso15765::UdsDriver;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use vda_dispatch::{ChannelRegistry, Dispatcher};
use vda_link::{Channel, SimulatedAdapter};
use vda_monitor::{init_logging, simulation, Args, MonitorConfig, MonitorStatus};
use vehicle_state::{ParameterDefinitions, TableEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = MonitorConfig::load(args.config.as_deref()).context("loading configuration")?;
    init_logging(&config.log_level, config.json_logs)?;

    info!("=== Heavy Vehicle Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    let started = Instant::now();

    let definitions = match &config.definitions {
        Some(path) => ParameterDefinitions::load(path)
            .with_context(|| format!("loading parameter definitions from {}", path.display()))?,
        None => ParameterDefinitions::builtin(),
    };

    if let Some(dll) = &config.session.dll_name {
        warn!("No vendor driver binding for {}; using the simulated adapter", dll);
    }
    let adapter = if config.simulated_traffic {
        SimulatedAdapter::with_traffic()
    } else {
        SimulatedAdapter::new()
    };
    let adapter = Arc::new(adapter.with_responder(simulation::vehicle_responder(config.uds.tester_address)));

    let mut registry = ChannelRegistry::new(adapter, config.session.clone(), config.dispatch.clone());
    for (channel, e) in registry.connect_all() {
        warn!("{} unavailable: {}", channel, e);
    }
    let uds = match (registry.sender(Channel::Can), registry.take_diagnostic_tap()) {
        (Some(sender), Some(tap)) => Some(UdsDriver::new(sender, tap, config.uds.driver_config())),
        _ => None,
    };

    let mut dispatcher = Dispatcher::new(
        registry,
        Arc::new(definitions),
        config.dispatch.clone(),
        config.health.clone(),
    );
    let changes = dispatcher.j1939().parameters().subscribe();
    tokio::spawn(log_changes(changes));

    let (stop, shutdown) = watch::channel(false);
    let dispatch = tokio::spawn(async move {
        dispatcher.run(shutdown).await;
        dispatcher
    });

    if let Some(mut uds) = uds.filter(|_| config.uds.identify_on_start) {
        tokio::spawn(async move {
            for (did, result) in uds.read_identification().await {
                match result {
                    Ok(data) => info!("DID {:04X}: {}", did, String::from_utf8_lossy(&data)),
                    Err(e) => debug!("DID {:04X}: {}", did, e),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");
    let _ = stop.send(true);

    let mut dispatcher = dispatch.await.context("dispatch task")?;
    info!("Final status: {}", MonitorStatus::capture(&dispatcher, started).to_json()?);

    // Joining the acquisition threads blocks
    tokio::task::spawn_blocking(move || dispatcher.registry_mut().disconnect_all())
        .await
        .context("disconnecting channels")?;

    Ok(())
}

async fn log_changes(mut changes: broadcast::Receiver<TableEvent<(u32, u8)>>) {
    loop {
        match changes.recv().await {
            Ok(TableEvent::Changed { key: (pgn, source), version }) => {
                debug!("PGN {} from {:02X} updated (version {})", pgn, source, version);
            }
            Ok(TableEvent::Reset { .. }) => info!("Parameter table reset"),
            Ok(TableEvent::AboutToChange { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Change log skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
