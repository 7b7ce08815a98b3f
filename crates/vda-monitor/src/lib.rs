//! Heavy Vehicle Network Monitor
//!
//! Wires a diagnostic adapter to the dispatch loop, the UDS driver and the
//! status report.

mod config;
pub mod simulation;
mod status;

pub use config::{MonitorConfig, UdsSettings};
pub use status::{ChannelStatus, MonitorStatus};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize the global subscriber at `level`, optionally as JSON lines
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level = Level::from_str(level).with_context(|| format!("invalid log level {level:?}"))?;
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Heavy vehicle network monitor
#[derive(Parser, Debug)]
#[command(name = "vda-monitor", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML, JSON or YAML); `vda-monitor.*` is used when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_argument() {
        let args = Args::try_parse_from(["vda-monitor"]).unwrap();
        assert_eq!(args.config, None);

        let args = Args::try_parse_from(["vda-monitor", "--config", "truck.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("truck.toml")));

        let args = Args::try_parse_from(["vda-monitor", "-c", "truck.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("truck.toml")));
    }

    #[test]
    fn test_unknown_argument_rejected() {
        assert!(Args::try_parse_from(["vda-monitor", "--speed", "500"]).is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        assert!(init_logging("loud", false).is_err());
    }
}
