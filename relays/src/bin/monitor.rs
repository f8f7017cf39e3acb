//! Tapline monitor binary.
//!
//! Runs one monitor identity: accepts pipeline connections on the configured
//! listen port, relays each one to this identity's destination target, and
//! audits every forwarded chunk to the identity's CSV log.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tapline_relays::{MonitorConfig, MonitorRelay, TargetId};
use tracing::info;

/// Config file used when TAPLINE_CONFIG is not set.
const DEFAULT_CONFIG_PATH: &str = "monitor.toml";
const CONFIG_ENV_VAR: &str = "TAPLINE_CONFIG";

#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Intercepting TCP relay that audits every forwarded chunk")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Monitor identity selecting the destination target and audit log (1 or 2)
    #[arg(value_name = "IDENTITY", value_parser = TargetId::from_arg)]
    identity: TargetId,
}

#[tokio::main]
async fn main() -> Result<()> {
    // The identity argument is validated before anything else; any other
    // argv shape prints usage and exits 1.
    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        // Value errors render without clap's usage block; every rejected
        // argv shape must still show usage on stderr.
        if matches!(
            err.kind(),
            ErrorKind::InvalidValue | ErrorKind::ValueValidation
        ) {
            eprintln!("{}", Args::command().render_usage());
        }
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tapline_relays=info".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let identity = args.identity;
    info!("🚀 Starting Tapline monitor as {}", identity);

    let config_path = std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = MonitorConfig::from_file(&config_path).with_context(|| {
        format!(
            "failed to load monitor configuration from {}",
            config_path.display()
        )
    })?;

    let destination = config.destination_for(identity)?;
    info!(
        "📋 Forwarding port {} to {} (audit log {})",
        config.listen_port,
        destination,
        config.log_path_for(identity)?.display()
    );

    let relay = MonitorRelay::bind(&config, identity).await?;
    info!("✅ Monitor {} listening on {}", relay.target(), relay.local_addr());

    tokio::select! {
        result = relay.run() => result.context("relay terminated unexpectedly")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping monitor");
        }
    }

    Ok(())
}
