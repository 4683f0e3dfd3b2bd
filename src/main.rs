//! CV GW - MIDI to multi-DAC control-voltage gateway

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cv_gw::config::AppConfig;
use cv_gw::drivers::{build_driver, DeviceDriver};
use cv_gw::producer::{self, MidiMapper};
use cv_gw::refresh::{RefreshCoordinator, RefreshMonitor};
use cv_gw::store::ChannelStore;

/// CV Gateway - drive DAC control-voltage outputs from MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// Validate the configuration, print the device layout and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports()?;
        return Ok(());
    }

    info!("Starting CV GW...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    if args.check {
        print_layout(&config)?;
        return Ok(());
    }

    run_app(config, shutdown_signal()).await?;

    info!("CV GW shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    let layout = config.layout()?;
    let range = config.value_range()?;
    let scheduler = config.scheduler()?;

    let store = Arc::new(ChannelStore::new(
        layout.total_channels(),
        range,
        config.values.neutral,
    ));
    info!(
        "Channel store: {} channels across {} devices (range {}..={})",
        store.len(),
        layout.len(),
        range.min(),
        range.max()
    );

    let drivers: Vec<Arc<dyn DeviceDriver>> = config
        .devices
        .iter()
        .enumerate()
        .map(|(i, device)| build_driver(device.display_name(i), &device.driver))
        .collect();

    let coordinator = RefreshCoordinator::new(store.clone(), &layout, drivers)?;
    coordinator.init_drivers().await?;
    let monitor = coordinator.monitor();
    info!("All drivers registered and initialized");

    // Held for the lifetime of the app; dropping it closes the port
    let _midi_connection = match &config.midi {
        Some(midi) => {
            let mapper = MidiMapper::new(store.clone(), &midi.mappings);
            match producer::connect_input(midi, mapper) {
                Ok(connection) => Some(connection),
                Err(e) => {
                    if let Err(shutdown_err) = coordinator.shutdown_drivers().await {
                        warn!("{:#}", shutdown_err);
                    }
                    return Err(e.context("MIDI input unavailable"));
                }
            }
        }
        None => {
            warn!("No MIDI input configured; outputs stay at their neutral level");
            None
        }
    };

    let handle = scheduler.spawn(coordinator);
    info!("✅ Refreshing outputs");

    let mut status = tokio::time::interval(Duration::from_millis(config.refresh.status_interval_ms));
    let stale_after = Duration::from_millis(config.refresh.stale_after_ms);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = status.tick() => report_status(&monitor, stale_after),
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping refresh");
                break;
            }
        }
    }

    let coordinator = handle.stop().await?;
    coordinator.shutdown_drivers().await?;
    info!("All drivers shut down");

    Ok(())
}

fn report_status(monitor: &RefreshMonitor, stale_after: Duration) {
    for device in monitor.stale_devices(stale_after) {
        warn!(
            "⚠️  Device {} not refreshed for over {:?} ({} skipped cycles)",
            device,
            stale_after,
            monitor.skips(device)
        );
    }

    match serde_json::to_string(&monitor.snapshot()) {
        Ok(json) => debug!(cycles = monitor.total_cycles(), devices = %json, "Refresh status"),
        Err(e) => warn!("Failed to serialize refresh status: {}", e),
    }
}

fn list_ports() -> Result<()> {
    let ports = producer::list_input_ports()?;
    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());
    if ports.is_empty() {
        println!("  {}", "(none)".yellow());
    }
    for (i, name) in ports.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i).dimmed(), name.green());
    }
    Ok(())
}

fn print_layout(config: &AppConfig) -> Result<()> {
    let layout = config.layout()?;
    let scheduler = config.scheduler()?;

    println!("\n{}", "=== Device Layout ===".bold().cyan());
    for (descriptor, device) in layout.devices().iter().zip(&config.devices) {
        println!(
            "  {} {:<12} channels {:>3}..{:<3} driver {:?}",
            descriptor.index.to_string().yellow(),
            device.display_name(descriptor.index.0),
            descriptor.offset,
            descriptor.end(),
            device.driver
        );
    }
    println!(
        "\n  Total channels: {}",
        layout.total_channels().to_string().green()
    );
    println!(
        "  Refresh: period {:?}, forced every {:?}",
        scheduler.period(),
        scheduler.forced_refresh()
    );
    if let Some(midi) = &config.midi {
        println!(
            "  MIDI: '{}' with {} mappings",
            midi.input_port,
            midi.mappings.len()
        );
    }

    println!("\n{}", "✅ Configuration valid".green().bold());
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}
