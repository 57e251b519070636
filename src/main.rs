//! Preset gateway binary
//!
//! Polls the foot-switch lines on a dedicated thread and serves the admin
//! page on the tokio runtime.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use preset_gw::admin::AdminMutator;
use preset_gw::api::{self, ApiState};
use preset_gw::config::{AppConfig, GpioBackend};
use preset_gw::control_loop::{shutdown_channel, ControlLoop};
use preset_gw::gpio;
use preset_gw::midi;
use preset_gw::transport::{LogTransport, MidiTransport, MidirTransport};

/// Preset Gateway - foot-switch to MIDI program change bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PRESET_GW_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Output port name (substring match, overrides config)
    #[arg(long)]
    midi_port: Option<String>,

    /// Log outgoing messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Use simulated buttons instead of GPIO lines
    #[arg(long)]
    simulate: bool,

    /// Admin server port (overrides config)
    #[arg(long)]
    api_port: Option<u16>,

    /// Do not start the admin server
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    info!("Starting Preset Gateway v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = AppConfig::load_or_default(&args.config).await?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration after CLI overrides")?;

    run_app(config).await?;

    info!("Preset Gateway shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(port) = &args.midi_port {
        config.midi.output_port = port.clone();
    }
    if args.dry_run {
        config.midi.dry_run = true;
    }
    if args.simulate {
        config.gpio.backend = GpioBackend::Simulated;
    }
    if let Some(port) = args.api_port {
        config.api.port = port;
    }
    if args.no_api {
        config.api.enabled = false;
    }
}

async fn run_app(config: AppConfig) -> Result<()> {
    let store = Arc::new(config.mapping_store()?);
    let counter = config.preset_counter();
    let timing = config.loop_timing();

    // GPIO failures are fatal: without the lines there is nothing to do.
    let (pins, simulator) = gpio::open(&config.gpio).context("Failed to initialize GPIO")?;
    info!("GPIO ready: {}", pins.describe());

    let (shutdown_handle, shutdown_signal) = shutdown_channel();

    let loop_store = store.clone();
    let midi_config = config.midi.clone();
    let loop_thread = std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || {
            // The midir connection is created on the thread that uses it.
            let transport: Box<dyn MidiTransport> = if midi_config.dry_run {
                info!("Dry run: MIDI messages will only be logged");
                Box::new(LogTransport::new())
            } else {
                let mut transport = MidirTransport::new(midi_config.output_port.clone());
                if let Err(e) = transport.connect() {
                    warn!("MIDI output not available yet ({}), will retry on first press", e);
                }
                Box::new(transport)
            };

            ControlLoop::new(pins, transport, loop_store, counter, timing).run(shutdown_signal)
        })
        .context("Failed to spawn control loop thread")?;

    let (api_stop_tx, api_stop_rx) = oneshot::channel::<()>();
    let api_task = if config.api.enabled {
        let state = Arc::new(ApiState::new(AdminMutator::new(store.clone()), simulator));
        let bind = config.api.bind.clone();
        let port = config.api.port;
        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = api_stop_rx.await;
            };
            if let Err(e) = api::start_server(state, &bind, port, shutdown).await {
                error!("Admin server failed: {:#}", e);
            }
        }))
    } else {
        info!("Admin server disabled");
        None
    };

    wait_for_shutdown().await;

    shutdown_handle.trigger();
    let _ = api_stop_tx.send(());

    match tokio::task::spawn_blocking(move || loop_thread.join()).await {
        Ok(Ok(stats)) => info!("Control loop joined ({} presses handled)", stats.presses),
        Ok(Err(_)) => error!("Control loop thread panicked"),
        Err(e) => error!("Failed to join control loop: {}", e),
    }

    if let Some(task) = api_task {
        if let Err(e) = task.await {
            warn!("Admin server task ended abnormally: {}", e);
        }
    }

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
                .with_thread_names(true),
        )
        .init();

    Ok(())
}

async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for CTRL+C ({}), shutting down", e),
    }
}

fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Output Ports ===".bold().cyan());

    match midi::list_output_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "No output ports found".dimmed()),
        Ok(ports) => {
            for (i, name) in ports.iter().enumerate() {
                println!("  {} {}", format!("[{}]", i).green(), name);
            }
        }
        Err(e) => println!("  {} {:#}", "Failed to enumerate ports:".red(), e),
    }
    println!();
}
