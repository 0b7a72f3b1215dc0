//! A/V Streamer Application
//!
//! Captures audio and video from local devices and serves them as live HTTP
//! streams. Usage: `av-streamer [config.toml]`

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_av_streamer::{
    audio::list_input_devices,
    config::{AppConfig, SourceKind},
    pipeline::Pipelines,
    shutdown::{ShutdownReason, ShutdownSignal},
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN A/V Streamer");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    if config.audio.enabled && config.audio.source == SourceKind::Device {
        println!("\n=== Available Audio Input Devices ===");
        for device in list_input_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    ID: {}", device.id);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        println!();
    }

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());

    let pipelines = Pipelines::start(&config, &shutdown)?;
    let join_timeout = Duration::from_millis(config.server.worker_join_timeout_ms);

    // Give workers a moment to open their devices and fail early
    tokio::time::sleep(Duration::from_millis(config.server.startup_grace_ms)).await;
    if shutdown.is_triggered() {
        pipelines.join_all(join_timeout);
        bail!(
            "A capture worker failed to initialize ({:?}); check the errors above",
            shutdown.reason()
        );
    }

    let server = WebServer::new(config, pipelines.clone(), shutdown.clone());
    let result = server.run().await;

    // The server can also exit on a bind error; make sure workers stop
    shutdown.trigger(ShutdownReason::Requested);
    tracing::info!("Shutting down...");
    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(join_timeout)).await?;

    result?;
    tracing::info!("Stopped");
    Ok(())
}

/// Trigger shutdown on Ctrl+C or SIGTERM
fn spawn_signal_listener(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        wait_for_signal().await;
        println!("\nSignal received, shutting down...");
        shutdown.trigger(ShutdownReason::Signal);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
