//! ==============================================================================
//! main.rs - co2 host entry point
//! ==============================================================================
//!
//! purpose:
//!     polls an MH-Z19 co2 sensor on the Pi UART every two seconds, prints
//!     each reading as a json line on stdout and, when enabled, publishes it
//!     to an mqtt broker.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - pick the sensor driver (real UART or simulated)
//!     - open the broker connection once, if enabled
//!     - run the poll loop until SIGINT / SIGTERM
//!     - close the broker connection before exiting
//!
//! relationships:
//!     - uses: config.rs (co2-host.toml), logging.rs (tracing)
//!     - uses: hal.rs (MH-Z19 driver), broker.rs (mqtt connection)
//!     - uses: report.rs (console + broker sinks), runtime.rs (poll loop)
//!
//! architecture:
//!
//!     ┌───────────────────────────────────────────────────────────────┐
//!     │                        co2 host (this file)                   │
//!     │                                                               │
//!     │   MH-Z19 ──uart──► sensor::read_co2 ──► Reading               │
//!     │                                           │                   │
//!     │                          ┌────────────────┴───────┐           │
//!     │                          ▼                        ▼           │
//!     │                   ConsoleReporter          BrokerReporter     │
//!     │                    (stdout line)           (sensor/co2, QoS1) │
//!     │                                                   │           │
//!     │                                          Broker event loop    │
//!     │                                          (background task)    │
//!     └───────────────────────────────────────────────────────────────┘
//!
//! output:
//!     stdout:  {"co2": 612, "status": "OK"}     one line per poll
//!     stderr:  logs (RUST_LOG / logging.level)
//!
//! ==============================================================================

mod broker;
mod config;
mod domain;
mod hal;
mod logging;
mod report;
mod runtime;
mod sensor;

use anyhow::Result;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration, then logging at the configured level
    let (config, config_note) = config::HostConfig::load_or_default();
    logging::init(&config.logging.level);

    tracing::info!("===========================================================");
    tracing::info!("  CO2 Host - MH-Z19 UART reader");
    tracing::info!("===========================================================");
    tracing::info!("[CONFIG] {}", config_note);
    config.log_summary();

    // step 2: signal handlers go in before the first (blocking) read
    let shutdown = shutdown_signal()?;

    // step 3: sensor driver
    let driver = hal::Mhz19::new(&config.serial);
    tracing::info!("[STARTUP] ✓ MH-Z19 reader started on {}", config.serial.device.display());

    // step 4: sinks - console always first, broker second
    let broker = config.broker.enabled.then(|| broker::Broker::connect(&config.broker));

    let mut reporters: Vec<Box<dyn report::Reporter>> = vec![Box::new(report::ConsoleReporter::stdout())];
    if let Some(broker) = &broker {
        reporters.push(Box::new(report::BrokerReporter::new(
            broker.publisher(),
            config.broker.topic.clone(),
            config.sensor.model.clone(),
        )));
    }

    // step 5: poll until interrupted
    let ticker = runtime::Ticker::every(Duration::from_secs(config.polling.interval_seconds));
    let outcome = runtime::PollLoop::new(driver, reporters, ticker).run(shutdown).await;

    // step 6: orderly shutdown
    tracing::info!("[SHUTDOWN] Stopping...");
    if let Some(broker) = broker {
        if let Err(e) = broker.shutdown().await {
            tracing::error!("[SHUTDOWN] Broker shutdown failed: {:#}", e);
        }
    }

    let poller = outcome?;
    tracing::info!("[SHUTDOWN] Poll loop {:?} after {} cycles", poller.state(), poller.cycles());

    // the runtime would wait for the stuck blocking read on drop
    if poller.read_abandoned() {
        tracing::warn!("[SHUTDOWN] Sensor read still blocked, exiting without it");
        std::process::exit(0);
    }
    Ok(())
}

/// resolves on the first SIGINT or SIGTERM.
/// handlers are registered here, not on first poll.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("[SIGNAL] SIGINT received"),
            _ = terminate.recv() => tracing::info!("[SIGNAL] SIGTERM received"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[SIGNAL] Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
}
