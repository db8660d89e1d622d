//! # MSP Bridge
//!
//! Connects to MultiWii/Cleanflight flight-controller firmware over a
//! serial link, initialises an MSP session and streams live status.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load configuration (path from argv, default `config/default.toml`)
//!    - Open the serial device and wait for the board to answer
//!    - Initialise the session (identity, sensors, boxes, channel map)
//!
//! 2. **Main Loop**
//!    - Subscribe to periodic status and attitude telemetry
//!    - Drive the dispatch pump one message at a time
//!    - Handle Ctrl+C for graceful shutdown

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use msp_bridge::config::Config;
use msp_bridge::fc::FlightController;
use msp_bridge::msp::messages::{Attitude, Status};

/// Status request period for the telemetry subscription
const STATUS_PERIOD: Duration = Duration::from_millis(1000);

/// Attitude request period for the telemetry subscription
const ATTITUDE_PERIOD: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("MSP Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load {} ({}), using defaults", config_path, e);
            Config::default()
        }
    };

    let mut fc = FlightController::connect(&config)?;
    info!("Waiting for the board to answer on {}", config.serial.port);
    fc.wait_for_connection().await?;
    fc.initialise().await?;

    info!(
        "Firmware: {}",
        if fc.is_firmware_cleanflight() { "Cleanflight" } else { "MultiWii" }
    );
    info!(
        "Sensors: accelerometer={} barometer={} magnetometer={} gps={} sonar={}",
        fc.has_accelerometer(),
        fc.has_barometer(),
        fc.has_magnetometer(),
        fc.has_gps(),
        fc.has_sonar()
    );
    info!("Boxes: {:?}", fc.box_name_ids().keys().collect::<Vec<_>>());

    fc.subscribe::<Status, _>(
        |status| {
            info!(
                "Status: cycle {} us, i2c errors {}, active boxes 0x{:08X}",
                status.cycle_time, status.i2c_errors, status.active_boxes
            );
        },
        Some(STATUS_PERIOD),
    );
    fc.subscribe::<Attitude, _>(
        |attitude| {
            info!(
                "Attitude: roll {:.1} pitch {:.1} heading {}",
                attitude.roll, attitude.pitch, attitude.heading
            );
        },
        Some(ATTITUDE_PERIOD),
    );

    info!("Entering dispatch loop, press Ctrl+C to exit");

    let mut message_count: u64 = 0;

    // Main dispatch loop: one message per cycle, caller-controlled
    loop {
        tokio::select! {
            result = fc.handle() => {
                match result {
                    Ok(_) => message_count += 1,
                    Err(e) => {
                        warn!("Dispatch cycle failed: {}", e);
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Total messages dispatched: {}", message_count);
    Ok(())
}
