//! Command-line tool for the Dyacon CM1 weather station driver.
//!
//! Prints a one-shot snapshot of the station by default. Can also poll
//! continuously, printing one packet per interval, or get and set the
//! station clock.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use dyacon_cm1::config::Cm1Config;
use dyacon_cm1::driver::Cm1Driver;
use dyacon_cm1::error::Error;
use dyacon_cm1::station::Cm1Station;
use dyacon_cm1::transport::SerialTransport;

/// Reads a Dyacon CM1 weather station over Modbus RTU.
#[derive(Parser, Debug)]
#[command(name = "dyacon-cm1")]
#[command(about = "Polls a Dyacon CM1 weather station over Modbus RTU")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the RS-485 adapter
    #[arg(long)]
    port: Option<String>,

    /// Modbus slave address (1-247)
    #[arg(long)]
    address: Option<u8>,

    /// Baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Serial read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the station clock and exit
    #[arg(long)]
    get_time: bool,

    /// Set the station clock from system time, then exit
    #[arg(long)]
    set_time: bool,

    /// Poll continuously, printing one packet per poll interval
    #[arg(long)]
    watch: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, then apply command-line overrides
    let mut config = match &args.config {
        Some(path) => Cm1Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Cm1Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.baud_rate = baud_rate;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    dyacon_cm1::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    if args.watch {
        return watch(&config);
    }

    let transport = SerialTransport::open(
        &config.port,
        config.baud_rate,
        config.address,
        Duration::from_millis(config.timeout_ms),
    )
    .context("Failed to open serial port")?;
    let mut station = Cm1Station::new(transport);

    if args.get_time {
        println!("station time: {}", station.clock()?);
        return Ok(());
    }

    if args.set_time {
        station.set_clock(Local::now().naive_local())?;
        println!("station time: {}", station.clock()?);
        return Ok(());
    }

    snapshot(&mut station)
}

/// Poll forever through the full driver, one JSON packet per line.
fn watch(config: &Cm1Config) -> Result<()> {
    let mut driver = Cm1Driver::open(config).context("Failed to open station")?;
    let interval = Duration::from_secs(config.poll_interval_secs);
    info!("Polling every {}s", config.poll_interval_secs);

    loop {
        match driver.get_reading() {
            Ok(packet) => println!("{}", serde_json::to_string(&packet)?),
            Err(e @ Error::Communication(_)) => warn!("Poll failed: {}", e),
            Err(e) => return Err(e.into()),
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}

/// Print the system block and one cycle of raw readings.
fn snapshot(station: &mut Cm1Station<SerialTransport>) -> Result<()> {
    let params = station.system_parameters()?;
    println!("system parameters:");
    println!("{}", serde_json::to_string_pretty(&params)?);

    let cycle = station.poll()?;
    println!("current values:");
    for reading in &cycle.readings {
        match reading.value {
            Some(value) if reading.unit.as_str().is_empty() => {
                println!("  {}: {}", reading.name, value);
            }
            Some(value) => println!("  {}: {} {}", reading.name, value, reading.unit),
            None => println!("  {}: no reading", reading.name),
        }
    }
    Ok(())
}
