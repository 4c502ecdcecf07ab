use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use mercury_rs::logging::{log_error, log_warn};
use mercury_rs::{init_logger, log_info, Meter, MeterConfig, PortSpeed, SystemClock};
use serde::Serialize;
use std::convert::TryFrom;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mercury-cli")]
#[command(about = "CLI tool for Mercury 200 electricity meters")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial device, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,
    /// Meter network address, overrides the configuration
    #[arg(short, long)]
    address: Option<u32>,
    /// Port speed the meter listens at, overrides the configuration
    #[arg(short, long)]
    speed: Option<u32>,
    /// Log frames and retries
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Energy counters of all four tariffs, kWh
    Energy,
    /// Voltage, current and power
    Uip,
    /// Serial number
    Serial,
    /// Meter clock
    DateTime,
    /// Set the meter clock from the host clock
    SyncTime,
    /// Switch the meter to another port speed
    SetSpeed { speed: u32 },
    /// Switch the meter to another port speed from any current speed
    ForceSpeed { speed: u32 },
    /// Find the speed the meter listens at
    ProbeSpeed,
    /// Search the bus for meter addresses
    Scan {
        #[arg(long, default_value_t = 0)]
        start: u32,
        #[arg(long, default_value_t = u32::MAX)]
        stop: u32,
        /// Ignore and overwrite the existing scan log
        #[arg(long)]
        fresh: bool,
        /// Scan log, overrides the configuration
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<MeterConfig> {
    let mut config = match &cli.config {
        Some(path) => MeterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MeterConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(speed) = cli.speed {
        config.port_speed = speed;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let config = load_config(&cli)?;
    let mut meter = Meter::open(&config)
        .with_context(|| format!("opening meter {} on {}", config.address, config.port))?;

    match cli.command {
        Commands::Energy => print_json(&meter.get_energy().await?)?,
        Commands::Uip => print_json(&meter.get_uip().await?)?,
        Commands::Serial => print_json(&meter.get_serial_number().await?)?,
        Commands::DateTime => print_json(&meter.get_date_time().await?)?,
        Commands::SyncTime => {
            let mut clock = SystemClock::new(config.utc_offset_hours).ok_or_else(|| {
                anyhow!("UTC offset {} h out of range", config.utc_offset_hours)
            })?;
            meter.sync_date_time(&mut clock).await?;
            log_info("Meter clock set");
        }
        Commands::SetSpeed { speed } => {
            meter.set_port_speed(PortSpeed::try_from(speed)?).await?;
        }
        Commands::ForceSpeed { speed } => {
            meter.force_port_speed(PortSpeed::try_from(speed)?).await?;
        }
        Commands::ProbeSpeed => match meter.probe_all_speeds().await? {
            Some(speed) => print_json(&speed.as_u32())?,
            None => {
                log_error("Meter does not answer at any supported speed");
                std::process::exit(1);
            }
        },
        Commands::Scan {
            start,
            stop,
            fresh,
            log,
        } => {
            let log_path = log.unwrap_or_else(|| config.scan_log.clone());
            let mut scanner = meter
                .scanner(&log_path, start, stop, !fresh, config.scan.clone())
                .await
                .with_context(|| format!("starting scan with log {}", log_path.display()))?;

            loop {
                tokio::select! {
                    found = scanner.next() => match found? {
                        Some(found) => print_json(&found)?,
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            if scanner.next_address() <= u64::from(stop) {
                log_warn(&format!("Scan stopped before address {}", scanner.next_address()));
            }
            print_json(scanner.found())?;
        }
    }

    Ok(())
}
