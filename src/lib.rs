//! # mercury-rs - A Rust Crate for Mercury 200 Electricity Meters
//!
//! Driver for Mercury 200 single-phase meters reached over a half-duplex
//! RS-485 bus through a serial port.
//!
//! ## Features
//!
//! - Read tariff energy counters, voltage/current/power, serial number and clock
//! - Set the meter clock from the host clock
//! - Change the meter port speed, force it when the current speed is unknown,
//!   and find the speed a meter listens at
//! - Scan the 32-bit address space for meters, resumable through a plain
//!   text log
//! - Mock serial port and simulated meter for tests without hardware
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mercury_rs::{MeterConfig, Meter, Tariff};
//!
//! # async fn run() -> Result<(), mercury_rs::MeterError> {
//! let config = MeterConfig::load(std::path::Path::new("meter.json"))?;
//! let mut meter = Meter::open(&config)?;
//! let energy = meter.get_energy().await?;
//! println!("{}", energy.tariff(Tariff::T1));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod host;
pub mod logging;
pub mod mercury;
pub mod meter;
pub mod scanner;
pub mod util;

pub use crate::config::MeterConfig;
pub use crate::error::{BcdError, FrameError, MeterError};
pub use crate::logging::{init_logger, log_info};

pub use host::{ClockSource, ConsoleBinding, HostDateTime, SystemClock, Watchdog};
pub use mercury::{BcdValue, Command, PortSpeed, RetryPolicy, TransactionEngine};
pub use meter::{DateTimeReading, EnergyReading, Meter, MeterWeekday, Tariff, UipReading};
pub use scanner::{AddressScanner, DiscoveredAddress, ScanConfig, ScanObserver, ScanProgress};
