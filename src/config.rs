//! # Configuration
//!
//! Everything the driver needs to reach a meter, loadable from a JSON file.
//! Every field has a default, so a file only lists what differs:
//!
//! ```json
//! {
//!     "port": "/dev/ttyUSB0",
//!     "address": 123456,
//!     "port_speed": 600,
//!     "tx_enable": "rts",
//!     "retry": { "max_attempts": 20 },
//!     "utc_offset_hours": 5
//! }
//! ```

use crate::constants::{DEFAULT_PORT_SPEED, DEFAULT_SCAN_LOG};
use crate::error::MeterError;
use crate::mercury::link::LinkConfig;
use crate::mercury::serial::TxControl;
use crate::mercury::transaction::RetryPolicy;
use crate::scanner::ScanConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings of one meter connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Serial device of the RS-485 adapter
    pub port: String,
    /// Network address of the meter
    pub address: u32,
    /// Speed the meter is expected to listen at
    pub port_speed: u32,
    /// `auto`, `rts` or `gpio:<bcm pin>`
    pub tx_enable: String,
    pub link: LinkConfig,
    pub retry: RetryPolicy,
    pub scan: ScanConfig,
    pub scan_log: PathBuf,
    /// Time zone of the clock written to the meter
    pub utc_offset_hours: i32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        MeterConfig {
            port: "/dev/ttyUSB0".to_string(),
            address: 0,
            port_speed: DEFAULT_PORT_SPEED,
            tx_enable: "rts".to_string(),
            link: LinkConfig::default(),
            retry: RetryPolicy::default(),
            scan: ScanConfig::default(),
            scan_log: PathBuf::from(DEFAULT_SCAN_LOG),
            utc_offset_hours: 0,
        }
    }
}

impl MeterConfig {
    pub fn from_json(text: &str) -> Result<Self, MeterError> {
        serde_json::from_str(text).map_err(|e| MeterError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, MeterError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MeterError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Transceiver-enable mode named by `tx_enable`.
    pub fn tx_control(&self) -> Result<TxControl, MeterError> {
        match self.tx_enable.trim().to_ascii_lowercase().as_str() {
            "auto" | "none" => Ok(TxControl::Auto),
            "rts" => Ok(TxControl::Rts),
            other => match other.strip_prefix("gpio:") {
                Some(pin) => gpio_tx_control(pin),
                None => Err(MeterError::Config(format!("unknown tx_enable mode {other:?}"))),
            },
        }
    }
}

#[cfg(feature = "raspberry-pi")]
fn gpio_tx_control(pin: &str) -> Result<TxControl, MeterError> {
    let bcm = pin
        .parse::<u8>()
        .map_err(|_| MeterError::Config(format!("invalid GPIO pin {pin:?}")))?;
    let pin = crate::mercury::serial::GpioTxEnable::new(bcm)?;
    Ok(TxControl::Pin(Box::new(pin)))
}

#[cfg(not(feature = "raspberry-pi"))]
fn gpio_tx_control(_pin: &str) -> Result<TxControl, MeterError> {
    Err(MeterError::Config(
        "GPIO transceiver control needs the raspberry-pi feature".to_string(),
    ))
}

/// Durations written as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = MeterConfig::from_json(
            r#"{ "address": 123456, "port_speed": 600, "retry": { "max_attempts": 20 },
                 "link": { "read_timeout": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.address, 123456);
        assert_eq!(config.port_speed, 600);
        assert_eq!(config.retry.max_attempts, 20);
        assert_eq!(config.retry.inter_request_delay, Duration::from_millis(10));
        assert_eq!(config.link.read_timeout, Duration::from_millis(250));
        assert_eq!(config.link.rx_buffer_len, 50);
        assert_eq!(config.scan.checkpoint_stride, 50_000);
        assert_eq!(config.scan_log, PathBuf::from("bf.log"));
    }

    #[test]
    fn test_tx_control_modes() {
        let mut config = MeterConfig::default();
        assert!(matches!(config.tx_control(), Ok(TxControl::Rts)));
        config.tx_enable = "Auto".to_string();
        assert!(matches!(config.tx_control(), Ok(TxControl::Auto)));
        config.tx_enable = "dtr".to_string();
        assert!(matches!(config.tx_control(), Err(MeterError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            MeterConfig::from_json("{ address: "),
            Err(MeterError::Config(_))
        ));
    }
}
