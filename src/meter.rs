//! # Mercury Meter Driver
//!
//! Typed access to a Mercury 200 electricity meter: tariff energy counters,
//! instantaneous voltage/current/power, clock and serial number, plus the two
//! control commands (set clock, set port speed) and port-speed discovery.
//!
//! ```rust,no_run
//! use mercury_rs::{config::MeterConfig, Meter};
//!
//! # async fn run() -> Result<(), mercury_rs::MeterError> {
//! let config = MeterConfig::default();
//! let mut meter = Meter::open(&config)?;
//! let energy = meter.get_energy().await?;
//! println!("T1 = {} kWh", energy.tariff(mercury_rs::Tariff::T1));
//! # Ok(())
//! # }
//! ```

use crate::config::MeterConfig;
use crate::constants::{
    DATE_TIME_BODY_LEN, ENERGY_BODY_LEN, SERIAL_NUMBER_BODY_LEN, UIP_BODY_LEN,
};
use crate::error::MeterError;
use crate::host::{ClockSource, HostDateTime};
use crate::mercury::bcd::{self, BcdValue};
use crate::mercury::frame::Command;
use crate::mercury::link::HalfDuplexLink;
use crate::mercury::serial::{open_port, PortSpeed, SerialTransport};
use crate::mercury::transaction::{MeterSession, TransactionEngine};
use crate::scanner::{AddressScanner, ScanConfig};
use chrono::Month;
use log::{info, warn};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt;
use std::path::Path;

/// Tariff zones of the energy counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tariff {
    T1,
    T2,
    T3,
    T4,
}

impl Tariff {
    pub const ALL: [Tariff; 4] = [Tariff::T1, Tariff::T2, Tariff::T3, Tariff::T4];

    pub fn name(self) -> &'static str {
        match self {
            Tariff::T1 => "T1",
            Tariff::T2 => "T2",
            Tariff::T3 => "T3",
            Tariff::T4 => "T4",
        }
    }
}

/// Cumulative energy per tariff, kWh with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyReading {
    tariffs: [BcdValue; 4],
}

impl EnergyReading {
    pub fn tariff(&self, tariff: Tariff) -> BcdValue {
        self.tariffs[tariff as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tariff, BcdValue)> + '_ {
        Tariff::ALL.iter().map(move |&t| (t, self.tariff(t)))
    }
}

impl Serialize for EnergyReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Tariff::ALL.len()))?;
        for (tariff, value) in self.iter() {
            map.serialize_entry(tariff.name(), &value)?;
        }
        map.end()
    }
}

/// Instantaneous voltage, current and power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UipReading {
    /// Volts, one decimal
    #[serde(rename = "U")]
    pub voltage: BcdValue,
    /// Amperes, two decimals
    #[serde(rename = "I")]
    pub current: BcdValue,
    /// Watts
    #[serde(rename = "P")]
    pub power: BcdValue,
}

/// Day of week as the meter counts it; Sunday is 0, 7 marks a holiday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeterWeekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Holiday,
}

impl MeterWeekday {
    const TABLE: [MeterWeekday; 8] = [
        MeterWeekday::Sunday,
        MeterWeekday::Monday,
        MeterWeekday::Tuesday,
        MeterWeekday::Wednesday,
        MeterWeekday::Thursday,
        MeterWeekday::Friday,
        MeterWeekday::Saturday,
        MeterWeekday::Holiday,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::TABLE.get(index as usize).copied()
    }
}

impl fmt::Display for MeterWeekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Meter clock and calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateTimeReading {
    #[serde(rename = "dow")]
    pub weekday: MeterWeekday,
    #[serde(rename = "hh")]
    pub hour: u8,
    #[serde(rename = "mm")]
    pub minute: u8,
    #[serde(rename = "ss")]
    pub second: u8,
    #[serde(rename = "dd")]
    pub day: u8,
    #[serde(rename = "mo", serialize_with = "month_name")]
    pub month: Month,
    /// Two-digit year
    #[serde(rename = "yy")]
    pub year: u8,
}

fn month_name<S: Serializer>(month: &Month, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(month.name())
}

impl DateTimeReading {
    /// Decodes the 7-byte answer `[dow, hh, mm, ss, dd, mo, yy]`.
    pub fn from_bcd(body: &[u8]) -> Result<Self, MeterError> {
        if body.len() != DATE_TIME_BODY_LEN {
            return Err(MeterError::InvalidField(format!(
                "date/time needs {DATE_TIME_BODY_LEN} bytes, got {}",
                body.len()
            )));
        }
        let mut fields = [0u8; DATE_TIME_BODY_LEN];
        for (field, &byte) in fields.iter_mut().zip(body) {
            *field = bcd::decode_byte(byte)?;
        }
        let [dow, hour, minute, second, day, month, year] = fields;

        let weekday = MeterWeekday::from_index(dow)
            .ok_or_else(|| MeterError::InvalidField(format!("day of week {dow}")))?;
        let month = Month::try_from(month)
            .map_err(|_| MeterError::InvalidField(format!("month {month}")))?;

        Ok(DateTimeReading {
            weekday,
            hour,
            minute,
            second,
            day,
            month,
            year,
        })
    }
}

impl fmt::Display for DateTimeReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}, {}, {} {}, 20{:02}",
            self.hour,
            self.minute,
            self.second,
            self.weekday,
            self.month.name(),
            self.day,
            self.year
        )
    }
}

/// SET_DATE_TIME body for a host time.
///
/// The host counts weekdays from Monday = 0, the meter from Sunday = 0.
pub fn encode_date_time(time: &HostDateTime) -> Result<Vec<u8>, MeterError> {
    let fields = [
        (time.weekday + 1) % 7,
        time.hour,
        time.minute,
        time.second,
        time.day,
        time.month,
        (time.year % 100) as u8,
    ];
    fields
        .iter()
        .map(|&v| bcd::encode_byte(v).map_err(MeterError::from))
        .collect()
}

/// A Mercury 200 meter on the bus.
pub struct Meter<P: SerialTransport> {
    engine: TransactionEngine<P>,
}

impl Meter<tokio_serial::SerialStream> {
    /// Opens the serial port named in `config` and sets up the session.
    pub fn open(config: &MeterConfig) -> Result<Self, MeterError> {
        let speed = PortSpeed::try_from(config.port_speed)?;
        let port = open_port(&config.port, speed, config.link.read_timeout)?;
        let link = HalfDuplexLink::new(port, config.tx_control()?, config.link.clone());
        let session = MeterSession::new(config.address, speed);
        Ok(Meter::new(TransactionEngine::new(
            link,
            session,
            config.retry.clone(),
        )))
    }
}

impl<P: SerialTransport> Meter<P> {
    pub fn new(engine: TransactionEngine<P>) -> Self {
        Meter { engine }
    }

    pub fn address(&self) -> u32 {
        self.engine.session().address()
    }

    /// Speed the session believes the meter listens at.
    pub fn port_speed(&self) -> PortSpeed {
        self.engine.session().port_speed
    }

    pub fn engine(&self) -> &TransactionEngine<P> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TransactionEngine<P> {
        &mut self.engine
    }

    pub async fn get_energy(&mut self) -> Result<EnergyReading, MeterError> {
        let body = self
            .engine
            .transact(Command::GetEnergy, &[], ENERGY_BODY_LEN)
            .await?;
        let mut tariffs = [BcdValue::default(); 4];
        for (slot, chunk) in tariffs.iter_mut().zip(body.chunks(4)) {
            *slot = bcd::decode(chunk, 2)?;
        }
        Ok(EnergyReading { tariffs })
    }

    pub async fn get_uip(&mut self) -> Result<UipReading, MeterError> {
        let body = self
            .engine
            .transact(Command::GetUip, &[], UIP_BODY_LEN)
            .await?;
        Ok(UipReading {
            voltage: bcd::decode(&body[..2], 1)?,
            current: bcd::decode(&body[2..4], 2)?,
            power: bcd::decode(&body[4..], 0)?,
        })
    }

    /// Serial number, a plain big-endian integer (not BCD).
    pub async fn get_serial_number(&mut self) -> Result<u32, MeterError> {
        let body = self
            .engine
            .transact(Command::GetSerialNumber, &[], SERIAL_NUMBER_BODY_LEN)
            .await?;
        Ok(u32::from_be_bytes([body[0], body[1], body[2], body[3]]))
    }

    pub async fn get_date_time(&mut self) -> Result<DateTimeReading, MeterError> {
        let body = self
            .engine
            .transact(Command::GetDateTime, &[], DATE_TIME_BODY_LEN)
            .await?;
        DateTimeReading::from_bcd(&body)
    }

    pub async fn set_date_time(&mut self, time: &HostDateTime) -> Result<(), MeterError> {
        let body = encode_date_time(time)?;
        self.engine
            .transact(Command::SetDateTime, &body, 0)
            .await
            .map(|_| ())
    }

    /// Sets the meter clock from `clock`.
    pub async fn sync_date_time<C: ClockSource>(
        &mut self,
        clock: &mut C,
    ) -> Result<(), MeterError> {
        let now = clock.now();
        info!(
            "Setting meter clock to {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            now.year, now.month, now.day, now.hour, now.minute, now.second
        );
        self.set_date_time(&now).await
    }

    /// Switches the meter to `speed`.
    ///
    /// The acknowledgement of SET_SPEED is unreadable in practice, so the
    /// session moves to `speed` whether or not a valid answer came back. Only
    /// local serial errors are reported.
    pub async fn set_port_speed(&mut self, speed: PortSpeed) -> Result<(), MeterError> {
        let result = self
            .engine
            .transact(Command::SetSpeed, &[speed.divisor_code()], 0)
            .await;
        self.engine.set_port_speed(speed);

        match result {
            Ok(_) => info!("Port speed set to {speed}"),
            Err(e) if e.is_unreachable() => {
                warn!("No acknowledgement for port speed {speed}, assuming it was applied")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Sends SET_SPEED to `speed` at every supported speed in turn, for a
    /// meter whose current speed is unknown.
    pub async fn force_port_speed(&mut self, speed: PortSpeed) -> Result<(), MeterError> {
        for current in PortSpeed::ALL {
            self.engine.set_port_speed(current);
            self.set_port_speed(speed).await?;
            self.engine.feed_watchdog();
        }
        Ok(())
    }

    /// Tries every supported speed, fastest first, until the meter returns
    /// its serial number; the session keeps the speed that worked.
    pub async fn probe_all_speeds(&mut self) -> Result<Option<PortSpeed>, MeterError> {
        for speed in PortSpeed::ALL {
            self.engine.set_port_speed(speed);
            match self.get_serial_number().await {
                Ok(serial) => {
                    info!("Meter {serial} answers at {speed}");
                    return Ok(Some(speed));
                }
                Err(e) if e.is_unreachable() => {
                    info!("No answer at {speed}");
                    self.engine.feed_watchdog();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Starts an address scan on this meter's bus.
    ///
    /// The scan talks to the link directly and ignores the session address.
    pub async fn scanner(
        &mut self,
        log_path: &Path,
        start: u32,
        stop: u32,
        resume: bool,
        config: ScanConfig,
    ) -> Result<AddressScanner<'_, P>, MeterError> {
        AddressScanner::start(&mut self.engine, log_path, start, stop, resume, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time_decode() {
        let reading =
            DateTimeReading::from_bcd(&[0x02, 0x14, 0x30, 0x00, 0x15, 0x06, 0x24]).unwrap();
        assert_eq!(reading.weekday, MeterWeekday::Tuesday);
        assert_eq!((reading.hour, reading.minute, reading.second), (14, 30, 0));
        assert_eq!(reading.day, 15);
        assert_eq!(reading.month, Month::June);
        assert_eq!(reading.year, 24);
        assert_eq!(reading.to_string(), "14:30:00, Tuesday, June 15, 2024");
    }

    #[test]
    fn test_date_time_json_keys() {
        let reading =
            DateTimeReading::from_bcd(&[0x02, 0x14, 0x30, 0x00, 0x15, 0x06, 0x24]).unwrap();
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["dow"], "Tuesday");
        assert_eq!(json["hh"], 14);
        assert_eq!(json["mm"], 30);
        assert_eq!(json["ss"], 0);
        assert_eq!(json["dd"], 15);
        assert_eq!(json["mo"], "June");
        assert_eq!(json["yy"], 24);
    }

    #[test]
    fn test_holiday_and_bad_month() {
        let reading =
            DateTimeReading::from_bcd(&[0x07, 0x00, 0x00, 0x00, 0x01, 0x12, 0x25]).unwrap();
        assert_eq!(reading.weekday, MeterWeekday::Holiday);
        assert_eq!(reading.month, Month::December);

        let bad = DateTimeReading::from_bcd(&[0x01, 0x00, 0x00, 0x00, 0x01, 0x13, 0x25]);
        assert!(matches!(bad, Err(MeterError::InvalidField(_))));
    }

    #[test]
    fn test_encode_date_time_shifts_weekday() {
        // Sunday on the host (6) is 0 on the meter
        let time = HostDateTime {
            year: 2024,
            month: 6,
            day: 16,
            hour: 23,
            minute: 5,
            second: 9,
            weekday: 6,
        };
        assert_eq!(
            encode_date_time(&time).unwrap(),
            vec![0x00, 0x23, 0x05, 0x09, 0x16, 0x06, 0x24]
        );
    }

    #[test]
    fn test_energy_serializes_as_tariff_map() {
        let reading = EnergyReading {
            tariffs: [
                BcdValue::new(243515, 2),
                BcdValue::new(10010, 2),
                BcdValue::new(0, 2),
                BcdValue::new(0, 2),
            ],
        };
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["T1"], 2435.15);
        assert_eq!(json["T2"], 100.1);
        assert_eq!(json["T4"], 0.0);
    }
}
