//! # Host Collaborators
//!
//! The driver depends on three pieces of the surrounding system, all injected
//! at construction instead of being reached through globals:
//!
//! - a [`Watchdog`] fed during long retries and scans,
//! - a [`ConsoleBinding`] that gives up the UART while a transaction runs,
//! - a [`ClockSource`] used to set the meter clock.

use chrono::{Datelike, FixedOffset, Offset, Timelike, Utc};

/// Liveness sink of a supervising timer.
pub trait Watchdog: Send {
    fn feed(&mut self);
}

/// Watchdog for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&mut self) {}
}

/// Interactive console sharing the meter's UART.
///
/// `detach` is called before the driver takes the port and `attach` after it
/// is done; while attached, programmatic reads from the port are unreliable.
pub trait ConsoleBinding: Send {
    fn detach(&mut self);
    fn attach(&mut self);
}

/// The port is not shared with a console.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConsole;

impl ConsoleBinding for NoConsole {
    fn detach(&mut self) {}
    fn attach(&mut self) {}
}

/// Wall-clock time as the host sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Monday = 0 .. Sunday = 6
    pub weekday: u8,
}

/// Source of the time written to the meter.
pub trait ClockSource {
    fn now(&mut self) -> HostDateTime;
}

/// System clock shifted to a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// `utc_offset_hours` east of UTC, e.g. `5` for UTC+5.
    ///
    /// Returns `None` for offsets outside ±23 h.
    pub fn new(utc_offset_hours: i32) -> Option<Self> {
        utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl ClockSource for SystemClock {
    fn now(&mut self) -> HostDateTime {
        let now = Utc::now().with_timezone(&self.offset);
        HostDateTime {
            year: now.year() as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            weekday: now.weekday().num_days_from_monday() as u8,
        }
    }
}
