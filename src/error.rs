//! # Mercury Error Handling
//!
//! This module defines the error types of the mercury-rs crate: [`FrameError`]
//! for structural problems with a single answer, [`BcdError`] for the packed
//! decimal codec, and [`MeterError`], the error every public operation returns.

use thiserror::Error;

/// Structural problems with one received answer.
///
/// These are recoverable: the transaction engine retries on any of them and
/// only surfaces the last one inside [`MeterError::RetriesExhausted`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Nothing arrived before the read timeout.
    #[error("no answer")]
    NoAnswer,

    /// Fewer bytes than address + command + CRC.
    #[error("too short answer of {len} bytes")]
    TooShort { len: usize },

    /// Trailing CRC does not match the CRC of the preceding bytes.
    #[error("wrong CRC: received 0x{received:04X}, calculated 0x{calculated:04X}")]
    BadCrc { received: u16, calculated: u16 },

    /// Answer came from (or claims to come from) another address.
    #[error("wrong address: expected {expected}, received {received}")]
    AddressMismatch { expected: u32, received: u32 },

    /// Answer echoes a different command code.
    #[error("wrong command: expected 0x{expected:02X}, received 0x{received:02X}")]
    CommandMismatch { expected: u8, received: u8 },

    /// Body length differs from what the command defines.
    #[error("wrong answer length: expected {expected} body bytes, received {received}")]
    LengthMismatch { expected: usize, received: usize },
}

/// Errors of the packed BCD codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcdError {
    /// The value needs more decimal digits than `width` bytes can hold.
    #[error("value {value} does not fit into {width} BCD bytes")]
    EncodeOverflow { value: u64, width: usize },

    /// A nibble outside 0..=9.
    #[error("invalid BCD byte 0x{byte:02X}")]
    InvalidDigit { byte: u8 },

    /// More digits than a 64-bit accumulator holds.
    #[error("BCD field of {len} bytes is too wide")]
    TooWide { len: usize },
}

/// Represents the different error types that can occur in the mercury-rs crate.
#[derive(Debug, Error)]
pub enum MeterError {
    /// Indicates an error related to the serial port or transceiver control.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// The meter did not give a valid answer within the retry bound.
    #[error("Meter unreachable after {attempts} attempts (last error: {last})")]
    RetriesExhausted { attempts: u32, last: FrameError },

    /// A BCD field could not be encoded or decoded.
    #[error("BCD error: {0}")]
    Bcd(#[from] BcdError),

    /// A decoded field lies outside its lookup table.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Baud rate the meter does not support.
    #[error("Unsupported port speed: {0}")]
    UnsupportedSpeed(u32),

    /// Reading or writing the scan log failed.
    #[error("Scan log error: {0}")]
    ScanLog(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MeterError {
    /// True when the meter simply did not answer properly, as opposed to a
    /// local failure (port, log file, configuration).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, MeterError::RetriesExhausted { .. })
    }
}

impl From<tokio_serial::Error> for MeterError {
    fn from(e: tokio_serial::Error) -> Self {
        MeterError::SerialPortError(e.to_string())
    }
}
