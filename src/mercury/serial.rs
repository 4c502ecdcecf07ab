//! # Mercury Serial Transport
//!
//! The meter talks 8-N-1 over an RS-485 bus. This module holds the supported
//! port speeds, the [`SerialTransport`] trait the link controller is written
//! against (implemented for `tokio_serial::SerialStream` and for the in-memory
//! mock), and the ways of driving the transceiver-enable line.

use crate::constants::{BITS_PER_BYTE, SPEED_DIVISOR_BASE};
use crate::error::MeterError;
use std::convert::TryFrom;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt};

/// Port speeds the meter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortSpeed {
    Baud600,
    Baud1200,
    Baud2400,
    Baud4800,
    Baud9600,
}

impl PortSpeed {
    /// All speeds, fastest first; this is also the probing order.
    pub const ALL: [PortSpeed; 5] = [
        PortSpeed::Baud9600,
        PortSpeed::Baud4800,
        PortSpeed::Baud2400,
        PortSpeed::Baud1200,
        PortSpeed::Baud600,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            PortSpeed::Baud600 => 600,
            PortSpeed::Baud1200 => 1200,
            PortSpeed::Baud2400 => 2400,
            PortSpeed::Baud4800 => 4800,
            PortSpeed::Baud9600 => 9600,
        }
    }

    /// SET_SPEED payload: log2(9600 / speed).
    pub fn divisor_code(self) -> u8 {
        (SPEED_DIVISOR_BASE / self.as_u32()).trailing_zeros() as u8
    }

    /// Time the line needs to shift out `len` bytes at this speed.
    pub fn transmit_time(self, len: usize) -> Duration {
        let bits = len as u64 * BITS_PER_BYTE;
        Duration::from_micros(bits * 1_000_000 / self.as_u32() as u64)
    }
}

impl TryFrom<u32> for PortSpeed {
    type Error = MeterError;

    fn try_from(baud: u32) -> Result<Self, Self::Error> {
        PortSpeed::ALL
            .iter()
            .copied()
            .find(|s| s.as_u32() == baud)
            .ok_or(MeterError::UnsupportedSpeed(baud))
    }
}

impl Default for PortSpeed {
    fn default() -> Self {
        PortSpeed::Baud9600
    }
}

impl fmt::Display for PortSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} baud", self.as_u32())
    }
}

/// Serial port operations the half-duplex link needs besides plain I/O.
pub trait SerialTransport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Reconfigure the line speed.
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), MeterError>;

    /// Bytes waiting in the receive buffer.
    fn bytes_to_read(&mut self) -> Result<u32, MeterError>;

    /// Drop everything in the receive buffer.
    fn clear_input(&mut self) -> Result<(), MeterError>;

    /// Drive the RTS line, used as transceiver-enable on many adapters.
    fn set_rts(&mut self, level: bool) -> Result<(), MeterError>;
}

impl SerialTransport for tokio_serial::SerialStream {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), MeterError> {
        SerialPort::set_baud_rate(self, baud).map_err(MeterError::from)
    }

    fn bytes_to_read(&mut self) -> Result<u32, MeterError> {
        SerialPort::bytes_to_read(self).map_err(MeterError::from)
    }

    fn clear_input(&mut self) -> Result<(), MeterError> {
        SerialPort::clear(self, ClearBuffer::Input).map_err(MeterError::from)
    }

    fn set_rts(&mut self, level: bool) -> Result<(), MeterError> {
        SerialPort::write_request_to_send(self, level).map_err(MeterError::from)
    }
}

/// Opens `port_name` 8-N-1 at `speed`.
pub fn open_port(
    port_name: &str,
    speed: PortSpeed,
    timeout: Duration,
) -> Result<tokio_serial::SerialStream, MeterError> {
    tokio_serial::new(port_name, speed.as_u32())
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .timeout(timeout)
        .open_native_async()
        .map_err(|e| MeterError::SerialPortError(format!("{port_name}: {e}")))
}

/// A dedicated output that switches the RS-485 driver into transmit mode.
pub trait TxEnablePin: Send {
    fn set_active(&mut self, active: bool) -> Result<(), MeterError>;
}

/// How the transceiver-enable line is driven.
pub enum TxControl {
    /// The adapter switches direction by itself.
    Auto,
    /// RTS of the serial port.
    Rts,
    /// A separate output pin.
    Pin(Box<dyn TxEnablePin>),
}

impl fmt::Debug for TxControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxControl::Auto => write!(f, "Auto"),
            TxControl::Rts => write!(f, "Rts"),
            TxControl::Pin(_) => write!(f, "Pin"),
        }
    }
}

/// Transceiver-enable on a Raspberry Pi GPIO line.
#[cfg(feature = "raspberry-pi")]
pub struct GpioTxEnable {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "raspberry-pi")]
impl GpioTxEnable {
    /// Claims BCM pin `bcm` as an output, initially low (receive).
    pub fn new(bcm: u8) -> Result<Self, MeterError> {
        let gpio = rppal::gpio::Gpio::new()
            .map_err(|e| MeterError::SerialPortError(format!("GPIO: {e}")))?;
        let pin = gpio
            .get(bcm)
            .map_err(|e| MeterError::SerialPortError(format!("GPIO {bcm}: {e}")))?
            .into_output_low();
        Ok(Self { pin })
    }
}

#[cfg(feature = "raspberry-pi")]
impl TxEnablePin for GpioTxEnable {
    fn set_active(&mut self, active: bool) -> Result<(), MeterError> {
        if active {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}
