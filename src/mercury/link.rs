//! # Half-Duplex Link Controller
//!
//! Owns the serial port, the transceiver-enable line and the console binding.
//! Every exchange happens inside a [`LinkGuard`] obtained from
//! [`HalfDuplexLink::acquire`]: acquiring detaches the console and
//! reinitialises the UART at the session speed, dropping the guard attaches
//! the console again. Release therefore also happens on `?` and on a dropped
//! future.

use crate::constants::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_RX_BUFFER_LEN};
use crate::error::MeterError;
use crate::host::{ConsoleBinding, NoConsole};
use crate::mercury::serial::{PortSpeed, SerialTransport, TxControl};
use crate::util::hex::encode_hex;
use log::debug;
use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout, Instant};

/// UART settings applied on every acquire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long to wait for an answer to complete.
    #[serde(with = "crate::config::duration_ms")]
    pub read_timeout: Duration,
    /// Upper bound of a single read.
    pub rx_buffer_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            rx_buffer_len: DEFAULT_RX_BUFFER_LEN,
        }
    }
}

/// Exclusive owner of the bus hardware.
pub struct HalfDuplexLink<P: SerialTransport> {
    port: P,
    tx_control: TxControl,
    console: Box<dyn ConsoleBinding>,
    config: LinkConfig,
    speed: PortSpeed,
    acquired: bool,
}

impl<P: SerialTransport> HalfDuplexLink<P> {
    pub fn new(port: P, tx_control: TxControl, config: LinkConfig) -> Self {
        HalfDuplexLink {
            port,
            tx_control,
            console: Box::new(NoConsole),
            config,
            speed: PortSpeed::default(),
            acquired: false,
        }
    }

    /// Replace the console binding handed the port back after each exchange.
    pub fn with_console(mut self, console: Box<dyn ConsoleBinding>) -> Self {
        self.console = console;
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Speed the UART was last initialised at.
    pub fn speed(&self) -> PortSpeed {
        self.speed
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Direct access to the transport, e.g. for inspecting a mock.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Takes the UART from the console and initialises it at `speed`.
    pub fn acquire(&mut self, speed: PortSpeed) -> Result<LinkGuard<'_, P>, MeterError> {
        self.console.detach();
        self.acquired = true;
        let mut guard = LinkGuard { link: self };
        guard.link.init_uart(speed)?;
        Ok(guard)
    }

    fn init_uart(&mut self, speed: PortSpeed) -> Result<(), MeterError> {
        self.port.set_baud_rate(speed.as_u32())?;
        self.port.clear_input()?;
        self.speed = speed;
        Ok(())
    }

    fn release(&mut self) {
        self.acquired = false;
        self.console.attach();
    }

    fn set_tx_enable(&mut self, active: bool) -> Result<(), MeterError> {
        match &mut self.tx_control {
            TxControl::Auto => Ok(()),
            TxControl::Rts => self.port.set_rts(active),
            TxControl::Pin(pin) => pin.set_active(active),
        }
    }
}

/// Scope of one exchange on the bus.
pub struct LinkGuard<'a, P: SerialTransport> {
    link: &'a mut HalfDuplexLink<P>,
}

impl<P: SerialTransport> LinkGuard<'_, P> {
    /// Sends `data` with the transceiver enabled.
    ///
    /// There is no transmit-complete signal, so the line stays enabled for
    /// the computed shift-out time of `data` before it is handed back to the
    /// meter.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), MeterError> {
        debug!("TX {}", encode_hex(data));
        self.link.set_tx_enable(true)?;

        let written = self.write_and_wait(data).await;
        let lowered = self.link.set_tx_enable(false);
        written?;
        lowered
    }

    async fn write_and_wait(&mut self, data: &[u8]) -> Result<(), MeterError> {
        let port = &mut self.link.port;
        port.write_all(data)
            .await
            .map_err(|e| MeterError::SerialPortError(e.to_string()))?;
        port.flush()
            .await
            .map_err(|e| MeterError::SerialPortError(e.to_string()))?;
        sleep(self.link.speed.transmit_time(data.len())).await;
        Ok(())
    }

    /// Reads up to `len` bytes, stopping early at the read timeout or when the
    /// line goes quiet.
    pub async fn read_answer(&mut self, len: usize) -> Result<Vec<u8>, MeterError> {
        let len = len.min(self.link.config.rx_buffer_len);
        let deadline = Instant::now() + self.link.config.read_timeout;
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.link.port.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(MeterError::SerialPortError(e.to_string())),
                Err(_) => break,
            }
        }

        buf.truncate(filled);
        debug!("RX {}", encode_hex(&buf));
        Ok(buf)
    }

    /// True if anything at all arrived; the receive buffer is emptied.
    pub fn take_any_input(&mut self) -> Result<bool, MeterError> {
        let pending = self.link.port.bytes_to_read()? > 0;
        if pending {
            self.link.port.clear_input()?;
        }
        Ok(pending)
    }
}

impl<P: SerialTransport> Deref for LinkGuard<'_, P> {
    type Target = HalfDuplexLink<P>;

    fn deref(&self) -> &Self::Target {
        self.link
    }
}

impl<P: SerialTransport> DerefMut for LinkGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.link
    }
}

impl<P: SerialTransport> Drop for LinkGuard<'_, P> {
    fn drop(&mut self) {
        self.link.release();
    }
}
