//! Mock serial port implementation for testing
//!
//! This module provides a mock serial port that can be used to exercise the
//! link controller, the transaction engine and the scanner without hardware,
//! plus a [`SimulatedMeter`] that answers like a real meter on one address and
//! at one port speed.

use crate::error::MeterError;
use crate::mercury::crc::verify_crc;
use crate::mercury::frame::{build_raw, peek_address, Command, Frame};
use crate::mercury::serial::{PortSpeed, SerialTransport};
use std::collections::VecDeque;
use std::convert::TryFrom;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// Produces the bytes the bus answers to one written request at a given baud.
pub type Responder = Box<dyn FnMut(&[u8], u32) -> Option<Vec<u8>> + Send>;

/// Shared handle on a meter attached to a mock port.
pub type SharedMeter = Arc<Mutex<SimulatedMeter>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock serial port that simulates bidirectional communication
#[derive(Clone)]
pub struct MockSerialPort {
    /// Data written to the port (outgoing)
    pub tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Data to be read from the port (incoming)
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Simulated errors
    pub next_error: Arc<Mutex<Option<io::Error>>>,
    baud: Arc<Mutex<u32>>,
    baud_history: Arc<Mutex<Vec<u32>>>,
    rts_history: Arc<Mutex<Vec<(bool, Instant)>>>,
    responder: Arc<Mutex<Option<Responder>>>,
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerialPort {
    pub fn new() -> Self {
        MockSerialPort {
            tx_buffer: Arc::new(Mutex::new(Vec::new())),
            rx_buffer: Arc::new(Mutex::new(VecDeque::new())),
            next_error: Arc::new(Mutex::new(None)),
            baud: Arc::new(Mutex::new(PortSpeed::default().as_u32())),
            baud_history: Arc::new(Mutex::new(Vec::new())),
            rts_history: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        lock(&self.rx_buffer).extend(data);
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        lock(&self.tx_buffer).clone()
    }

    /// Every baud rate the port was (re)initialised at, in order
    pub fn baud_history(&self) -> Vec<u32> {
        lock(&self.baud_history).clone()
    }

    /// Every level RTS was driven to, in order
    pub fn rts_history(&self) -> Vec<bool> {
        lock(&self.rts_history).iter().map(|&(level, _)| level).collect()
    }

    /// Every RTS change with the time it happened
    pub fn rts_timeline(&self) -> Vec<(bool, Instant)> {
        lock(&self.rts_history).clone()
    }

    /// Clear all buffers
    pub fn clear(&self) {
        lock(&self.tx_buffer).clear();
        lock(&self.rx_buffer).clear();
    }

    /// Set an error to be returned on the next read or write
    pub fn set_next_error(&self, error: io::Error) {
        *lock(&self.next_error) = Some(error);
    }

    /// Answer every write through `responder`
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8], u32) -> Option<Vec<u8>> + Send + 'static,
    {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    /// Put a simulated meter on the bus
    pub fn attach_meter(&self, meter: SimulatedMeter) -> SharedMeter {
        let shared = Arc::new(Mutex::new(meter));
        let handle = shared.clone();
        self.set_responder(move |request, baud| lock(&handle).respond(request, baud));
        shared
    }
}

impl SerialTransport for MockSerialPort {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), MeterError> {
        *lock(&self.baud) = baud;
        lock(&self.baud_history).push(baud);
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<u32, MeterError> {
        Ok(lock(&self.rx_buffer).len() as u32)
    }

    fn clear_input(&mut self) -> Result<(), MeterError> {
        lock(&self.rx_buffer).clear();
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), MeterError> {
        lock(&self.rts_history).push((level, Instant::now()));
        Ok(())
    }
}

// Implement AsyncRead for MockSerialPort
impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // Check for simulated error
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        // An empty buffer reads as a quiet line
        let mut rx = lock(&self.rx_buffer);
        let available = rx.len().min(buf.remaining());
        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }

        Poll::Ready(Ok(()))
    }
}

// Implement AsyncWrite for MockSerialPort
impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        // Check for simulated error
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        lock(&self.tx_buffer).extend_from_slice(buf);

        let baud = *lock(&self.baud);
        let reply = lock(&self.responder)
            .as_mut()
            .and_then(|respond| respond(buf, baud));
        if let Some(reply) = reply {
            lock(&self.rx_buffer).extend(reply);
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A Mercury 200 as seen from the bus.
///
/// Answers only requests for its own address, only when the line runs at its
/// current speed, and only when the request CRC is intact.
#[derive(Debug, Clone)]
pub struct SimulatedMeter {
    pub address: u32,
    pub speed: PortSpeed,
    pub serial_number: u32,
    pub energy: [u8; 16],
    pub uip: [u8; 7],
    pub date_time: [u8; 7],
    /// Body of the last SET_DATE_TIME received
    pub last_set_date_time: Option<Vec<u8>>,
    /// Requests still to be ignored
    pub drop_requests: u32,
    /// Requests answered so far
    pub answered: u32,
}

impl SimulatedMeter {
    pub fn new(address: u32, speed: PortSpeed) -> Self {
        SimulatedMeter {
            address,
            speed,
            serial_number: address,
            energy: [0; 16],
            uip: [0; 7],
            date_time: [0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00],
            last_set_date_time: None,
            drop_requests: 0,
            answered: 0,
        }
    }

    /// Answer for `request` received at `baud`, if the meter would answer.
    pub fn respond(&mut self, request: &[u8], baud: u32) -> Option<Vec<u8>> {
        if baud != self.speed.as_u32() || peek_address(request) != Some(self.address) {
            return None;
        }
        if !verify_crc(request) {
            return None;
        }
        let frame = Frame::from_bytes(request).ok()?;
        if self.drop_requests > 0 {
            self.drop_requests -= 1;
            return None;
        }

        let body = match Command::try_from(frame.command).ok()? {
            Command::GetSerialNumber => self.serial_number.to_be_bytes().to_vec(),
            Command::GetEnergy => self.energy.to_vec(),
            Command::GetUip => self.uip.to_vec(),
            Command::GetDateTime => self.date_time.to_vec(),
            Command::SetDateTime => {
                self.last_set_date_time = Some(frame.body.clone());
                Vec::new()
            }
            Command::SetSpeed => {
                let code = *frame.body.first()?;
                let new_speed = PortSpeed::ALL
                    .iter()
                    .copied()
                    .find(|s| s.divisor_code() == code)?;
                // Acknowledged at the old speed, then switched
                self.speed = new_speed;
                Vec::new()
            }
        };

        self.answered += 1;
        Some(build_raw(self.address, frame.command, &body))
    }
}
