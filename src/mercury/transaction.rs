//! # Transaction Engine
//!
//! One request/answer exchange with bounded blind retry. The bus is lossy and
//! answers carry no sequence numbers, so an answer is accepted purely on
//! structure (CRC, address echo, command echo, length) and anything else is
//! retried after the inter-request interval.

use crate::constants::{DEFAULT_INTER_REQUEST_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use crate::error::{FrameError, MeterError};
use crate::host::{NoWatchdog, Watchdog};
use crate::logging::log_frame;
use crate::mercury::frame::{build_request, frame_len, parse_response, Command};
use crate::mercury::link::HalfDuplexLink;
use crate::mercury::serial::{PortSpeed, SerialTransport};
use log::warn;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry policy of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before the meter counts as unreachable.
    pub max_attempts: u32,
    /// Pause after every exchange; the meter ignores requests sent too soon.
    #[serde(with = "crate::config::duration_ms")]
    pub inter_request_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            inter_request_delay: Duration::from_millis(DEFAULT_INTER_REQUEST_DELAY_MS),
        }
    }
}

/// Who is on the other end and how fast it listens.
///
/// `port_speed` must always match the speed the meter actually uses; every
/// acquire initialises the UART from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSession {
    address: u32,
    pub port_speed: PortSpeed,
}

impl MeterSession {
    pub fn new(address: u32, port_speed: PortSpeed) -> Self {
        MeterSession {
            address,
            port_speed,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }
}

/// Counters over the lifetime of an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub transactions: u64,
    pub succeeded: u64,
    pub attempts: u64,
    pub failed_attempts: u64,
    pub last_error: Option<FrameError>,
}

/// Request/answer exchanges with one meter.
pub struct TransactionEngine<P: SerialTransport> {
    link: HalfDuplexLink<P>,
    session: MeterSession,
    policy: RetryPolicy,
    watchdog: Box<dyn Watchdog>,
    stats: TransactionStats,
}

impl<P: SerialTransport> TransactionEngine<P> {
    pub fn new(link: HalfDuplexLink<P>, session: MeterSession, policy: RetryPolicy) -> Self {
        TransactionEngine {
            link,
            session,
            policy,
            watchdog: Box::new(NoWatchdog),
            stats: TransactionStats::default(),
        }
    }

    pub fn with_watchdog(mut self, watchdog: Box<dyn Watchdog>) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn session(&self) -> &MeterSession {
        &self.session
    }

    pub fn set_port_speed(&mut self, speed: PortSpeed) {
        self.session.port_speed = speed;
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    pub fn link(&self) -> &HalfDuplexLink<P> {
        &self.link
    }

    pub fn feed_watchdog(&mut self) {
        self.watchdog.feed();
    }

    /// Sends `command` and returns the body of the first valid answer.
    ///
    /// Fails with [`MeterError::RetriesExhausted`] after `max_attempts` bad
    /// or missing answers; serial I/O errors end the transaction at once.
    pub async fn transact(
        &mut self,
        command: Command,
        body: &[u8],
        expected_body_len: usize,
    ) -> Result<Vec<u8>, MeterError> {
        let address = self.session.address();
        let request = build_request(address, command, body);
        let mut last = FrameError::NoAnswer;
        self.stats.transactions += 1;

        for attempt in 1..=self.policy.max_attempts {
            self.stats.attempts += 1;
            let answer = {
                let mut link = self.link.acquire(self.session.port_speed)?;
                link.write_frame(&request).await?;
                link.read_answer(frame_len(expected_body_len)).await?
            };

            sleep(self.policy.inter_request_delay).await;

            match parse_response(&answer, address, command, expected_body_len) {
                Ok(body) => {
                    self.stats.succeeded += 1;
                    return Ok(body.to_vec());
                }
                Err(e) => {
                    warn!("#{attempt}: {e}");
                    if !answer.is_empty() {
                        log_frame("Rejected answer", &answer);
                    }
                    self.stats.failed_attempts += 1;
                    self.stats.last_error = Some(e.clone());
                    last = e;
                    self.watchdog.feed();
                }
            }
        }

        Err(MeterError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last,
        })
    }

    /// Sends a bare request to `address` and reports whether any byte at all
    /// came back within the inter-request interval.
    ///
    /// Nothing is validated. At scanning pace the bytes seen here usually
    /// belong to the previous probe.
    pub async fn probe(&mut self, address: u32) -> Result<bool, MeterError> {
        let request = build_request(address, Command::GetSerialNumber, &[]);
        let mut link = self.link.acquire(self.session.port_speed)?;
        link.write_frame(&request).await?;
        sleep(self.policy.inter_request_delay).await;
        link.take_any_input()
    }
}
