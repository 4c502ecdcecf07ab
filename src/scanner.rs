//! # Network Address Scanner
//!
//! Finds occupied network addresses by probing every candidate in a range.
//! A probe is any request; whatever comes back is taken as a sign of life
//! without validation. Probes go out faster than the meter answers, so the
//! bytes seen after probing `n` are credited to `n - 1`.
//!
//! Progress lives in a plain text log so that a scan over the full 32-bit
//! space survives restarts:
//!
//! ```text
//! 49999 - Gotcha! Address is found
//! 50000
//! ```
//!
//! A bare number is a checkpoint, a number followed by the found marker is a
//! discovery. Resuming continues after the last checkpoint.

use crate::constants::{
    DEFAULT_SCAN_CHECKPOINT_STRIDE, DEFAULT_SCAN_PROGRESS_STRIDE, SCAN_LOG_FOUND_MARKER,
};
use crate::error::MeterError;
use crate::mercury::serial::SerialTransport;
use crate::mercury::transaction::TransactionEngine;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Scan pacing and bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Addresses between two checkpoints written to the log.
    pub checkpoint_stride: u32,
    /// Addresses between two progress reports.
    pub progress_stride: u32,
    /// Start over from the beginning of the range once it is exhausted.
    pub wrap_around: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            checkpoint_stride: DEFAULT_SCAN_CHECKPOINT_STRIDE,
            progress_stride: DEFAULT_SCAN_PROGRESS_STRIDE,
            wrap_around: true,
        }
    }
}

/// State recovered from a scan log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub last_checkpoint: Option<u32>,
    pub found: BTreeSet<u32>,
}

impl ScanProgress {
    pub fn parse(text: &str) -> Self {
        let mut progress = ScanProgress::default();

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.splitn(2, '-');
            let address = match parts.next().map(str::trim).map(str::parse::<u32>) {
                Some(Ok(address)) => address,
                _ => {
                    warn!("Skipping scan log line {line:?}");
                    continue;
                }
            };
            match parts.next() {
                Some(rest) if rest.contains("found") => {
                    progress.found.insert(address);
                }
                _ => progress.last_checkpoint = Some(address),
            }
        }

        progress
    }

    /// Reads a scan log; a missing file is an empty log.
    pub async fn load(path: &Path) -> Result<Self, MeterError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append-only scan log.
#[derive(Debug)]
pub struct ScanLog {
    file: File,
}

impl ScanLog {
    /// Starts a new, empty log.
    pub async fn create(path: &Path) -> Result<Self, MeterError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(ScanLog { file })
    }

    /// Continues an existing log.
    pub async fn append(path: &Path) -> Result<Self, MeterError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(ScanLog { file })
    }

    pub async fn checkpoint(&mut self, address: u32) -> Result<(), MeterError> {
        self.write_line(&format!("{address}\n")).await
    }

    pub async fn discovery(&mut self, address: u32) -> Result<(), MeterError> {
        self.write_line(&format!("{address} - {SCAN_LOG_FOUND_MARKER}\n"))
            .await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), MeterError> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// An address that showed signs of life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveredAddress {
    /// Address credited with the answer
    pub address: u32,
    /// Address probed when the answer was seen
    pub probed: u32,
}

/// Periodic status of a running scan.
#[derive(Debug, Clone)]
pub struct ScanProgressReport<'a> {
    pub address: u32,
    /// Share of the current pass done, 0-100
    pub percent: f64,
    pub found: &'a BTreeSet<u32>,
}

/// Receiver of progress reports.
pub trait ScanObserver: Send {
    fn on_progress(&mut self, report: &ScanProgressReport<'_>);
}

/// Writes progress reports to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_progress(&mut self, report: &ScanProgressReport<'_>) {
        if report.found.is_empty() {
            info!("{}, {:.1}%", report.address, report.percent);
        } else {
            info!(
                "{}, {:.1}%, found addresses: {:?}",
                report.address, report.percent, report.found
            );
        }
    }
}

/// A resumable scan over `[start, stop]`, driven by [`AddressScanner::next`].
pub struct AddressScanner<'e, P: SerialTransport> {
    engine: &'e mut TransactionEngine<P>,
    log: ScanLog,
    config: ScanConfig,
    observer: Box<dyn ScanObserver + 'e>,
    start: u32,
    stop: u32,
    pass_start: u64,
    next: u64,
    found: BTreeSet<u32>,
}

impl<'e, P: SerialTransport> AddressScanner<'e, P> {
    /// Prepares a scan; with `resume` the log at `log_path` is read back and
    /// the scan continues after its last checkpoint, otherwise the log is
    /// started afresh.
    pub async fn start(
        engine: &'e mut TransactionEngine<P>,
        log_path: &Path,
        start: u32,
        stop: u32,
        resume: bool,
        config: ScanConfig,
    ) -> Result<AddressScanner<'e, P>, MeterError> {
        if start > stop {
            return Err(MeterError::Config(format!(
                "empty scan range [{start}, {stop}]"
            )));
        }

        let (progress, log) = if resume {
            (ScanProgress::load(log_path).await?, ScanLog::append(log_path).await?)
        } else {
            (ScanProgress::default(), ScanLog::create(log_path).await?)
        };

        let pass_start = match progress.last_checkpoint {
            Some(checkpoint) => (start as u64).max(checkpoint as u64 + 1),
            None => start as u64,
        };
        info!("Searching for addresses in range [{pass_start}, {stop}]");

        Ok(AddressScanner {
            engine,
            log,
            config,
            observer: Box::new(LogObserver),
            start,
            stop,
            pass_start,
            next: pass_start,
            found: progress.found,
        })
    }

    pub fn with_observer(mut self, observer: impl ScanObserver + 'e) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Address the next probe goes to.
    pub fn next_address(&self) -> u64 {
        self.next
    }

    /// Everything found so far, including earlier sessions of a resumed scan.
    pub fn found(&self) -> &BTreeSet<u32> {
        &self.found
    }

    /// Probes until the next discovery.
    ///
    /// Returns `None` at the end of the range when wrap-around is off; with
    /// wrap-around on it only returns on a discovery or an error.
    pub async fn next(&mut self) -> Result<Option<DiscoveredAddress>, MeterError> {
        loop {
            if self.next > self.stop as u64 {
                if !self.config.wrap_around {
                    return Ok(None);
                }
                self.pass_start = self.start as u64;
                self.next = self.pass_start;
                info!(
                    "Searching for addresses in range [{}, {}]",
                    self.start, self.stop
                );
            }

            let address = self.next as u32;
            self.next += 1;

            let discovery = if self.engine.probe(address).await? {
                let found = address.wrapping_sub(1);
                info!("Gotcha! Address {found} is found");
                self.log.discovery(found).await?;
                self.found.insert(found);
                Some(DiscoveredAddress {
                    address: found,
                    probed: address,
                })
            } else {
                None
            };

            if self.config.progress_stride > 0 && address % self.config.progress_stride == 0 {
                self.report_progress(address);
            }
            if self.config.checkpoint_stride > 0
                && address as u64 > self.pass_start
                && address % self.config.checkpoint_stride == 0
            {
                self.log.checkpoint(address).await?;
            }
            self.engine.feed_watchdog();

            if discovery.is_some() {
                return Ok(discovery);
            }
        }
    }

    fn report_progress(&mut self, address: u32) {
        let total = self.stop as u64 - self.pass_start + 1;
        let done = address as u64 - self.pass_start + 1;
        let report = ScanProgressReport {
            address,
            percent: done as f64 / total as f64 * 100.0,
            found: &self.found,
        };
        self.observer.on_progress(&report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log() {
        let progress = ScanProgress::parse(
            "1000\n49999 - Gotcha! Address is found\n50000\nbroken line\n\n",
        );
        assert_eq!(progress.last_checkpoint, Some(50000));
        assert_eq!(progress.found.into_iter().collect::<Vec<_>>(), vec![49999]);
    }

    #[test]
    fn test_discovery_lines_do_not_move_checkpoint() {
        let progress = ScanProgress::parse("100000\n100041 - Gotcha! Address is found\n");
        assert_eq!(progress.last_checkpoint, Some(100000));
        assert!(progress.found.contains(&100041));
    }
}
