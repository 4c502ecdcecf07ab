//! Transaction engine tests against the mock serial port.

use mercury_rs::error::{FrameError, MeterError};
use mercury_rs::host::Watchdog;
use mercury_rs::mercury::frame::{build_request, Command};
use mercury_rs::mercury::serial_mock::{MockSerialPort, SimulatedMeter};
use mercury_rs::mercury::{
    HalfDuplexLink, LinkConfig, MeterSession, PortSpeed, RetryPolicy, TransactionEngine, TxControl,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct CountingWatchdog(Arc<AtomicUsize>);

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn engine(mock: &MockSerialPort, address: u32, attempts: u32) -> TransactionEngine<MockSerialPort> {
    let link = HalfDuplexLink::new(mock.clone(), TxControl::Rts, LinkConfig::default());
    let policy = RetryPolicy {
        max_attempts: attempts,
        inter_request_delay: Duration::ZERO,
    };
    TransactionEngine::new(link, MeterSession::new(address, PortSpeed::Baud9600), policy)
}

/// A silent bus costs exactly `max_attempts` requests.
#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let mock = MockSerialPort::new();
    let watchdog = CountingWatchdog::default();
    let mut engine = engine(&mock, 5, 3).with_watchdog(Box::new(watchdog.clone()));

    let err = engine
        .transact(Command::GetEnergy, &[], 16)
        .await
        .unwrap_err();

    match err {
        MeterError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, FrameError::NoAnswer);
        }
        other => panic!("unexpected error: {other}"),
    }
    let request = build_request(5, Command::GetEnergy, &[]);
    assert_eq!(mock.get_tx_data(), request.repeat(3));
    assert_eq!(mock.baud_history(), vec![9600; 3]);
    assert_eq!(engine.stats().attempts, 3);
    assert_eq!(engine.stats().succeeded, 0);
    assert_eq!(watchdog.0.load(Ordering::SeqCst), 3);
    assert!(!engine.link().is_acquired());
}

/// The transceiver is enabled for every request and released after it.
#[tokio::test]
async fn test_rts_toggles_per_attempt() {
    let mock = MockSerialPort::new();
    let mut engine = engine(&mock, 5, 2);
    let _ = engine.transact(Command::GetSerialNumber, &[], 4).await;
    assert_eq!(mock.rts_history(), vec![true, false, true, false]);
}

/// Answers from another meter are retried, not accepted.
#[tokio::test]
async fn test_rejects_answer_from_other_address() {
    let mock = MockSerialPort::new();
    mock.set_responder(|_, _| Some(build_request(6, Command::GetSerialNumber, &[0, 0, 0, 6])));
    let mut engine = engine(&mock, 5, 2);

    let err = engine
        .transact(Command::GetSerialNumber, &[], 4)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MeterError::RetriesExhausted {
            attempts: 2,
            last: FrameError::AddressMismatch {
                expected: 5,
                received: 6
            }
        }
    ));
}

/// A corrupted answer is followed by a good one.
#[tokio::test]
async fn test_recovers_from_bad_crc() {
    let mock = MockSerialPort::new();
    let mut calls = 0;
    mock.set_responder(move |_, _| {
        calls += 1;
        let mut answer = build_request(5, Command::GetSerialNumber, &[0, 0, 0, 5]);
        if calls == 1 {
            answer[5] ^= 0x01;
        }
        Some(answer)
    });
    let mut engine = engine(&mock, 5, 3);

    let body = engine.transact(Command::GetSerialNumber, &[], 4).await.unwrap();
    assert_eq!(body, vec![0, 0, 0, 5]);
    assert_eq!(engine.stats().attempts, 2);
    assert!(matches!(
        engine.stats().last_error,
        Some(FrameError::BadCrc { .. })
    ));
}

/// Serial I/O failures are not retried.
#[tokio::test]
async fn test_serial_error_ends_transaction() {
    let mock = MockSerialPort::new();
    mock.attach_meter(SimulatedMeter::new(5, PortSpeed::Baud9600));
    mock.set_next_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
    let mut engine = engine(&mock, 5, 10);

    let err = engine
        .transact(Command::GetSerialNumber, &[], 4)
        .await
        .unwrap_err();
    assert!(matches!(err, MeterError::SerialPortError(_)));
    assert_eq!(engine.stats().attempts, 1);
    assert_eq!(mock.rts_history(), vec![true, false]);
    assert!(!engine.link().is_acquired());
}

#[tokio::test]
async fn test_probe_reports_silence() {
    let mock = MockSerialPort::new();
    let mut engine = engine(&mock, 0, 1);
    assert!(!engine.probe(1234).await.unwrap());
    assert_eq!(
        mock.get_tx_data(),
        build_request(1234, Command::GetSerialNumber, &[])
    );
}

fn slow_engine(
    mock: &MockSerialPort,
    speed: PortSpeed,
    attempts: u32,
    delay: Duration,
) -> TransactionEngine<MockSerialPort> {
    let link = HalfDuplexLink::new(mock.clone(), TxControl::Rts, LinkConfig::default());
    let policy = RetryPolicy {
        max_attempts: attempts,
        inter_request_delay: delay,
    };
    TransactionEngine::new(link, MeterSession::new(5, speed), policy)
}

/// Every failed attempt costs the frame's shift-out time plus the
/// inter-request interval.
#[tokio::test(start_paused = true)]
async fn test_failed_attempts_are_paced() {
    let mock = MockSerialPort::new();
    let mut engine = slow_engine(&mock, PortSpeed::Baud600, 3, Duration::from_millis(50));

    let started = Instant::now();
    let err = engine.transact(Command::GetEnergy, &[], 16).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_unreachable());
    let expected = 3 * (PortSpeed::Baud600.transmit_time(7) + Duration::from_millis(50));
    assert!(elapsed >= expected, "elapsed {elapsed:?}");
    assert!(elapsed < expected + Duration::from_millis(10), "elapsed {elapsed:?}");

    // Each request starts only after the previous interval ran out
    let rises: Vec<Instant> = mock
        .rts_timeline()
        .into_iter()
        .filter(|&(level, _)| level)
        .map(|(_, at)| at)
        .collect();
    assert_eq!(rises.len(), 3);
    for pair in rises.windows(2) {
        assert!(pair[1] - pair[0] >= expected / 3);
    }
}

/// A good answer is followed by the interval too, so back-to-back calls
/// keep the meter's request spacing.
#[tokio::test(start_paused = true)]
async fn test_interval_follows_successful_exchange() {
    let mock = MockSerialPort::new();
    mock.attach_meter(SimulatedMeter::new(5, PortSpeed::Baud9600));
    let mut engine = slow_engine(&mock, PortSpeed::Baud9600, 3, Duration::from_millis(40));

    let started = Instant::now();
    engine.transact(Command::GetSerialNumber, &[], 4).await.unwrap();
    let expected = PortSpeed::Baud9600.transmit_time(7) + Duration::from_millis(40);
    assert!(started.elapsed() >= expected);
}
