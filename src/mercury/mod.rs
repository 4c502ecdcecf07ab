//! # Mercury Protocol Stack
//!
//! Layers from the wire up: CRC and BCD codecs, the frame codec, the serial
//! transport, the half-duplex link controller and the retrying transaction
//! engine.

pub mod bcd;
pub mod crc;
pub mod frame;
pub mod link;
pub mod serial;
pub mod serial_mock;
pub mod transaction;

pub use bcd::BcdValue;
pub use frame::{build_request, parse_response, Command, Frame};
pub use link::{HalfDuplexLink, LinkConfig, LinkGuard};
pub use serial::{PortSpeed, SerialTransport, TxControl, TxEnablePin};
pub use transaction::{MeterSession, RetryPolicy, TransactionEngine, TransactionStats};
