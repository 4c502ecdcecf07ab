//! # Utility Modules
//!
//! Helpers shared by the driver and its tests.

pub mod hex;

pub use hex::{encode_hex, pretty_hex};
