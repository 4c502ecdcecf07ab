//! # Packed BCD Encoding and Decoding
//!
//! Mercury answers carry readings as packed binary-coded decimal: one digit per
//! nibble, most significant byte first on the wire, so the last transmitted
//! byte holds the lowest-order digits. Readings with a fractional part are
//! transmitted as plain integers and scaled by a fixed number of decimals per
//! field.

use crate::error::BcdError;
use serde::{Serialize, Serializer};
use std::fmt;

/// Widest field a `u64` accumulator holds (18 digits).
const MAX_DECODE_WIDTH: usize = 9;

/// A decoded BCD field: `raw / 10^decimals`, kept exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BcdValue {
    raw: u64,
    decimals: u32,
}

impl BcdValue {
    pub fn new(raw: u64, decimals: u32) -> Self {
        Self { raw, decimals }
    }

    /// Integer as transmitted, before scaling.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn to_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals as i32)
    }
}

impl fmt::Display for BcdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let scale = 10u64.pow(self.decimals);
        write!(
            f,
            "{}.{:0width$}",
            self.raw / scale,
            self.raw % scale,
            width = self.decimals as usize
        )
    }
}

impl Serialize for BcdValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

/// Decodes a packed BCD field, scaling the result by `decimals`.
///
/// Bytes are read from the last one backwards: low nibble first, then high
/// nibble, each one decimal place further up.
pub fn decode(data: &[u8], decimals: u32) -> Result<BcdValue, BcdError> {
    if data.len() > MAX_DECODE_WIDTH {
        return Err(BcdError::TooWide { len: data.len() });
    }

    let mut raw = 0u64;
    let mut multiplier = 1u64;
    for &byte in data.iter().rev() {
        let low = (byte & 0x0F) as u64;
        let high = (byte >> 4) as u64;
        if low > 9 || high > 9 {
            return Err(BcdError::InvalidDigit { byte });
        }
        raw += low * multiplier;
        multiplier *= 10;
        raw += high * multiplier;
        multiplier *= 10;
    }

    Ok(BcdValue::new(raw, decimals))
}

/// Decodes a single BCD byte (two digits).
pub fn decode_byte(byte: u8) -> Result<u8, BcdError> {
    decode(&[byte], 0).map(|v| v.raw() as u8)
}

/// Encodes `value` into exactly `width` packed BCD bytes, zero-filled on the
/// left, in the byte order [`decode`] expects.
pub fn encode(value: u64, width: usize) -> Result<Vec<u8>, BcdError> {
    let digits = value.to_string();
    let slots = width * 2;
    if digits.len() > slots {
        return Err(BcdError::EncodeOverflow { value, width });
    }

    let padded = format!("{digits:0>slots$}");
    let out = padded
        .as_bytes()
        .chunks(2)
        .map(|pair| ((pair[0] - b'0') << 4) | (pair[1] - b'0'))
        .collect();

    Ok(out)
}

/// Encodes a two-digit value into one BCD byte.
pub fn encode_byte(value: u8) -> Result<u8, BcdError> {
    encode(value as u64, 1).map(|bytes| bytes[0])
}
