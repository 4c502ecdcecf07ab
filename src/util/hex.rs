//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers for frame dumps in logs.
//!
//! ```rust
//! use mercury_rs::util::hex::{encode_hex, pretty_hex};
//!
//! let frame = [0x00, 0x01, 0xE2, 0x40, 0x2F];
//! assert_eq!(encode_hex(&frame), "0001e2402f");
//! assert_eq!(pretty_hex(&frame, 16), "0000: 00 01 e2 40 2f");
//! ```

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Offset-prefixed dump, `bytes_per_line` bytes to a line.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let width = bytes_per_line.max(1);
    data.chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let bytes = chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{:04x}: {bytes}", i * width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
