//! # Mercury Frame Codec
//!
//! Every request and answer on the bus has the same layout:
//!
//! ```text
//! +-----------------+---------+-----------+-----------------+
//! | address (4, BE) | command | body (0-N)| CRC-16 (2, LE)  |
//! +-----------------+---------+-----------+-----------------+
//! ```
//!
//! The CRC covers everything before it. An answer echoes the address and
//! command of the request it belongs to; there are no sequence numbers, so
//! [`parse_response`] validates purely structurally.
//!
//! ```rust
//! use mercury_rs::mercury::frame::{build_request, parse_response, Command};
//!
//! let request = build_request(123456, Command::GetSerialNumber, &[]);
//! assert_eq!(request.len(), 7);
//! // A meter answering with an empty body would echo the same frame
//! let body = parse_response(&request, 123456, Command::GetSerialNumber, 0).unwrap();
//! assert!(body.is_empty());
//! ```

use crate::constants::{FRAME_ADDRESS_LEN, FRAME_CRC_LEN, FRAME_OVERHEAD};
use crate::error::FrameError;
use crate::mercury::crc::crc16_modbus;
use bytes::{BufMut, BytesMut};
use nom::{
    number::complete::{be_u32, be_u8},
    sequence::tuple,
    IResult,
};
use std::convert::TryFrom;

/// Command codes of the Mercury 200 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    SetDateTime = 0x02,
    SetSpeed = 0x08,
    GetDateTime = 0x21,
    GetEnergy = 0x27,
    GetSerialNumber = 0x2F,
    GetUip = 0x63,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x02 => Ok(Command::SetDateTime),
            0x08 => Ok(Command::SetSpeed),
            0x21 => Ok(Command::GetDateTime),
            0x27 => Ok(Command::GetEnergy),
            0x2F => Ok(Command::GetSerialNumber),
            0x63 => Ok(Command::GetUip),
            other => Err(other),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u32,
    pub command: u8,
    pub body: Vec<u8>,
    pub crc: u16,
}

impl Frame {
    /// Splits raw bytes into a frame without checking anything but the length.
    pub fn from_bytes(raw: &[u8]) -> Result<Frame, FrameError> {
        if raw.len() < FRAME_OVERHEAD {
            return Err(FrameError::TooShort { len: raw.len() });
        }
        let (payload, crc) = raw.split_at(raw.len() - FRAME_CRC_LEN);
        let (body, (address, command)) =
            parse_header(payload).map_err(|_| FrameError::TooShort { len: raw.len() })?;
        Ok(Frame {
            address,
            command,
            body: body.to_vec(),
            crc: u16::from_le_bytes([crc[0], crc[1]]),
        })
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], (u32, u8)> {
    tuple((be_u32, be_u8))(input)
}

/// Builds a request frame: address, command, body and the CRC over all of them.
pub fn build_request(address: u32, command: Command, body: &[u8]) -> Vec<u8> {
    build_raw(address, command.code(), body)
}

/// Same as [`build_request`] for a raw command byte.
pub fn build_raw(address: u32, command: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(frame_len(body.len()));
    buf.put_u32(address);
    buf.put_u8(command);
    buf.put_slice(body);
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);
    buf.to_vec()
}

/// Validates an answer and returns its body.
///
/// Checks run in a fixed order and the first failure wins: presence, minimum
/// length, CRC, address, command, body length.
pub fn parse_response(
    raw: &[u8],
    expected_address: u32,
    expected_command: Command,
    expected_body_len: usize,
) -> Result<&[u8], FrameError> {
    if raw.is_empty() {
        return Err(FrameError::NoAnswer);
    }
    if raw.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort { len: raw.len() });
    }

    let (payload, crc_bytes) = raw.split_at(raw.len() - FRAME_CRC_LEN);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let calculated = crc16_modbus(payload);
    if received != calculated {
        return Err(FrameError::BadCrc {
            received,
            calculated,
        });
    }

    let (body, (address, command)) =
        parse_header(payload).map_err(|_| FrameError::TooShort { len: raw.len() })?;

    if address != expected_address {
        return Err(FrameError::AddressMismatch {
            expected: expected_address,
            received: address,
        });
    }
    if command != expected_command.code() {
        return Err(FrameError::CommandMismatch {
            expected: expected_command.code(),
            received: command,
        });
    }
    if body.len() != expected_body_len {
        return Err(FrameError::LengthMismatch {
            expected: expected_body_len,
            received: body.len(),
        });
    }

    Ok(body)
}

/// Total frame length for a body of `body_len` bytes.
pub fn frame_len(body_len: usize) -> usize {
    FRAME_OVERHEAD + body_len
}

/// Address field of a raw frame, if it is long enough to have one.
pub fn peek_address(raw: &[u8]) -> Option<u32> {
    raw.get(..FRAME_ADDRESS_LEN)
        .map(|a| u32::from_be_bytes([a[0], a[1], a[2], a[3]]))
}
