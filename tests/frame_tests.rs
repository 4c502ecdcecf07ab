//! Tests for the frame codec: request layout, answer validation and the order
//! in which validation failures are reported.

use mercury_rs::error::FrameError;
use mercury_rs::mercury::crc::{crc16_modbus, verify_crc};
use mercury_rs::mercury::frame::{
    build_raw, build_request, frame_len, parse_response, peek_address, Command, Frame,
};

/// Serial number request to address 123456 (0x0001E240).
#[test]
fn test_serial_number_request_bytes() {
    let frame = build_request(123456, Command::GetSerialNumber, &[]);
    assert_eq!(&frame[..5], &[0x00, 0x01, 0xE2, 0x40, 0x2F]);
    assert_eq!(frame.len(), frame_len(0));
    assert!(verify_crc(&frame));
    assert_eq!(peek_address(&frame), Some(123456));
}

#[test]
fn test_set_speed_request_carries_body() {
    let frame = build_request(7, Command::SetSpeed, &[0x03]);
    assert_eq!(frame.len(), 8);
    assert_eq!(frame[4], 0x08);
    assert_eq!(frame[5], 0x03);
    let crc = crc16_modbus(&frame[..6]);
    assert_eq!(&frame[6..], &crc.to_le_bytes());
}

#[test]
fn test_parse_valid_answer() {
    let answer = build_request(123456, Command::GetSerialNumber, &[0x00, 0x01, 0xE2, 0x40]);
    let body = parse_response(&answer, 123456, Command::GetSerialNumber, 4).unwrap();
    assert_eq!(body, &[0x00, 0x01, 0xE2, 0x40]);
}

#[test]
fn test_frame_split_and_rebuild() {
    let raw = build_raw(42, 0x21, &[1, 2, 3]);
    let frame = Frame::from_bytes(&raw).unwrap();
    assert_eq!(frame.address, 42);
    assert_eq!(frame.command, 0x21);
    assert_eq!(frame.body, vec![1, 2, 3]);
    assert_eq!(build_raw(frame.address, frame.command, &frame.body), raw);
}

#[test]
fn test_empty_answer_is_no_answer() {
    assert_eq!(
        parse_response(&[], 1, Command::GetEnergy, 16),
        Err(FrameError::NoAnswer)
    );
}

#[test]
fn test_short_answer() {
    assert_eq!(
        parse_response(&[0x00, 0x00, 0x00, 0x01, 0x27, 0xAA], 1, Command::GetEnergy, 16),
        Err(FrameError::TooShort { len: 6 })
    );
}

/// A corrupted CRC is reported even when the address and command are wrong too.
#[test]
fn test_crc_checked_before_address_and_command() {
    let mut answer = build_request(999, Command::GetUip, &[0; 7]);
    let last = answer.len() - 1;
    answer[last] ^= 0xFF;
    assert!(matches!(
        parse_response(&answer, 1, Command::GetEnergy, 16),
        Err(FrameError::BadCrc { .. })
    ));
}

#[test]
fn test_address_checked_before_command() {
    let answer = build_request(999, Command::GetUip, &[0; 7]);
    assert_eq!(
        parse_response(&answer, 1, Command::GetEnergy, 16),
        Err(FrameError::AddressMismatch {
            expected: 1,
            received: 999
        })
    );
}

#[test]
fn test_command_checked_before_length() {
    let answer = build_request(1, Command::GetUip, &[0; 7]);
    assert_eq!(
        parse_response(&answer, 1, Command::GetEnergy, 16),
        Err(FrameError::CommandMismatch {
            expected: 0x27,
            received: 0x63
        })
    );
}

#[test]
fn test_length_mismatch() {
    let answer = build_request(1, Command::GetEnergy, &[0; 12]);
    assert_eq!(
        parse_response(&answer, 1, Command::GetEnergy, 16),
        Err(FrameError::LengthMismatch {
            expected: 16,
            received: 12
        })
    );
}

#[test]
fn test_unknown_command_code() {
    assert_eq!(Command::try_from(0x63u8), Ok(Command::GetUip));
    assert_eq!(Command::try_from(0x55u8), Err(0x55));
}
