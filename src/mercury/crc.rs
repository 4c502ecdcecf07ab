//! CRC-16/Modbus
//!
//! Reflected polynomial 0xA001, initial value 0xFFFF, no final XOR. The frame
//! carries the result little-endian after the body.

use crate::constants::FRAME_CRC_LEN;
use crc::{Crc, CRC_16_MODBUS};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Calculate the CRC-16/Modbus of `data`.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Append the little-endian CRC of `data` to it.
pub fn append_crc(data: &mut Vec<u8>) {
    let crc = crc16_modbus(data);
    data.extend_from_slice(&crc.to_le_bytes());
}

/// Check that the last two bytes of `frame` are the CRC of the rest.
pub fn verify_crc(frame: &[u8]) -> bool {
    if frame.len() < FRAME_CRC_LEN {
        return false;
    }
    let (payload, crc) = frame.split_at(frame.len() - FRAME_CRC_LEN);
    crc16_modbus(payload) == u16::from_le_bytes([crc[0], crc[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_init_value() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_check_value() {
        // CRC-16/MODBUS catalogue check value
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_modbus_read_holding_registers_request() {
        // 01 03 00 00 00 0A -> CRC C5 CD on the wire
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        append_crc(&mut frame);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert!(verify_crc(&frame));
    }

    #[test]
    fn test_verify_rejects_flipped_bit() {
        let mut frame = vec![0x00, 0x01, 0xE2, 0x40, 0x2F];
        append_crc(&mut frame);
        frame[2] ^= 0x10;
        assert!(!verify_crc(&frame));
        assert!(!verify_crc(&[0x01]));
    }
}
