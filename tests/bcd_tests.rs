//! Tests for the packed BCD codec.

use mercury_rs::error::BcdError;
use mercury_rs::mercury::bcd::{decode, decode_byte, encode, encode_byte};
use proptest::prelude::*;

#[test]
fn test_energy_counter_scaling() {
    let value = decode(&[0x00, 0x12, 0x34, 0x56], 2).unwrap();
    assert_eq!(value.raw(), 123456);
    assert_eq!(value.to_string(), "1234.56");
    assert!((value.to_f64() - 1234.56).abs() < 1e-9);
}

#[test]
fn test_leading_zero_fraction() {
    let value = decode(&[0x01, 0x05], 2).unwrap();
    assert_eq!(value.to_string(), "1.05");
}

#[test]
fn test_rejects_non_decimal_nibble() {
    assert_eq!(decode(&[0x1A], 0), Err(BcdError::InvalidDigit { byte: 0x1A }));
    assert_eq!(decode_byte(0xF0), Err(BcdError::InvalidDigit { byte: 0xF0 }));
}

#[test]
fn test_rejects_too_wide_field() {
    assert_eq!(decode(&[0; 10], 0), Err(BcdError::TooWide { len: 10 }));
}

#[test]
fn test_encode_pads_and_overflows() {
    assert_eq!(encode(1234, 3).unwrap(), vec![0x00, 0x12, 0x34]);
    assert_eq!(encode_byte(59).unwrap(), 0x59);
    assert_eq!(
        encode(100, 1),
        Err(BcdError::EncodeOverflow { value: 100, width: 1 })
    );
}

proptest! {
    #[test]
    fn prop_two_digit_values_survive_encoding(value in 0u8..100) {
        let byte = encode_byte(value).unwrap();
        prop_assert_eq!(decode_byte(byte).unwrap(), value);
    }

    #[test]
    fn prop_wide_values_survive_encoding(value in 0u64..100_000_000) {
        let bytes = encode(value, 4).unwrap();
        prop_assert_eq!(decode(&bytes, 0).unwrap().raw(), value);
    }
}
