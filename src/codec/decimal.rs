//! IEEE 754-2008 decimal128 (BID) conversion
//!
//! Only the canonical encoding is produced. Decoding accepts any finite
//! value whose coefficient fits the 96-bit mantissa of `Decimal`; scales
//! beyond 28 digits are truncated.

use bson::Decimal128;
use rust_decimal::Decimal;

const EXPONENT_BIAS: i32 = 6176;
const EXPONENT_MASK: u64 = 0x3FFF;
const HIGH_COEFFICIENT_MASK: u64 = (1 << 49) - 1;
const MAX_SCALE: u32 = 28;

/// Encode a decimal as decimal128
pub fn to_decimal128(value: Decimal) -> Decimal128 {
    let mantissa = value.mantissa();
    let coefficient = mantissa.unsigned_abs();
    let exponent = (EXPONENT_BIAS - value.scale() as i32) as u64;

    let mut high = (exponent & EXPONENT_MASK) << 49;
    high |= (coefficient >> 64) as u64 & HIGH_COEFFICIENT_MASK;
    if mantissa < 0 {
        high |= 1 << 63;
    }
    let low = coefficient as u64;

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&low.to_le_bytes());
    bytes[8..].copy_from_slice(&high.to_le_bytes());
    Decimal128::from_bytes(bytes)
}

/// Decode a decimal128; None for NaN, infinities and out-of-range values
pub fn from_decimal128(value: &Decimal128) -> Option<Decimal> {
    let bytes = value.bytes();
    let mut low_bytes = [0u8; 8];
    let mut high_bytes = [0u8; 8];
    low_bytes.copy_from_slice(&bytes[..8]);
    high_bytes.copy_from_slice(&bytes[8..]);
    let low = u64::from_le_bytes(low_bytes);
    let high = u64::from_le_bytes(high_bytes);

    let negative = high >> 63 == 1;
    if (high >> 61) & 0b11 == 0b11 {
        // NaN, infinity, or a coefficient above 10^34 (non-canonical zero)
        if (high >> 59) & 0b1111 == 0b1111 {
            return None;
        }
        return Some(Decimal::ZERO);
    }

    let exponent = ((high >> 49) & EXPONENT_MASK) as i32 - EXPONENT_BIAS;
    let mut coefficient = ((high & HIGH_COEFFICIENT_MASK) as u128) << 64 | low as u128;

    let mut scale: u32 = 0;
    if exponent > 0 {
        for _ in 0..exponent {
            coefficient = coefficient.checked_mul(10)?;
        }
    } else {
        scale = exponent.unsigned_abs();
        while scale > MAX_SCALE {
            coefficient /= 10;
            scale -= 1;
        }
    }

    let signed = i128::try_from(coefficient).ok()?;
    let signed = if negative { -signed } else { signed };
    Decimal::try_from_i128_with_scale(signed, scale).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_roundtrip_values() {
        for text in ["0", "1", "-1", "12.50", "-0.0001", "79228162514264337593543950335"] {
            let value = Decimal::from_str(text).unwrap();
            let decoded = from_decimal128(&to_decimal128(value)).unwrap();
            assert_eq!(decoded, value, "value {}", text);
            assert_eq!(decoded.scale(), value.scale());
        }
    }

    #[test]
    fn test_known_encoding_of_one() {
        // 1E0: exponent 6176 (0x1820) in the top 14 bits after the sign
        let bytes = to_decimal128(Decimal::ONE).bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..14], &[0u8; 13]);
        assert_eq!(bytes[14], 0x40);
        assert_eq!(bytes[15], 0x30);
    }

    #[test]
    fn test_positive_exponent_is_expanded() {
        // 5E+2
        let high: u64 = ((EXPONENT_BIAS + 2) as u64) << 49;
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&5u64.to_le_bytes());
        bytes[8..].copy_from_slice(&high.to_le_bytes());
        let decoded = from_decimal128(&Decimal128::from_bytes(bytes)).unwrap();
        assert_eq!(decoded, Decimal::from(500));
    }

    #[test]
    fn test_nan_is_rejected() {
        let mut bytes = [0u8; 16];
        bytes[15] = 0x7C;
        assert!(from_decimal128(&Decimal128::from_bytes(bytes)).is_none());
    }
}
