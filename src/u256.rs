//! 256-bit unsigned integer arithmetic.
//!
//! Thin wrapper over `ruint::aliases::U256` so callers never name the
//! underlying library. Boundaries on the wire are big-endian, hence the
//! big-endian constructors.

use ruint::aliases::U256 as Ruint256;
use std::ops::Div;

/// A 256-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256(Ruint256);

impl U256 {
    /// Zero constant.
    pub const ZERO: Self = Self(Ruint256::ZERO);

    /// Maximum value (2^256 - 1).
    pub const MAX: Self = Self(Ruint256::MAX);

    /// Create from big-endian bytes (wire order for hashes and boundaries).
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(Ruint256::from_be_bytes(bytes))
    }

    /// Convert to big-endian bytes.
    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Convert to f64, losing precision for large values.
    ///
    /// Values beyond f64's exact range (~2^53) come back as an approximation
    /// built from the top eight significant bytes.
    pub fn to_f64_approx(self) -> f64 {
        let bytes = self.0.to_le_bytes::<32>();

        let mut highest_byte = 0;
        for (i, &b) in bytes.iter().enumerate().rev() {
            if b != 0 {
                highest_byte = i;
                break;
            }
        }

        if highest_byte < 8 {
            return self.0.saturating_to::<u64>() as f64;
        }

        let start = highest_byte - 7;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[start..start + 8]);
        let mantissa = u64::from_le_bytes(buf) as f64;

        mantissa * (2.0_f64).powi((start * 8) as i32)
    }
}

impl Div for U256 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Self(self.0 / rhs.0)
    }
}

impl Div<u64> for U256 {
    type Output = Self;

    fn div(self, rhs: u64) -> Self::Output {
        Self(self.0 / Ruint256::from(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_low_u64(v: u64) -> U256 {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&v.to_be_bytes());
        U256::from_be_bytes(bytes)
    }

    #[test]
    fn test_be_roundtrip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x12;
        bytes[31] = 0x34;
        assert_eq!(U256::from_be_bytes(bytes).to_be_bytes(), bytes);
    }

    #[test]
    fn test_division() {
        assert_eq!(from_low_u64(100) / from_low_u64(10), from_low_u64(10));
        assert_eq!(from_low_u64(100) / 10u64, from_low_u64(10));
    }

    #[test]
    fn test_f64_small_values_exact() {
        assert_eq!(from_low_u64(12345).to_f64_approx(), 12345.0);
        assert_eq!(U256::ZERO.to_f64_approx(), 0.0);
    }

    #[test]
    fn test_f64_large_value_magnitude() {
        // 2^255 should survive the approximation to within float rounding.
        let mut bytes = [0u8; 32];
        bytes[0] = 0x80;
        let v = U256::from_be_bytes(bytes).to_f64_approx();
        let expected = (2.0_f64).powi(255);
        assert!((v - expected).abs() / expected < 1e-9);
    }
}
