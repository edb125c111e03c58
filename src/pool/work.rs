//! Work packages, solutions, and the share-target arithmetic shared by the
//! pool session and the farm.

use std::fmt;

use crate::u256::U256;

/// A 256-bit hash as used on the Ethash wire: hex-encoded big-endian,
/// usually with a `0x` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct H256(pub [u8; 32]);

/// Errors from parsing wire hash fields.
#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
    /// Wrong number of hex digits for the type
    #[error("expected {expected} hex digits, got {got}")]
    BadLength { expected: usize, got: usize },

    /// Not valid hex
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl H256 {
    /// All-zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// All-ones hash (the loosest possible boundary).
    pub const MAX: Self = Self([0xff; 32]);

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 64 {
            return Err(HashParseError::BadLength {
                expected: 64,
                got: s.len(),
            });
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }

    /// Lowercase hex, no prefix.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase hex with a `0x` prefix, as most pool fields want it.
    pub fn to_hex_prefixed(self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviated form for log lines
        write!(f, "0x{}..{}", hex::encode(&self.0[..4]), hex::encode(&self.0[28..]))
    }
}

/// One unit of work handed to the farm.
///
/// Produced by the session on each `mining.notify` (or getwork poll) and
/// replaced atomically at the farm. `job` is the pool's job token exactly as
/// received; `job_len` remembers its original length so EthereumStratum
/// submissions can be truncated back to what the pool expects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkPackage {
    /// Header hash the miners grind against
    pub header: H256,

    /// Seed hash identifying the DAG epoch
    pub seed: H256,

    /// Share boundary: a hash ≤ this value is a valid share
    pub boundary: H256,

    /// Pool job token, verbatim
    pub job: String,

    /// Original character length of the job token
    pub job_len: usize,

    /// Upper bits of the nonce search space (EthereumStratum extranonce)
    pub start_nonce: u64,

    /// How many of the nonce's top bits are fixed by the pool
    pub ex_size_bits: u32,
}

impl WorkPackage {
    /// Approximate share difficulty implied by the boundary, for logging.
    pub fn difficulty(&self) -> f64 {
        if self.boundary.is_zero() {
            return 0.0;
        }
        let max = U256::MAX.to_f64_approx();
        max / U256::from_be_bytes(self.boundary.0).to_f64_approx()
    }
}

/// A candidate nonce found by a miner, en route to the pool.
#[derive(Debug, Clone)]
pub struct Solution {
    /// The winning nonce
    pub nonce: u64,

    /// Ethash mix hash accompanying the nonce
    pub mix_hash: H256,

    /// The work package this nonce was found against
    pub work: WorkPackage,

    /// True when the package had already been superseded at find time
    pub stale: bool,
}

/// Convert a pool share difficulty to a 256-bit boundary.
///
/// This is the EthereumStratum mapping and must stay bit-exact: scale the
/// difficulty down by 2^32 per step from word 6, compute `m = 0xffff0000 /
/// diff`, place `m` at 32-bit word positions `k` and `k+1` of a
/// little-endian buffer, then byte-reverse into the big-endian boundary.
pub fn difficulty_to_boundary(diff: f64) -> H256 {
    if !diff.is_normal() || diff <= 0.0 {
        // The degenerate m == 0 && k == 6 case: accept everything.
        return H256::MAX;
    }

    let mut diff = diff;
    let mut k: usize = 6;
    while k > 0 && diff > 1.0 {
        diff /= 4294967296.0;
        k -= 1;
    }
    let m = (4294901760.0 / diff) as u64;
    if m == 0 && k == 6 {
        return H256::MAX;
    }

    let mut le = [0u8; 32];
    le[k * 4..k * 4 + 4].copy_from_slice(&((m & 0xffff_ffff) as u32).to_le_bytes());
    le[k * 4 + 4..k * 4 + 8].copy_from_slice(&((m >> 32) as u32).to_le_bytes());

    let mut be = [0u8; 32];
    for i in 0..32 {
        be[31 - i] = le[i];
    }
    H256(be)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_h256_parse_with_and_without_prefix() {
        let plain = "00000000ffff0000000000000000000000000000000000000000000000000000";
        let a = H256::from_hex(plain).unwrap();
        let b = H256::from_hex(&format!("0x{}", plain)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), plain);
    }

    #[test]
    fn test_h256_parse_rejects_bad_input() {
        assert!(matches!(
            H256::from_hex("deadbeef"),
            Err(HashParseError::BadLength { got: 8, .. })
        ));
        assert!(H256::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_difficulty_one_boundary() {
        let boundary = difficulty_to_boundary(1.0);
        assert_eq!(
            boundary.to_hex(),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_difficulty_two_is_half_of_one() {
        // diff=2 must be exactly diff=1 shifted right by one bit.
        let one = U256::from_be_bytes(difficulty_to_boundary(1.0).0);
        let two = U256::from_be_bytes(difficulty_to_boundary(2.0).0);
        assert_eq!(one / 2u64, two);
        assert_eq!(
            difficulty_to_boundary(2.0).to_hex(),
            "000000007fff8000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_difficulty_zero_accepts_everything() {
        assert_eq!(difficulty_to_boundary(0.0), H256::MAX);
        assert_eq!(difficulty_to_boundary(f64::NAN), H256::MAX);
    }

    #[test]
    fn test_difficulty_four_is_quarter_of_one() {
        let one = U256::from_be_bytes(difficulty_to_boundary(1.0).0);
        let four = U256::from_be_bytes(difficulty_to_boundary(4.0).0);
        assert_eq!(one / 4u64, four);
    }

    #[test]
    fn test_work_difficulty_roundtrip() {
        let wp = WorkPackage {
            boundary: difficulty_to_boundary(1.0),
            ..Default::default()
        };
        let d = wp.difficulty();
        assert!((d - 4295032833.0).abs() / 4295032833.0 < 1e-6, "got {}", d);
    }

    #[test]
    fn test_zero_boundary_difficulty_is_zero() {
        let wp = WorkPackage::default();
        assert_eq!(wp.difficulty(), 0.0);
    }
}
