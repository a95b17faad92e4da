//! Modulo-256 checksum engine.
//!
//! Two rules are supported:
//! - zero-sum (default): `buffer[0..=end]`, checksum included, sums to
//!   0 mod 256 (`verify` / `compute`)
//! - SFF check code: the check byte equals the low byte of the sum of the
//!   bytes of its sub-range (`verify_sff` / `compute_sff`). Opt-in through
//!   the session config, for modules that carry CC_BASE/CC_EXT/CC_DMI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wrapping 8-bit sum.
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// True iff `buffer[0..=end]` sums to 0 mod 256.
///
/// Returns false when the buffer does not reach `end`.
pub fn verify(buffer: &[u8], end: usize) -> bool {
    match buffer.get(..=end) {
        Some(range) => sum(range) == 0,
        None => false,
    }
}

/// Checksum byte that makes `prefix + [checksum]` sum to 0 mod 256.
pub fn compute(prefix: &[u8]) -> u8 {
    sum(prefix).wrapping_neg()
}

/// True iff `buffer[end]` equals the low byte of `sum(buffer[start..end])`.
pub fn verify_sff(buffer: &[u8], start: usize, end: usize) -> bool {
    match (buffer.get(start..end), buffer.get(end)) {
        (Some(range), Some(&check)) => sum(range) == check,
        _ => false,
    }
}

/// SFF check code for `bytes`.
pub fn compute_sff(bytes: &[u8]) -> u8 {
    sum(bytes)
}

/// Which checksum rule page reads apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumRule {
    #[default]
    ZeroSum,
    Sff,
}

/// Outcome of one checksum region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    Pass,
    Fail,
    /// The buffer did not cover the whole region.
    Indeterminate,
}

impl ChecksumStatus {
    pub fn is_pass(&self) -> bool {
        *self == ChecksumStatus::Pass
    }
}

impl fmt::Display for ChecksumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumStatus::Pass => write!(f, "OK!"),
            ChecksumStatus::Fail => write!(f, "FAILED!"),
            ChecksumStatus::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

impl ChecksumRule {
    /// Evaluate the region `start..=end` of `buffer`.
    pub fn evaluate(&self, buffer: &[u8], start: usize, end: usize) -> ChecksumStatus {
        if end >= buffer.len() || start > end {
            return ChecksumStatus::Indeterminate;
        }
        let ok = match self {
            ChecksumRule::Sff => verify_sff(buffer, start, end),
            ChecksumRule::ZeroSum => verify(&buffer[start..], end - start),
        };
        if ok {
            ChecksumStatus::Pass
        } else {
            ChecksumStatus::Fail
        }
    }

    /// Checksum byte to store at the end of a region whose other bytes are `bytes`.
    pub fn compute(&self, bytes: &[u8]) -> u8 {
        match self {
            ChecksumRule::Sff => compute_sff(bytes),
            ChecksumRule::ZeroSum => compute(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::CAPTURED_SFP_A0;

    #[test]
    fn test_verify_matches_sum() {
        let buffers: [&[u8]; 4] = [&[0x00], &[0x01, 0xFF], &[0x80, 0x80], &[0x10, 0x20, 0x30]];
        for b in buffers {
            let expected = b.iter().map(|&x| x as u32).sum::<u32>() % 256 == 0;
            assert_eq!(verify(b, b.len() - 1), expected, "buffer {b:02X?}");
        }
    }

    #[test]
    fn test_compute_is_inverse_of_verify() {
        let mut data = vec![0x03, 0x04, 0x07, 0xFF, 0xFE, 0x42];
        let check = compute(&data);
        data.push(check);
        assert!(verify(&data, data.len() - 1));

        // Sum already 0 mod 256: checksum byte must be 0, not 256.
        assert_eq!(compute(&[0x80, 0x80]), 0x00);
    }

    #[test]
    fn test_verify_out_of_range() {
        assert!(!verify(&[0x00, 0x00], 5));
    }

    #[test]
    fn test_sff_rule_on_captured_module() {
        assert!(verify_sff(&CAPTURED_SFP_A0, 0, 63));
        assert!(verify_sff(&CAPTURED_SFP_A0, 64, 95));
        assert_eq!(compute_sff(&CAPTURED_SFP_A0[..63]), 0xA3);
        // The zero-sum rule does not hold for the same bytes.
        assert!(!verify(&CAPTURED_SFP_A0, 63));
    }

    #[test]
    fn test_evaluate_statuses() {
        let rule = ChecksumRule::Sff;
        assert_eq!(rule.evaluate(&CAPTURED_SFP_A0, 0, 63), ChecksumStatus::Pass);

        let mut corrupted = CAPTURED_SFP_A0;
        corrupted[0x14] = b'X';
        assert_eq!(rule.evaluate(&corrupted, 0, 63), ChecksumStatus::Fail);

        assert_eq!(
            rule.evaluate(&CAPTURED_SFP_A0[..80], 64, 95),
            ChecksumStatus::Indeterminate
        );
    }

    #[test]
    fn test_default_rule_is_zero_sum() {
        assert_eq!(ChecksumRule::default(), ChecksumRule::ZeroSum);
        let mut data = CAPTURED_SFP_A0;
        data[63] = compute(&data[..63]);
        assert_eq!(
            ChecksumRule::default().evaluate(&data, 0, 63),
            ChecksumStatus::Pass
        );
    }

    #[test]
    fn test_zero_sum_rule_with_offset_region() {
        let mut data = vec![0xAA, 0xBB, 0x01, 0x02, 0x03];
        let check = ChecksumRule::ZeroSum.compute(&data[2..]);
        data.push(check);
        assert_eq!(
            ChecksumRule::ZeroSum.evaluate(&data, 2, 5),
            ChecksumStatus::Pass
        );
    }
}
