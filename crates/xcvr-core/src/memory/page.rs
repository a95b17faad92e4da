//! Memory page buffers and checksum results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checksum::{ChecksumRule, ChecksumStatus};
use crate::module_type::ChecksumRegion;
use crate::protocol::constants::{ADDR_A0, ADDR_A2};

/// Logical memory page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageId {
    /// Base ID information.
    A0,
    /// Diagnostic monitoring.
    A2,
}

impl PageId {
    /// Two-wire device address conventionally used for this page.
    pub fn address(self) -> u8 {
        match self {
            PageId::A0 => ADDR_A0,
            PageId::A2 => ADDR_A2,
        }
    }

    pub fn from_address(address: u8) -> Option<Self> {
        match address {
            ADDR_A0 => Some(PageId::A0),
            ADDR_A2 => Some(PageId::A2),
            _ => None,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageId::A0 => write!(f, "A0"),
            PageId::A2 => write!(f, "A2"),
        }
    }
}

impl FromStr for PageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("0x").to_ascii_lowercase().as_str() {
            "a0" | "a0h" => Ok(PageId::A0),
            "a2" | "a2h" => Ok(PageId::A2),
            other => Err(format!("unknown page '{other}' (expected a0 or a2)")),
        }
    }
}

/// Result of one checksum region of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumResult {
    pub page: PageId,
    pub start: usize,
    /// Offset of the check byte (inclusive end of the region).
    pub end_offset: usize,
    pub status: ChecksumStatus,
}

impl ChecksumResult {
    pub fn evaluate(
        page: PageId,
        region: &ChecksumRegion,
        rule: ChecksumRule,
        buffer: &[u8],
    ) -> Self {
        let start = region.start(rule);
        Self {
            page,
            start,
            end_offset: region.end,
            status: rule.evaluate(buffer, start, region.end),
        }
    }
}

/// Raw buffer read from one page plus its checksum results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPage {
    pub page: PageId,
    /// Bytes received, zero-padded to at least 128 bytes.
    pub data: Vec<u8>,
    /// Bytes actually received from the module.
    pub received: usize,
    /// Bytes requested by the page layout.
    pub expected: usize,
    pub checksums: Vec<ChecksumResult>,
}

impl MemoryPage {
    /// True if the module returned every requested byte.
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    /// True if every checksum region passed.
    pub fn checksums_ok(&self) -> bool {
        self.checksums.iter().all(|c| c.status.is_pass())
    }

    /// Bytes actually received (without padding).
    pub fn received_bytes(&self) -> &[u8] {
        &self.data[..self.received.min(self.data.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_parse() {
        assert_eq!("a0".parse::<PageId>().unwrap(), PageId::A0);
        assert_eq!("A2".parse::<PageId>().unwrap(), PageId::A2);
        assert_eq!("0xA0".parse::<PageId>().unwrap(), PageId::A0);
        assert!("a4".parse::<PageId>().is_err());
        assert_eq!(PageId::from_address(0xA2), Some(PageId::A2));
        assert_eq!(PageId::A2.address(), 0xA2);
    }
}
