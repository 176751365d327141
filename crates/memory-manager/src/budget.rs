// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory budget configuration and parsing.
//!
//! A [`MemoryBudget`] is the hard ceiling on bytes the runtime's pool may
//! hand out at once, across static and dynamic tensors of every subgraph.

use crate::MemoryError;
use std::fmt;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// A hard memory ceiling for tensor buffers.
///
/// # Parsing
/// Case-insensitive, with binary multiples:
/// - `"512M"` / `"512MB"` → 512 × 1024² bytes
/// - `"1G"` / `"1GB"` → 1024³ bytes
/// - `"64K"` / `"64KB"` → 64 × 1024 bytes
/// - `"4096"` / `"4096B"` → a raw byte count
///
/// ```
/// use memory_manager::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("1G").unwrap().as_mb(), 1024);
/// assert_eq!("256m".parse::<MemoryBudget>().unwrap(), MemoryBudget::from_mb(256));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    /// No practical limit.
    pub const UNLIMITED: Self = Self { bytes: usize::MAX };

    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MB }
    }

    pub fn from_gb(gb: usize) -> Self {
        Self { bytes: gb * GB }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Megabytes, truncated.
    pub fn as_mb(&self) -> usize {
        self.bytes / MB
    }

    /// Parses a human-readable budget string such as `"512M"`.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidBudget(s.to_string());
        let upper = s.trim().to_ascii_uppercase();
        let (digits, multiplier) = [("GB", GB), ("MB", MB), ("KB", KB), ("G", GB), ("M", MB), ("K", KB), ("B", 1)]
            .iter()
            .find_map(|&(suffix, mult)| upper.strip_suffix(suffix).map(|d| (d, mult)))
            .unwrap_or((upper.as_str(), 1));

        let value: usize = digits.trim().parse().map_err(|_| invalid())?;
        match value.checked_mul(multiplier) {
            Some(0) | None => Err(invalid()),
            Some(bytes) => Ok(Self { bytes }),
        }
    }
}

impl std::str::FromStr for MemoryBudget {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MemoryBudget {
    type Error = MemoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MemoryBudget> for String {
    fn from(budget: MemoryBudget) -> Self {
        let b = budget.bytes;
        match b {
            _ if b >= GB && b % GB == 0 => format!("{}G", b / GB),
            _ if b >= MB && b % MB == 0 => format!("{}M", b / MB),
            _ if b >= KB && b % KB == 0 => format!("{}K", b / KB),
            _ => b.to_string(),
        }
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b == usize::MAX {
            f.write_str("unlimited")
        } else if b >= GB && b % GB == 0 {
            write!(f, "{} GB", b / GB)
        } else if b >= MB && b % MB == 0 {
            write!(f, "{} MB", b / MB)
        } else if b >= KB && b % KB == 0 {
            write!(f, "{} KB", b / KB)
        } else {
            write!(f, "{b} B")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(MemoryBudget::from_mb(512).as_bytes(), 512 * 1024 * 1024);
        assert_eq!(MemoryBudget::from_gb(2).as_mb(), 2048);
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(MemoryBudget::parse("512M").unwrap().as_mb(), 512);
        assert_eq!(MemoryBudget::parse("512mb").unwrap().as_mb(), 512);
        assert_eq!(MemoryBudget::parse("2g").unwrap().as_mb(), 2048);
        assert_eq!(MemoryBudget::parse("1024KB").unwrap().as_bytes(), 1024 * 1024);
        assert_eq!(MemoryBudget::parse("4096B").unwrap().as_bytes(), 4096);
        assert_eq!(MemoryBudget::parse("1048576").unwrap().as_mb(), 1);
        assert_eq!(MemoryBudget::parse("  64M ").unwrap().as_mb(), 64);
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "abc", "0M", "M", "-1G", "99999999999999999999G"] {
            assert!(
                matches!(MemoryBudget::parse(bad), Err(MemoryError::InvalidBudget(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryBudget::from_gb(1).to_string(), "1 GB");
        assert_eq!(MemoryBudget::from_mb(512).to_string(), "512 MB");
        assert_eq!(MemoryBudget::from_bytes(2048).to_string(), "2 KB");
        assert_eq!(MemoryBudget::from_bytes(100).to_string(), "100 B");
        assert_eq!(MemoryBudget::UNLIMITED.to_string(), "unlimited");
    }

    #[test]
    fn test_serde_as_string() {
        let b = MemoryBudget::from_mb(256);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "\"256M\"");
        let back: MemoryBudget = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
        assert!(serde_json::from_str::<MemoryBudget>("\"lots\"").is_err());
    }
}
