// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Constant value buffers.
//!
//! A constant's bytes either live inside memory the loader was handed
//! ([`Data::External`], zero-copy) or were copied out of a memory map so
//! the mapped pages could be released ([`Data::Cached`]). Buffers for
//! computed operands are not IR data; the memory manager owns those.

use std::ops::Range;
use std::sync::Arc;

/// Bytes of a constant operand.
#[derive(Clone)]
pub enum Data {
    /// A window into a shared buffer the loader does not own.
    External { source: Arc<[u8]>, range: Range<usize> },
    /// An owned copy.
    Cached(Box<[u8]>),
}

impl Data {
    /// Wraps `source[range]` without copying. Returns `None` if the range
    /// falls outside the buffer.
    pub fn external(source: Arc<[u8]>, range: Range<usize>) -> Option<Self> {
        if range.start > range.end || range.end > source.len() {
            return None;
        }
        Some(Data::External { source, range })
    }

    pub fn cached(bytes: impl Into<Box<[u8]>>) -> Self {
        Data::Cached(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Data::External { source, range } => &source[range.clone()],
            Data::Cached(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Data::External { .. })
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_external() { "External" } else { "Cached" };
        f.debug_struct(kind).field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_window() {
        let source: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4, 5]);
        let data = Data::external(Arc::clone(&source), 1..4).unwrap();
        assert_eq!(data.bytes(), &[2, 3, 4]);
        assert!(data.is_external());
        assert!(Data::external(source, 3..9).is_none());
    }

    #[test]
    fn test_cached() {
        let data = Data::cached(vec![9u8, 8]);
        assert_eq!(data.bytes(), &[9, 8]);
        assert!(!data.is_external());
        assert_eq!(format!("{data:?}"), "Cached { len: 2 }");
    }
}
