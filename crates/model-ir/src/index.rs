// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dense, graph-scoped identifiers.
//!
//! Operands, operations and subgraphs are referenced by position in their
//! owning table, never by pointer. Indices are assigned in creation order
//! starting from zero.

use std::fmt;

macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "no index".
            pub const UNDEFINED: Self = Self(u32::MAX);

            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            pub const fn value(self) -> u32 {
                self.0
            }

            /// Position in the owning table.
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!($prefix, "{}"), self.0)
                } else {
                    write!(f, concat!($prefix, "?"))
                }
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

define_index!(
    /// Identifies an operand within one graph. [`OperandIndex::UNDEFINED`]
    /// marks an absent optional input.
    OperandIndex,
    "#"
);
define_index!(
    /// Identifies an operation within one graph.
    OperationIndex,
    "@"
);
define_index!(
    /// Identifies a subgraph within a model. Subgraph 0 is the entry point.
    SubgraphIndex,
    "subgraph "
);

impl SubgraphIndex {
    pub const PRIMARY: Self = Self(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(OperandIndex::new(7).to_string(), "#7");
        assert_eq!(OperandIndex::UNDEFINED.to_string(), "#?");
        assert_eq!(OperationIndex::new(2).to_string(), "@2");
        assert_eq!(SubgraphIndex::PRIMARY.to_string(), "subgraph 0");
    }

    #[test]
    fn test_validity() {
        assert!(OperandIndex::new(0).is_valid());
        assert!(!OperandIndex::UNDEFINED.is_valid());
        assert!(OperandIndex::new(1) < OperandIndex::new(2));
    }
}
