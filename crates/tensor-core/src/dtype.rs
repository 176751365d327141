// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

/// The closed set of element types an operand can carry.
///
/// Quantized variants share the storage width of their integer counterpart;
/// the scale and zero-point live next to the dtype in the operand's type
/// info, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    Float32,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Boolean stored as one byte (0 or 1).
    Bool8,
    /// Asymmetric 8-bit unsigned quantization.
    QuantUint8Asymm,
    /// Symmetric 8-bit signed quantization.
    QuantInt8Symm,
    /// Plain 8-bit unsigned integer (the result of casting a quantized tensor).
    Uint8,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Int64 => 8,
            DType::Bool8 | DType::QuantUint8Asymm | DType::QuantInt8Symm | DType::Uint8 => 1,
        }
    }

    /// Returns `true` for the quantized variants.
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::QuantUint8Asymm | DType::QuantInt8Symm)
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Bool8 => "bool8",
            DType::QuantUint8Asymm => "quant_uint8_asymm",
            DType::QuantInt8Symm => "quant_int8_symm",
            DType::Uint8 => "uint8",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DType::Float32.size_bytes(), 4);
        assert_eq!(DType::Int64.size_bytes(), 8);
        assert_eq!(DType::Bool8.size_bytes(), 1);
        assert_eq!(DType::QuantInt8Symm.size_bytes(), 1);
    }

    #[test]
    fn test_quantized() {
        assert!(DType::QuantUint8Asymm.is_quantized());
        assert!(!DType::Uint8.is_quantized());
        assert_eq!(DType::QuantUint8Asymm.to_string(), "quant_uint8_asymm");
    }
}
