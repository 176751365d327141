// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading.
//!
//! Every variant is terminal for the load call: no partially built model
//! is ever returned.

use model_ir::IrError;
use std::path::PathBuf;
use tensor_core::TensorError;

/// Errors that can occur while loading a serialized model.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The model file could not be opened or mapped.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The flatbuffer verifier rejected the buffer.
    #[error("malformed model buffer: {0}")]
    Verification(#[from] flatbuffers::InvalidFlatbuffer),

    /// The buffer does not carry the `TFL3` file identifier.
    #[error("buffer is not a TFLite model (missing 'TFL3' identifier)")]
    MissingIdentifier,

    /// The schema version is not the one this loader reads.
    #[error("unsupported schema version {0} (expected 3)")]
    UnsupportedVersion(u32),

    /// A required schema field is absent.
    #[error("{table} is missing required field '{field}'")]
    MissingField {
        table: &'static str,
        field: &'static str,
    },

    /// An index in the file points past the end of its table.
    #[error("{what} index {index} out of range ({count} entries)")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        count: usize,
    },

    /// The tensor element type has no IR counterpart.
    #[error("tensor '{tensor}' has unsupported type code {type_code}")]
    UnsupportedTensorType { tensor: String, type_code: i8 },

    /// Per-channel or otherwise multi-valued quantization.
    #[error("tensor '{tensor}' has {scales} scales and {zero_points} zero points; only one of each is supported")]
    MultiValuedQuantization {
        tensor: String,
        scales: usize,
        zero_points: usize,
    },

    /// Zero point does not fit the IR's 32-bit field.
    #[error("tensor '{tensor}' zero point {value} is out of range")]
    ZeroPointRange { tensor: String, value: i64 },

    /// `CustomQuantization` details are present.
    #[error("tensor '{tensor}' uses custom quantization")]
    CustomQuantization { tensor: String },

    /// Sparsity metadata outside the supported 2-D DENSE/CSR form.
    #[error("tensor '{tensor}' has unsupported sparsity: {reason}")]
    UnsupportedSparsity { tensor: String, reason: String },

    /// Variable (stateful) tensors.
    #[error("tensor '{tensor}' is a variable tensor")]
    VariableTensor { tensor: String },

    /// A negative entry in a tensor's shape, or one too large to address.
    #[error("tensor '{tensor}' has an invalid shape: {source}")]
    InvalidShape {
        tensor: String,
        #[source]
        source: TensorError,
    },

    /// An operator left an input absent where it may not.
    #[error("{op} does not accept an absent input (position {position})")]
    OptionalInputNotAllowed { op: String, position: usize },

    /// A structural parameter is a runtime value instead of a constant.
    #[error("{op}: '{what}' must be a constant operand")]
    NonConstantParameter { op: &'static str, what: &'static str },

    /// A structural parameter has the wrong element type or length.
    #[error("{op}: invalid '{what}': {reason}")]
    InvalidParameter {
        op: &'static str,
        what: &'static str,
        reason: String,
    },

    /// The builtin options table is absent or of the wrong type.
    #[error("{op} is missing its builtin options")]
    MissingOptions { op: &'static str },

    /// An enum-coded attribute has a value the IR cannot represent.
    #[error("{op}: unsupported {attribute} value {value}")]
    UnsupportedAttribute {
        op: &'static str,
        attribute: &'static str,
        value: i64,
    },

    /// No IR mapping exists for this operator.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Custom options are missing, of the wrong format, or lack a key.
    #[error("custom operator '{op}': {reason}")]
    MalformedCustomOptions { op: String, reason: String },

    /// The flexbuffer reader rejected custom options.
    #[error("custom operator '{op}' options could not be decoded: {source}")]
    CustomOptionsDecode {
        op: String,
        #[source]
        source: flexbuffers::ReaderError,
    },

    /// The IR rejected a graph construction step.
    #[error(transparent)]
    Ir(#[from] IrError),
}
