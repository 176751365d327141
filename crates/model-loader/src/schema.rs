// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! TFLite schema accessors.
//!
//! Hand-written table views over the `flatbuffers` runtime (no generated
//! code, no `.fbs` file). Only the tables and fields the loader reads are
//! modelled. Slot constants (`VT_*`) are shared with [`crate::builder`].
//!
//! Every typed view is reachable only through [`root_as_model`], which runs
//! the flatbuffers verifier over the whole buffer first; the `unsafe`
//! accessors below rely on that.

use flatbuffers::{Follow, ForwardsUOffset, InvalidFlatbuffer, Table, VOffsetT, Verifiable, Verifier, Vector};

/// File identifier at bytes 4..8 of every TFLite model.
pub const FILE_IDENTIFIER: &str = "TFL3";

/// The schema version this loader reads.
pub const SCHEMA_VERSION: u32 = 3;

// ── Enum codes ─────────────────────────────────────────────────────

pub mod tensor_type {
    pub const FLOAT32: i8 = 0;
    pub const FLOAT16: i8 = 1;
    pub const INT32: i8 = 2;
    pub const UINT8: i8 = 3;
    pub const INT64: i8 = 4;
    pub const STRING: i8 = 5;
    pub const BOOL: i8 = 6;
    pub const INT16: i8 = 7;
    pub const COMPLEX64: i8 = 8;
    pub const INT8: i8 = 9;
}

pub mod activation {
    pub const NONE: i8 = 0;
    pub const RELU: i8 = 1;
    pub const RELU_N1_TO_1: i8 = 2;
    pub const RELU6: i8 = 3;
    pub const TANH: i8 = 4;
}

pub mod padding {
    pub const SAME: i8 = 0;
    pub const VALID: i8 = 1;
}

pub mod dimension_type {
    pub const DENSE: i8 = 0;
    pub const SPARSE_CSR: i8 = 1;
}

pub mod custom_options_format {
    pub const FLEXBUFFERS: i8 = 0;
}

pub mod quantization_details {
    pub const NONE: u8 = 0;
    pub const CUSTOM_QUANTIZATION: u8 = 1;
}

pub mod sparse_index_vector {
    pub const NONE: u8 = 0;
    pub const INT32_VECTOR: u8 = 1;
    pub const UINT16_VECTOR: u8 = 2;
    pub const UINT8_VECTOR: u8 = 3;
}

/// `BuiltinOptions` union tags for the option tables this loader reads.
pub mod builtin_options {
    pub const NONE: u8 = 0;
    pub const CONV_2D: u8 = 1;
    pub const DEPTHWISE_CONV_2D: u8 = 2;
    pub const POOL_2D: u8 = 5;
    pub const FULLY_CONNECTED: u8 = 8;
    pub const SOFTMAX: u8 = 9;
    pub const CONCATENATION: u8 = 10;
    pub const ADD: u8 = 11;
    pub const RESIZE_BILINEAR: u8 = 15;
    pub const RESHAPE: u8 = 17;
    pub const SPACE_TO_DEPTH: u8 = 19;
    pub const MUL: u8 = 21;
    pub const GATHER: u8 = 23;
    pub const REDUCER: u8 = 27;
    pub const SUB: u8 = 28;
    pub const DIV: u8 = 29;
    pub const SQUEEZE: u8 = 30;
    pub const STRIDED_SLICE: u8 = 32;
    pub const SPLIT: u8 = 35;
    pub const ARG_MAX: u8 = 40;
    pub const TRANSPOSE_CONV: u8 = 49;
    pub const PACK: u8 = 59;
    pub const ONE_HOT: u8 = 61;
    pub const UNPACK: u8 = 64;
    pub const RESIZE_NEAREST_NEIGHBOR: u8 = 74;
    pub const LEAKY_RELU: u8 = 75;
    pub const SPLIT_V: u8 = 79;
    pub const IF: u8 = 92;
    pub const WHILE: u8 = 93;
    pub const BATCH_MATMUL: u8 = 101;
}

/// A TFLite builtin operator code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuiltinOperator(pub i32);

macro_rules! builtin_operators {
    ($($name:ident = $code:literal,)*) => {
        impl BuiltinOperator {
            $(pub const $name: Self = Self($code);)*

            /// Schema name of a known code.
            pub fn variant_name(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

builtin_operators! {
    ADD = 0,
    AVERAGE_POOL_2D = 1,
    CONCATENATION = 2,
    CONV_2D = 3,
    DEPTHWISE_CONV_2D = 4,
    FULLY_CONNECTED = 9,
    L2_NORMALIZATION = 11,
    LOGISTIC = 14,
    MAX_POOL_2D = 17,
    MUL = 18,
    RELU = 19,
    RELU_N1_TO_1 = 20,
    RELU6 = 21,
    RESHAPE = 22,
    RESIZE_BILINEAR = 23,
    SOFTMAX = 25,
    SPACE_TO_DEPTH = 26,
    TANH = 28,
    CUSTOM = 32,
    PAD = 34,
    GATHER = 36,
    BATCH_TO_SPACE_ND = 37,
    SPACE_TO_BATCH_ND = 38,
    TRANSPOSE = 39,
    MEAN = 40,
    SUB = 41,
    DIV = 42,
    SQUEEZE = 43,
    STRIDED_SLICE = 45,
    EXP = 47,
    SPLIT = 49,
    LOG_SOFTMAX = 50,
    CAST = 53,
    PRELU = 54,
    MAXIMUM = 55,
    ARG_MAX = 56,
    MINIMUM = 57,
    LESS = 58,
    NEG = 59,
    PADV2 = 60,
    GREATER = 61,
    GREATER_EQUAL = 62,
    LESS_EQUAL = 63,
    SELECT = 64,
    SLICE = 65,
    SIN = 66,
    TRANSPOSE_CONV = 67,
    TILE = 69,
    EXPAND_DIMS = 70,
    EQUAL = 71,
    NOT_EQUAL = 72,
    LOG = 73,
    SUM = 74,
    SQRT = 75,
    RSQRT = 76,
    SHAPE = 77,
    POW = 78,
    REDUCE_PROD = 81,
    REDUCE_MAX = 82,
    PACK = 83,
    LOGICAL_OR = 84,
    ONE_HOT = 85,
    LOGICAL_NOT = 87,
    UNPACK = 88,
    REDUCE_ANY = 91,
    ZEROS_LIKE = 93,
    FILL = 94,
    RANGE = 96,
    RESIZE_NEAREST_NEIGHBOR = 97,
    LEAKY_RELU = 98,
    SQUARED_DIFFERENCE = 99,
    ABS = 101,
    SPLIT_V = 102,
    REVERSE_V2 = 105,
    COS = 108,
    RANK = 110,
    QUANTIZE = 114,
    ROUND = 116,
    IF = 118,
    WHILE = 119,
    SELECT_V2 = 123,
    BATCH_MATMUL = 126,
}

impl std::fmt::Display for BuiltinOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "BUILTIN_{}", self.0),
        }
    }
}

// ── Field access helpers ───────────────────────────────────────────

#[inline]
fn scalar<'a, T>(tab: &Table<'a>, slot: VOffsetT, default: T) -> T
where
    T: Follow<'a, Inner = T> + Copy + 'a,
{
    // SAFETY: the buffer was verified by `root_as_model`.
    unsafe { tab.get::<T>(slot, Some(default)) }.unwrap_or(default)
}

#[inline]
fn vector<'a, T: Follow<'a> + 'a>(tab: &Table<'a>, slot: VOffsetT) -> Option<Vector<'a, T>> {
    // SAFETY: the buffer was verified by `root_as_model`.
    unsafe { tab.get::<ForwardsUOffset<Vector<'a, T>>>(slot, None) }
}

#[inline]
fn string<'a>(tab: &Table<'a>, slot: VOffsetT) -> Option<&'a str> {
    // SAFETY: the buffer was verified by `root_as_model`.
    unsafe { tab.get::<ForwardsUOffset<&'a str>>(slot, None) }
}

#[inline]
fn table<'a, T: Follow<'a> + 'a>(tab: &Table<'a>, slot: VOffsetT) -> Option<T::Inner> {
    // SAFETY: the buffer was verified by `root_as_model`.
    unsafe { tab.get::<ForwardsUOffset<T>>(slot, None) }
}

/// A table that can appear as a union variant.
pub trait UnionMember<'a>: Sized {
    const TAG: u8;
    fn from_table(tab: Table<'a>) -> Self;
}

macro_rules! table_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name<'a> {
            _tab: Table<'a>,
        }

        impl<'a> Follow<'a> for $name<'a> {
            type Inner = $name<'a>;
            #[inline]
            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    _tab: Table::new(buf, loc),
                }
            }
        }
    };
}

/// Declares a table made of scalar and scalar-vector fields.
macro_rules! options_table {
    (
        $(#[$meta:meta])* $name:ident $(= $tag:path)? {
            $($field:ident: $ty:ty = ($slot:ident, $vt:literal, $default:expr);)*
            $([$vfield:ident: $vty:ty = ($vslot:ident, $vvt:literal)];)*
        }
    ) => {
        table_view!($(#[$meta])* $name);

        impl<'a> $name<'a> {
            $(pub const $slot: VOffsetT = $vt;)*
            $(pub const $vslot: VOffsetT = $vvt;)*

            $(
                #[inline]
                pub fn $field(&self) -> $ty {
                    scalar::<$ty>(&self._tab, Self::$slot, $default)
                }
            )*
            $(
                #[inline]
                pub fn $vfield(&self) -> Option<Vector<'a, $vty>> {
                    vector::<$vty>(&self._tab, Self::$vslot)
                }
            )*
        }

        $(
            impl<'a> UnionMember<'a> for $name<'a> {
                const TAG: u8 = $tag;
                fn from_table(tab: Table<'a>) -> Self {
                    Self { _tab: tab }
                }
            }
        )?

        impl Verifiable for $name<'_> {
            #[inline]
            fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
                v.visit_table(pos)?
                    $(.visit_field::<$ty>(stringify!($field), Self::$slot, false)?)*
                    $(.visit_field::<ForwardsUOffset<Vector<'_, $vty>>>(stringify!($vfield), Self::$vslot, false)?)*
                    .finish();
                Ok(())
            }
        }
    };
}

// ── Model ──────────────────────────────────────────────────────────

table_view!(
    /// Root table.
    Model
);

impl<'a> Model<'a> {
    pub const VT_VERSION: VOffsetT = 4;
    pub const VT_OPERATOR_CODES: VOffsetT = 6;
    pub const VT_SUBGRAPHS: VOffsetT = 8;
    pub const VT_DESCRIPTION: VOffsetT = 10;
    pub const VT_BUFFERS: VOffsetT = 12;

    pub fn version(&self) -> u32 {
        scalar::<u32>(&self._tab, Self::VT_VERSION, 0)
    }

    pub fn operator_codes(&self) -> Option<Vector<'a, ForwardsUOffset<OperatorCode<'a>>>> {
        vector(&self._tab, Self::VT_OPERATOR_CODES)
    }

    pub fn subgraphs(&self) -> Option<Vector<'a, ForwardsUOffset<SubGraph<'a>>>> {
        vector(&self._tab, Self::VT_SUBGRAPHS)
    }

    pub fn description(&self) -> Option<&'a str> {
        string(&self._tab, Self::VT_DESCRIPTION)
    }

    pub fn buffers(&self) -> Option<Vector<'a, ForwardsUOffset<Buffer<'a>>>> {
        vector(&self._tab, Self::VT_BUFFERS)
    }
}

impl Verifiable for Model<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("version", Self::VT_VERSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<OperatorCode>>>>(
                "operator_codes",
                Self::VT_OPERATOR_CODES,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<SubGraph>>>>(
                "subgraphs",
                Self::VT_SUBGRAPHS,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("description", Self::VT_DESCRIPTION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Buffer>>>>(
                "buffers",
                Self::VT_BUFFERS,
                false,
            )?
            .finish();
        Ok(())
    }
}

/// Verifies `buf` and returns its root table.
pub fn root_as_model(buf: &[u8]) -> Result<Model<'_>, InvalidFlatbuffer> {
    flatbuffers::root::<Model>(buf)
}

/// Whether `buf` carries the TFLite file identifier.
pub fn model_buffer_has_identifier(buf: &[u8]) -> bool {
    buf.len() >= 8 && flatbuffers::buffer_has_identifier(buf, FILE_IDENTIFIER, false)
}

// ── OperatorCode ───────────────────────────────────────────────────

table_view!(OperatorCode);

impl<'a> OperatorCode<'a> {
    pub const VT_DEPRECATED_BUILTIN_CODE: VOffsetT = 4;
    pub const VT_CUSTOM_CODE: VOffsetT = 6;
    pub const VT_VERSION: VOffsetT = 8;
    pub const VT_BUILTIN_CODE: VOffsetT = 10;

    pub fn deprecated_builtin_code(&self) -> i8 {
        scalar::<i8>(&self._tab, Self::VT_DEPRECATED_BUILTIN_CODE, 0)
    }

    pub fn custom_code(&self) -> Option<&'a str> {
        string(&self._tab, Self::VT_CUSTOM_CODE)
    }

    pub fn version(&self) -> i32 {
        scalar::<i32>(&self._tab, Self::VT_VERSION, 1)
    }

    pub fn builtin_code(&self) -> i32 {
        scalar::<i32>(&self._tab, Self::VT_BUILTIN_CODE, 0)
    }

    /// Files written before code 127 existed only set the deprecated
    /// byte; newer writers set both. The larger value is authoritative.
    pub fn resolved_code(&self) -> BuiltinOperator {
        BuiltinOperator(self.builtin_code().max(i32::from(self.deprecated_builtin_code())))
    }
}

impl Verifiable for OperatorCode<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i8>("deprecated_builtin_code", Self::VT_DEPRECATED_BUILTIN_CODE, false)?
            .visit_field::<ForwardsUOffset<&str>>("custom_code", Self::VT_CUSTOM_CODE, false)?
            .visit_field::<i32>("version", Self::VT_VERSION, false)?
            .visit_field::<i32>("builtin_code", Self::VT_BUILTIN_CODE, false)?
            .finish();
        Ok(())
    }
}

// ── SubGraph ───────────────────────────────────────────────────────

table_view!(SubGraph);

impl<'a> SubGraph<'a> {
    pub const VT_TENSORS: VOffsetT = 4;
    pub const VT_INPUTS: VOffsetT = 6;
    pub const VT_OUTPUTS: VOffsetT = 8;
    pub const VT_OPERATORS: VOffsetT = 10;
    pub const VT_NAME: VOffsetT = 12;

    pub fn tensors(&self) -> Option<Vector<'a, ForwardsUOffset<Tensor<'a>>>> {
        vector(&self._tab, Self::VT_TENSORS)
    }

    pub fn inputs(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_INPUTS)
    }

    pub fn outputs(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_OUTPUTS)
    }

    pub fn operators(&self) -> Option<Vector<'a, ForwardsUOffset<Operator<'a>>>> {
        vector(&self._tab, Self::VT_OPERATORS)
    }

    pub fn name(&self) -> Option<&'a str> {
        string(&self._tab, Self::VT_NAME)
    }
}

impl Verifiable for SubGraph<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Tensor>>>>(
                "tensors",
                Self::VT_TENSORS,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("inputs", Self::VT_INPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("outputs", Self::VT_OUTPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Operator>>>>(
                "operators",
                Self::VT_OPERATORS,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .finish();
        Ok(())
    }
}

// ── Tensor ─────────────────────────────────────────────────────────

table_view!(Tensor);

impl<'a> Tensor<'a> {
    pub const VT_SHAPE: VOffsetT = 4;
    pub const VT_TYPE: VOffsetT = 6;
    pub const VT_BUFFER: VOffsetT = 8;
    pub const VT_NAME: VOffsetT = 10;
    pub const VT_QUANTIZATION: VOffsetT = 12;
    pub const VT_IS_VARIABLE: VOffsetT = 14;
    pub const VT_SPARSITY: VOffsetT = 16;
    pub const VT_SHAPE_SIGNATURE: VOffsetT = 18;

    pub fn shape(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_SHAPE)
    }

    pub fn type_(&self) -> i8 {
        scalar::<i8>(&self._tab, Self::VT_TYPE, tensor_type::FLOAT32)
    }

    pub fn buffer(&self) -> u32 {
        scalar::<u32>(&self._tab, Self::VT_BUFFER, 0)
    }

    pub fn name(&self) -> Option<&'a str> {
        string(&self._tab, Self::VT_NAME)
    }

    pub fn quantization(&self) -> Option<QuantizationParameters<'a>> {
        table::<QuantizationParameters>(&self._tab, Self::VT_QUANTIZATION)
    }

    pub fn is_variable(&self) -> bool {
        scalar::<bool>(&self._tab, Self::VT_IS_VARIABLE, false)
    }

    pub fn sparsity(&self) -> Option<SparsityParameters<'a>> {
        table::<SparsityParameters>(&self._tab, Self::VT_SPARSITY)
    }

    pub fn shape_signature(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_SHAPE_SIGNATURE)
    }
}

impl Verifiable for Tensor<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("shape", Self::VT_SHAPE, false)?
            .visit_field::<i8>("type", Self::VT_TYPE, false)?
            .visit_field::<u32>("buffer", Self::VT_BUFFER, false)?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .visit_field::<ForwardsUOffset<QuantizationParameters>>("quantization", Self::VT_QUANTIZATION, false)?
            .visit_field::<bool>("is_variable", Self::VT_IS_VARIABLE, false)?
            .visit_field::<ForwardsUOffset<SparsityParameters>>("sparsity", Self::VT_SPARSITY, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("shape_signature", Self::VT_SHAPE_SIGNATURE, false)?
            .finish();
        Ok(())
    }
}

// ── Quantization ───────────────────────────────────────────────────

table_view!(QuantizationParameters);

impl<'a> QuantizationParameters<'a> {
    pub const VT_MIN: VOffsetT = 4;
    pub const VT_MAX: VOffsetT = 6;
    pub const VT_SCALE: VOffsetT = 8;
    pub const VT_ZERO_POINT: VOffsetT = 10;
    pub const VT_DETAILS_TYPE: VOffsetT = 12;
    pub const VT_DETAILS: VOffsetT = 14;
    pub const VT_QUANTIZED_DIMENSION: VOffsetT = 16;

    pub fn scale(&self) -> Option<Vector<'a, f32>> {
        vector(&self._tab, Self::VT_SCALE)
    }

    pub fn zero_point(&self) -> Option<Vector<'a, i64>> {
        vector(&self._tab, Self::VT_ZERO_POINT)
    }

    pub fn details_type(&self) -> u8 {
        scalar::<u8>(&self._tab, Self::VT_DETAILS_TYPE, quantization_details::NONE)
    }

    pub fn quantized_dimension(&self) -> i32 {
        scalar::<i32>(&self._tab, Self::VT_QUANTIZED_DIMENSION, 0)
    }
}

impl Verifiable for QuantizationParameters<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, f32>>>("min", Self::VT_MIN, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f32>>>("max", Self::VT_MAX, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f32>>>("scale", Self::VT_SCALE, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i64>>>("zero_point", Self::VT_ZERO_POINT, false)?
            .visit_union::<u8, _>(
                "details_type",
                Self::VT_DETAILS_TYPE,
                "details",
                Self::VT_DETAILS,
                false,
                |tag, v, pos| match tag {
                    quantization_details::CUSTOM_QUANTIZATION => {
                        v.verify_union_variant::<ForwardsUOffset<CustomQuantization>>("CustomQuantization", pos)
                    }
                    _ => Ok(()),
                },
            )?
            .visit_field::<i32>("quantized_dimension", Self::VT_QUANTIZED_DIMENSION, false)?
            .finish();
        Ok(())
    }
}

options_table!(CustomQuantization = quantization_details::CUSTOM_QUANTIZATION {
    [custom: u8 = (VT_CUSTOM, 4)];
});

// ── Sparsity ───────────────────────────────────────────────────────

table_view!(SparsityParameters);

impl<'a> SparsityParameters<'a> {
    pub const VT_TRAVERSAL_ORDER: VOffsetT = 4;
    pub const VT_BLOCK_MAP: VOffsetT = 6;
    pub const VT_DIM_METADATA: VOffsetT = 8;

    pub fn dim_metadata(&self) -> Option<Vector<'a, ForwardsUOffset<DimensionMetadata<'a>>>> {
        vector(&self._tab, Self::VT_DIM_METADATA)
    }
}

impl Verifiable for SparsityParameters<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("traversal_order", Self::VT_TRAVERSAL_ORDER, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("block_map", Self::VT_BLOCK_MAP, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<DimensionMetadata>>>>(
                "dim_metadata",
                Self::VT_DIM_METADATA,
                false,
            )?
            .finish();
        Ok(())
    }
}

table_view!(DimensionMetadata);

/// A decoded `SparseIndexVector` union value.
#[derive(Clone, Copy)]
pub enum SparseIndexVector<'a> {
    Int32(Vector<'a, i32>),
    Uint16(Vector<'a, u16>),
    Uint8(Vector<'a, u8>),
}

impl<'a> DimensionMetadata<'a> {
    pub const VT_FORMAT: VOffsetT = 4;
    pub const VT_DENSE_SIZE: VOffsetT = 6;
    pub const VT_ARRAY_SEGMENTS_TYPE: VOffsetT = 8;
    pub const VT_ARRAY_SEGMENTS: VOffsetT = 10;
    pub const VT_ARRAY_INDICES_TYPE: VOffsetT = 12;
    pub const VT_ARRAY_INDICES: VOffsetT = 14;

    pub fn format(&self) -> i8 {
        scalar::<i8>(&self._tab, Self::VT_FORMAT, dimension_type::DENSE)
    }

    pub fn dense_size(&self) -> i32 {
        scalar::<i32>(&self._tab, Self::VT_DENSE_SIZE, 0)
    }

    pub fn array_segments(&self) -> Option<SparseIndexVector<'a>> {
        let tag = scalar::<u8>(&self._tab, Self::VT_ARRAY_SEGMENTS_TYPE, sparse_index_vector::NONE);
        self.index_vector(tag, Self::VT_ARRAY_SEGMENTS)
    }

    pub fn array_indices(&self) -> Option<SparseIndexVector<'a>> {
        let tag = scalar::<u8>(&self._tab, Self::VT_ARRAY_INDICES_TYPE, sparse_index_vector::NONE);
        self.index_vector(tag, Self::VT_ARRAY_INDICES)
    }

    fn index_vector(&self, tag: u8, slot: VOffsetT) -> Option<SparseIndexVector<'a>> {
        let tab = table::<Table<'a>>(&self._tab, slot)?;
        match tag {
            sparse_index_vector::INT32_VECTOR => Int32Vector::from_table(tab).values().map(SparseIndexVector::Int32),
            sparse_index_vector::UINT16_VECTOR => Uint16Vector::from_table(tab).values().map(SparseIndexVector::Uint16),
            sparse_index_vector::UINT8_VECTOR => Uint8Vector::from_table(tab).values().map(SparseIndexVector::Uint8),
            _ => None,
        }
    }
}

fn verify_sparse_index_vector(tag: u8, v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
    match tag {
        sparse_index_vector::INT32_VECTOR => v.verify_union_variant::<ForwardsUOffset<Int32Vector>>("Int32Vector", pos),
        sparse_index_vector::UINT16_VECTOR => {
            v.verify_union_variant::<ForwardsUOffset<Uint16Vector>>("Uint16Vector", pos)
        }
        sparse_index_vector::UINT8_VECTOR => v.verify_union_variant::<ForwardsUOffset<Uint8Vector>>("Uint8Vector", pos),
        _ => Ok(()),
    }
}

impl Verifiable for DimensionMetadata<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i8>("format", Self::VT_FORMAT, false)?
            .visit_field::<i32>("dense_size", Self::VT_DENSE_SIZE, false)?
            .visit_union::<u8, _>(
                "array_segments_type",
                Self::VT_ARRAY_SEGMENTS_TYPE,
                "array_segments",
                Self::VT_ARRAY_SEGMENTS,
                false,
                verify_sparse_index_vector,
            )?
            .visit_union::<u8, _>(
                "array_indices_type",
                Self::VT_ARRAY_INDICES_TYPE,
                "array_indices",
                Self::VT_ARRAY_INDICES,
                false,
                verify_sparse_index_vector,
            )?
            .finish();
        Ok(())
    }
}

options_table!(Int32Vector = sparse_index_vector::INT32_VECTOR {
    [values: i32 = (VT_VALUES, 4)];
});

options_table!(Uint16Vector = sparse_index_vector::UINT16_VECTOR {
    [values: u16 = (VT_VALUES, 4)];
});

options_table!(Uint8Vector = sparse_index_vector::UINT8_VECTOR {
    [values: u8 = (VT_VALUES, 4)];
});

// ── Buffer ─────────────────────────────────────────────────────────

options_table!(
    /// A raw byte payload referenced by tensors.
    Buffer {
        [data: u8 = (VT_DATA, 4)];
    }
);

// ── Operator ───────────────────────────────────────────────────────

table_view!(Operator);

impl<'a> Operator<'a> {
    pub const VT_OPCODE_INDEX: VOffsetT = 4;
    pub const VT_INPUTS: VOffsetT = 6;
    pub const VT_OUTPUTS: VOffsetT = 8;
    pub const VT_BUILTIN_OPTIONS_TYPE: VOffsetT = 10;
    pub const VT_BUILTIN_OPTIONS: VOffsetT = 12;
    pub const VT_CUSTOM_OPTIONS: VOffsetT = 14;
    pub const VT_CUSTOM_OPTIONS_FORMAT: VOffsetT = 16;

    pub fn opcode_index(&self) -> u32 {
        scalar::<u32>(&self._tab, Self::VT_OPCODE_INDEX, 0)
    }

    pub fn inputs(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_INPUTS)
    }

    pub fn outputs(&self) -> Option<Vector<'a, i32>> {
        vector(&self._tab, Self::VT_OUTPUTS)
    }

    pub fn builtin_options_type(&self) -> u8 {
        scalar::<u8>(&self._tab, Self::VT_BUILTIN_OPTIONS_TYPE, builtin_options::NONE)
    }

    /// The builtin options, if present and of type `T`.
    pub fn builtin_options_as<T: UnionMember<'a>>(&self) -> Option<T> {
        if self.builtin_options_type() != T::TAG {
            return None;
        }
        table::<Table<'a>>(&self._tab, Self::VT_BUILTIN_OPTIONS).map(T::from_table)
    }

    pub fn custom_options(&self) -> Option<Vector<'a, u8>> {
        vector(&self._tab, Self::VT_CUSTOM_OPTIONS)
    }

    pub fn custom_options_format(&self) -> i8 {
        scalar::<i8>(&self._tab, Self::VT_CUSTOM_OPTIONS_FORMAT, custom_options_format::FLEXBUFFERS)
    }
}

impl Verifiable for Operator<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("opcode_index", Self::VT_OPCODE_INDEX, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("inputs", Self::VT_INPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("outputs", Self::VT_OUTPUTS, false)?
            .visit_union::<u8, _>(
                "builtin_options_type",
                Self::VT_BUILTIN_OPTIONS_TYPE,
                "builtin_options",
                Self::VT_BUILTIN_OPTIONS,
                false,
                verify_builtin_options,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, u8>>>("custom_options", Self::VT_CUSTOM_OPTIONS, false)?
            .visit_field::<i8>("custom_options_format", Self::VT_CUSTOM_OPTIONS_FORMAT, false)?
            .finish();
        Ok(())
    }
}

// ── Builtin options ────────────────────────────────────────────────

macro_rules! verify_options {
    ($tag:ident, $v:ident, $pos:ident; $($name:ident),* $(,)?) => {
        $(
            if $tag == <$name as UnionMember>::TAG {
                return $v.verify_union_variant::<ForwardsUOffset<$name>>(stringify!($name), $pos);
            }
        )*
    };
}

fn verify_builtin_options(tag: u8, v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
    verify_options!(tag, v, pos;
        Conv2DOptions, DepthwiseConv2DOptions, Pool2DOptions, FullyConnectedOptions,
        SoftmaxOptions, ConcatenationOptions, AddOptions, ResizeBilinearOptions,
        ReshapeOptions, SpaceToDepthOptions, MulOptions, GatherOptions, ReducerOptions,
        SubOptions, DivOptions, SqueezeOptions, StridedSliceOptions, SplitOptions,
        ArgMaxOptions, TransposeConvOptions, PackOptions, OneHotOptions, UnpackOptions,
        ResizeNearestNeighborOptions, LeakyReluOptions, SplitVOptions, IfOptions,
        WhileOptions, BatchMatMulOptions,
    );
    // Option tables the loader never reads are left unverified and unread.
    Ok(())
}

options_table!(Conv2DOptions = builtin_options::CONV_2D {
    padding: i8 = (VT_PADDING, 4, padding::SAME);
    stride_w: i32 = (VT_STRIDE_W, 6, 0);
    stride_h: i32 = (VT_STRIDE_H, 8, 0);
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 10, activation::NONE);
    dilation_w_factor: i32 = (VT_DILATION_W_FACTOR, 12, 1);
    dilation_h_factor: i32 = (VT_DILATION_H_FACTOR, 14, 1);
});

options_table!(DepthwiseConv2DOptions = builtin_options::DEPTHWISE_CONV_2D {
    padding: i8 = (VT_PADDING, 4, padding::SAME);
    stride_w: i32 = (VT_STRIDE_W, 6, 0);
    stride_h: i32 = (VT_STRIDE_H, 8, 0);
    depth_multiplier: i32 = (VT_DEPTH_MULTIPLIER, 10, 0);
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 12, activation::NONE);
    dilation_w_factor: i32 = (VT_DILATION_W_FACTOR, 14, 1);
    dilation_h_factor: i32 = (VT_DILATION_H_FACTOR, 16, 1);
});

options_table!(Pool2DOptions = builtin_options::POOL_2D {
    padding: i8 = (VT_PADDING, 4, padding::SAME);
    stride_w: i32 = (VT_STRIDE_W, 6, 0);
    stride_h: i32 = (VT_STRIDE_H, 8, 0);
    filter_width: i32 = (VT_FILTER_WIDTH, 10, 0);
    filter_height: i32 = (VT_FILTER_HEIGHT, 12, 0);
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 14, activation::NONE);
});

options_table!(FullyConnectedOptions = builtin_options::FULLY_CONNECTED {
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 4, activation::NONE);
    weights_format: i8 = (VT_WEIGHTS_FORMAT, 6, 0);
    keep_num_dims: bool = (VT_KEEP_NUM_DIMS, 8, false);
});

options_table!(SoftmaxOptions = builtin_options::SOFTMAX {
    beta: f32 = (VT_BETA, 4, 0.0);
});

options_table!(ConcatenationOptions = builtin_options::CONCATENATION {
    axis: i32 = (VT_AXIS, 4, 0);
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 6, activation::NONE);
});

options_table!(AddOptions = builtin_options::ADD {
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 4, activation::NONE);
});

options_table!(SubOptions = builtin_options::SUB {
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 4, activation::NONE);
});

options_table!(MulOptions = builtin_options::MUL {
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 4, activation::NONE);
});

options_table!(DivOptions = builtin_options::DIV {
    fused_activation_function: i8 = (VT_FUSED_ACTIVATION_FUNCTION, 4, activation::NONE);
});

options_table!(ResizeBilinearOptions = builtin_options::RESIZE_BILINEAR {
    align_corners: bool = (VT_ALIGN_CORNERS, 8, false);
    half_pixel_centers: bool = (VT_HALF_PIXEL_CENTERS, 10, false);
});

options_table!(ResizeNearestNeighborOptions = builtin_options::RESIZE_NEAREST_NEIGHBOR {
    align_corners: bool = (VT_ALIGN_CORNERS, 4, false);
    half_pixel_centers: bool = (VT_HALF_PIXEL_CENTERS, 6, false);
});

options_table!(ReshapeOptions = builtin_options::RESHAPE {
    [new_shape: i32 = (VT_NEW_SHAPE, 4)];
});

options_table!(SpaceToDepthOptions = builtin_options::SPACE_TO_DEPTH {
    block_size: i32 = (VT_BLOCK_SIZE, 4, 0);
});

options_table!(GatherOptions = builtin_options::GATHER {
    axis: i32 = (VT_AXIS, 4, 0);
});

options_table!(ReducerOptions = builtin_options::REDUCER {
    keep_dims: bool = (VT_KEEP_DIMS, 4, false);
});

options_table!(SqueezeOptions = builtin_options::SQUEEZE {
    [squeeze_dims: i32 = (VT_SQUEEZE_DIMS, 4)];
});

options_table!(StridedSliceOptions = builtin_options::STRIDED_SLICE {
    begin_mask: i32 = (VT_BEGIN_MASK, 4, 0);
    end_mask: i32 = (VT_END_MASK, 6, 0);
    ellipsis_mask: i32 = (VT_ELLIPSIS_MASK, 8, 0);
    new_axis_mask: i32 = (VT_NEW_AXIS_MASK, 10, 0);
    shrink_axis_mask: i32 = (VT_SHRINK_AXIS_MASK, 12, 0);
});

options_table!(SplitOptions = builtin_options::SPLIT {
    num_splits: i32 = (VT_NUM_SPLITS, 4, 0);
});

options_table!(SplitVOptions = builtin_options::SPLIT_V {
    num_splits: i32 = (VT_NUM_SPLITS, 4, 0);
});

options_table!(ArgMaxOptions = builtin_options::ARG_MAX {
    output_type: i8 = (VT_OUTPUT_TYPE, 4, tensor_type::FLOAT32);
});

options_table!(TransposeConvOptions = builtin_options::TRANSPOSE_CONV {
    padding: i8 = (VT_PADDING, 4, padding::SAME);
    stride_w: i32 = (VT_STRIDE_W, 6, 0);
    stride_h: i32 = (VT_STRIDE_H, 8, 0);
});

options_table!(PackOptions = builtin_options::PACK {
    values_count: i32 = (VT_VALUES_COUNT, 4, 0);
    axis: i32 = (VT_AXIS, 6, 0);
});

options_table!(UnpackOptions = builtin_options::UNPACK {
    num: i32 = (VT_NUM, 4, 0);
    axis: i32 = (VT_AXIS, 6, 0);
});

options_table!(OneHotOptions = builtin_options::ONE_HOT {
    axis: i32 = (VT_AXIS, 4, 0);
});

options_table!(LeakyReluOptions = builtin_options::LEAKY_RELU {
    alpha: f32 = (VT_ALPHA, 4, 0.0);
});

options_table!(IfOptions = builtin_options::IF {
    then_subgraph_index: i32 = (VT_THEN_SUBGRAPH_INDEX, 4, 0);
    else_subgraph_index: i32 = (VT_ELSE_SUBGRAPH_INDEX, 6, 0);
});

options_table!(WhileOptions = builtin_options::WHILE {
    cond_subgraph_index: i32 = (VT_COND_SUBGRAPH_INDEX, 4, 0);
    body_subgraph_index: i32 = (VT_BODY_SUBGRAPH_INDEX, 6, 0);
});

options_table!(BatchMatMulOptions = builtin_options::BATCH_MATMUL {
    adj_x: bool = (VT_ADJ_X, 4, false);
    adj_y: bool = (VT_ADJ_Y, 6, false);
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_names() {
        assert_eq!(BuiltinOperator::CONV_2D.variant_name(), Some("CONV_2D"));
        assert_eq!(BuiltinOperator(1000).variant_name(), None);
        assert_eq!(BuiltinOperator(1000).to_string(), "BUILTIN_1000");
        assert_eq!(BuiltinOperator::BATCH_MATMUL.to_string(), "BATCH_MATMUL");
    }

    #[test]
    fn test_identifier_on_short_buffer() {
        assert!(!model_buffer_has_identifier(&[0u8; 4]));
        assert!(model_buffer_has_identifier(b"\0\0\0\0TFL3"));
    }

    #[test]
    fn test_garbage_is_rejected_by_verifier() {
        let garbage = [0xffu8; 64];
        assert!(root_as_model(&garbage).is_err());
    }
}
