// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Loading entry points and tensor translation.
//!
//! # Load pipeline
//!
//! ```text
//! bytes ──► identifier ──► verifier ──► version
//!                                         │
//!            ┌────────────────────────────┘
//!            ▼
//!   for each subgraph:  tensors ─► operands (+ constants)
//!                       inputs / outputs
//!                       operators ─► operations
//!            │
//!            ▼
//!   Model<Loaded> ──validate()──► Model<Validated>
//! ```

use crate::region::MappedRegion;
use crate::schema::{self, dimension_type, quantization_details, tensor_type, BuiltinOperator, SparseIndexVector};
use crate::LoadError;
use model_ir::{
    Data, Graph, Model, OperandIndex, OperandInfo, SparsityInfo, SubgraphIndex, TypeInfo, Validated,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tensor_core::{DType, Shape, TensorError};
use tracing::{debug, info};

/// Loads a model from a file.
///
/// The file is mapped read-only. Constant tensors are copied into owned
/// buffers and the copied pages are released from the mapping as loading
/// proceeds; the mapping itself is dropped before returning.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Model<Validated>, LoadError> {
    let path = path.as_ref();
    let start = Instant::now();
    let region = MappedRegion::open(path)?;
    let loader = TfliteLoader::new(region.bytes(), ConstantSource::Mapped(&region))?;
    let model = loader.load()?;
    info!(
        "loaded '{}' in {:.1?}: {} ({} KB released from mapping)",
        path.display(),
        start.elapsed(),
        model.summary(),
        region.released_bytes() / 1024,
    );
    Ok(model)
}

/// Loads a model from an in-memory buffer.
///
/// Constant tensors reference `buffer` directly (no copy); the model keeps
/// the buffer alive for as long as any constant is in use.
pub fn load_from_buffer(buffer: impl Into<Arc<[u8]>>) -> Result<Model<Validated>, LoadError> {
    let buffer: Arc<[u8]> = buffer.into();
    let loader = TfliteLoader::new(&buffer, ConstantSource::Shared(Arc::clone(&buffer)))?;
    let model = loader.load()?;
    info!("loaded model from buffer: {}", model.summary());
    Ok(model)
}

/// Where constant tensor bytes end up.
enum ConstantSource<'a> {
    /// Zero-copy ranges into a caller-owned buffer.
    Shared(Arc<[u8]>),
    /// Owned copies; source pages are released after each copy.
    Mapped(&'a MappedRegion),
}

#[derive(Clone, Copy)]
pub(crate) struct Opcode<'a> {
    pub code: BuiltinOperator,
    pub custom_name: Option<&'a str>,
}

pub(crate) struct TfliteLoader<'a> {
    base: &'a [u8],
    model: schema::Model<'a>,
    source: ConstantSource<'a>,
    opcodes: Vec<Opcode<'a>>,
}

impl<'a> TfliteLoader<'a> {
    fn new(base: &'a [u8], source: ConstantSource<'a>) -> Result<Self, LoadError> {
        if !schema::model_buffer_has_identifier(base) {
            return Err(LoadError::MissingIdentifier);
        }
        let model = schema::root_as_model(base)?;
        if model.version() != schema::SCHEMA_VERSION {
            return Err(LoadError::UnsupportedVersion(model.version()));
        }
        let opcodes = model
            .operator_codes()
            .map(|codes| {
                codes
                    .iter()
                    .map(|c| Opcode {
                        code: c.resolved_code(),
                        custom_name: c.custom_code(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            base,
            model,
            source,
            opcodes,
        })
    }

    fn load(&self) -> Result<Model<Validated>, LoadError> {
        let subgraphs = self.model.subgraphs().ok_or(LoadError::MissingField {
            table: "Model",
            field: "subgraphs",
        })?;

        let mut model = Model::new();
        if let Some(description) = self.model.description() {
            model.set_description(description);
        }
        for (i, subgraph) in subgraphs.iter().enumerate() {
            let graph = SubgraphLoader::new(self).load(SubgraphIndex::new(i as u32), subgraph)?;
            model.push_subgraph(graph);
        }
        Ok(model.validate()?)
    }

    pub(crate) fn opcode(&self, index: u32) -> Result<Opcode<'a>, LoadError> {
        self.opcodes
            .get(index as usize)
            .copied()
            .ok_or(LoadError::IndexOutOfRange {
                what: "opcode",
                index: i64::from(index),
                count: self.opcodes.len(),
            })
    }

    /// The constant bytes of buffer `index`, or `None` if it is empty.
    fn constant(&self, index: u32) -> Result<Option<Data>, LoadError> {
        let buffers = self.model.buffers().ok_or(LoadError::MissingField {
            table: "Model",
            field: "buffers",
        })?;
        if index as usize >= buffers.len() {
            return Err(LoadError::IndexOutOfRange {
                what: "buffer",
                index: i64::from(index),
                count: buffers.len(),
            });
        }
        let Some(bytes) = buffers.get(index as usize).data().map(|d| d.bytes()) else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        // The verifier guarantees the slice lies inside `base`.
        let offset = bytes.as_ptr() as usize - self.base.as_ptr() as usize;
        let data = match &self.source {
            ConstantSource::Shared(buffer) => Data::external(Arc::clone(buffer), offset..offset + bytes.len())
                .ok_or(LoadError::IndexOutOfRange {
                    what: "buffer byte",
                    index: (offset + bytes.len()) as i64,
                    count: buffer.len(),
                })?,
            ConstantSource::Mapped(region) => {
                let data = Data::cached(bytes.to_vec());
                region.release_range(offset, bytes.len());
                data
            }
        };
        Ok(Some(data))
    }
}

/// Translates one serialized subgraph into an IR graph.
pub(crate) struct SubgraphLoader<'l, 'a> {
    pub(crate) loader: &'l TfliteLoader<'a>,
    pub(crate) graph: Graph,
    tensor_to_operand: Vec<OperandIndex>,
}

impl<'l, 'a> SubgraphLoader<'l, 'a> {
    fn new(loader: &'l TfliteLoader<'a>) -> Self {
        Self {
            loader,
            graph: Graph::new(),
            tensor_to_operand: Vec::new(),
        }
    }

    fn load(mut self, index: SubgraphIndex, subgraph: schema::SubGraph<'a>) -> Result<Graph, LoadError> {
        if let Some(name) = subgraph.name() {
            self.graph = Graph::with_name(name);
        }

        if let Some(tensors) = subgraph.tensors() {
            for tensor in tensors.iter() {
                let operand = self.load_operand(tensor)?;
                self.tensor_to_operand.push(operand);
            }
        }
        for tensor in subgraph.inputs().iter().flat_map(|v| v.iter()) {
            let operand = self.io_operand(tensor)?;
            self.graph.add_input(operand)?;
        }
        for tensor in subgraph.outputs().iter().flat_map(|v| v.iter()) {
            let operand = self.io_operand(tensor)?;
            self.graph.add_output(operand)?;
        }
        if let Some(operators) = subgraph.operators() {
            for op in operators.iter() {
                self.load_operation(op)?;
            }
        }
        debug!("{index}: {}", self.graph.summary());
        Ok(self.graph)
    }

    fn load_operand(&mut self, tensor: schema::Tensor<'a>) -> Result<OperandIndex, LoadError> {
        let name = tensor.name().unwrap_or_default();
        if tensor.is_variable() {
            return Err(LoadError::VariableTensor { tensor: name.into() });
        }

        // shape_signature (-1 for unknown dims) is not used; `shape` holds a
        // concrete placeholder that callers may override at execution time.
        let dims: Vec<i32> = tensor.shape().map(|s| s.iter().collect()).unwrap_or_default();
        let shape = Shape::from_signed(dims.as_slice()).map_err(|source| LoadError::InvalidShape {
            tensor: name.into(),
            source,
        })?;

        let dtype = convert_tensor_type(name, tensor.type_())?;
        if shape.checked_size_bytes(dtype).is_none() {
            return Err(LoadError::InvalidShape {
                tensor: name.into(),
                source: TensorError::SizeOverflow { shape, dtype },
            });
        }
        let mut type_info = convert_quantization(name, dtype, tensor.quantization())?;
        if let Some(sparsity) = tensor.sparsity() {
            type_info = type_info.with_sparsity(convert_sparsity(name, sparsity)?);
        }

        let index = self.graph.add_named_operand(OperandInfo::new(shape, type_info), name);
        if let Some(data) = self.loader.constant(tensor.buffer())? {
            self.graph.set_operand_value(index, Arc::new(data))?;
        }
        Ok(index)
    }

    fn io_operand(&self, tensor: i32) -> Result<OperandIndex, LoadError> {
        usize::try_from(tensor)
            .ok()
            .and_then(|i| self.tensor_to_operand.get(i).copied())
            .ok_or(LoadError::IndexOutOfRange {
                what: "tensor",
                index: i64::from(tensor),
                count: self.tensor_to_operand.len(),
            })
    }

    /// Maps a tensor index from an operator's I/O list; `-1` is absent.
    pub(crate) fn operand(&self, tensor: i32) -> Result<OperandIndex, LoadError> {
        if tensor == -1 {
            return Ok(OperandIndex::UNDEFINED);
        }
        self.io_operand(tensor)
    }
}

pub(crate) fn convert_tensor_type(tensor: &str, code: i8) -> Result<DType, LoadError> {
    Ok(match code {
        tensor_type::FLOAT32 => DType::Float32,
        tensor_type::INT32 => DType::Int32,
        tensor_type::INT64 => DType::Int64,
        tensor_type::BOOL => DType::Bool8,
        tensor_type::UINT8 => DType::QuantUint8Asymm,
        tensor_type::INT8 => DType::QuantInt8Symm,
        _ => {
            return Err(LoadError::UnsupportedTensorType {
                tensor: tensor.into(),
                type_code: code,
            })
        }
    })
}

fn convert_quantization(
    tensor: &str,
    dtype: DType,
    params: Option<schema::QuantizationParameters<'_>>,
) -> Result<TypeInfo, LoadError> {
    let Some(params) = params else {
        return Ok(TypeInfo::new(dtype));
    };
    if params.details_type() == quantization_details::CUSTOM_QUANTIZATION {
        return Err(LoadError::CustomQuantization { tensor: tensor.into() });
    }

    let scales = params.scale().map_or(0, |v| v.len());
    let zero_points = params.zero_point().map_or(0, |v| v.len());
    if scales > 1 || zero_points > 1 {
        return Err(LoadError::MultiValuedQuantization {
            tensor: tensor.into(),
            scales,
            zero_points,
        });
    }

    let scale = params.scale().filter(|v| !v.is_empty()).map_or(0.0, |v| v.get(0));
    let zero_point = params.zero_point().filter(|v| !v.is_empty()).map_or(0, |v| v.get(0));
    let zero_point = i32::try_from(zero_point).map_err(|_| LoadError::ZeroPointRange {
        tensor: tensor.into(),
        value: zero_point,
    })?;
    Ok(TypeInfo::quantized(dtype, scale, zero_point))
}

fn convert_sparsity(tensor: &str, sparsity: schema::SparsityParameters<'_>) -> Result<SparsityInfo, LoadError> {
    let unsupported = |reason: &str| LoadError::UnsupportedSparsity {
        tensor: tensor.into(),
        reason: reason.into(),
    };
    let dims = sparsity
        .dim_metadata()
        .ok_or_else(|| unsupported("no dimension metadata"))?;
    if dims.len() != 2 {
        return Err(unsupported(&format!("only 2-D sparsity is supported, got {} dims", dims.len())));
    }
    if dims.get(0).format() != dimension_type::DENSE {
        return Err(unsupported("dim 0 is not DENSE"));
    }
    let csr = dims.get(1);
    if csr.format() != dimension_type::SPARSE_CSR {
        return Err(unsupported("dim 1 is not SPARSE_CSR"));
    }

    let segments = csr
        .array_segments()
        .ok_or_else(|| unsupported("missing array_segments"))?;
    let indices = csr.array_indices().ok_or_else(|| unsupported("missing array_indices"))?;
    Ok(SparsityInfo {
        w1_segments: index_vector_to_u16(segments).ok_or_else(|| unsupported("segment exceeds u16"))?,
        w1_indices: index_vector_to_u16(indices).ok_or_else(|| unsupported("index exceeds u16"))?,
    })
}

fn index_vector_to_u16(vector: SparseIndexVector<'_>) -> Option<Vec<u16>> {
    match vector {
        SparseIndexVector::Int32(v) => v.iter().map(|x| u16::try_from(x).ok()).collect(),
        SparseIndexVector::Uint16(v) => Some(v.iter().collect()),
        SparseIndexVector::Uint8(v) => Some(v.iter().map(u16::from).collect()),
    }
}
