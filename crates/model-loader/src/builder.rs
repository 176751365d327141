// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Writing TFLite flatbuffers.
//!
//! [`ModelBuilder`] is the inverse of the loader for the subset of the
//! schema the loader reads. It exists so tests, benches and tools can
//! describe a model in a few lines instead of shipping binary fixtures.
//!
//! ```
//! use model_loader::builder::{BuiltinOptions, ModelBuilder, OperatorDef, SubgraphDef, TensorDef};
//! use model_loader::schema::{activation, tensor_type, BuiltinOperator};
//!
//! let mut main = SubgraphDef::new("main");
//! let a = main.add_tensor(TensorDef::new("a", tensor_type::FLOAT32, &[1, 4]));
//! let b = main.add_tensor(TensorDef::new("b", tensor_type::FLOAT32, &[1, 4]));
//! let out = main.add_tensor(TensorDef::new("out", tensor_type::FLOAT32, &[1, 4]));
//! main.set_inputs(&[a, b]);
//! main.set_outputs(&[out]);
//! main.add_operator(
//!     OperatorDef::builtin(BuiltinOperator::ADD, &[a, b], &[out])
//!         .with_options(BuiltinOptions::add(activation::RELU)),
//! );
//!
//! let bytes = ModelBuilder::new().with_subgraph(main).build();
//! let model = model_loader::load_from_buffer(bytes).unwrap();
//! assert_eq!(model.primary().num_operations(), 1);
//! ```

use crate::schema::{self, builtin_options as tag, custom_options_format, dimension_type, sparse_index_vector};
use crate::schema::{BuiltinOperator, FILE_IDENTIFIER, SCHEMA_VERSION};
use flatbuffers::{FlatBufferBuilder, Push, TableFinishedWIPOffset, VOffsetT, WIPOffset};

/// A tensor entry of a subgraph.
#[derive(Debug, Clone)]
pub struct TensorDef {
    name: String,
    dtype: i8,
    shape: Vec<i32>,
    data: Option<Vec<u8>>,
    scales: Vec<f32>,
    zero_points: Vec<i64>,
    quantization: bool,
    custom_quantization: bool,
    is_variable: bool,
    sparsity: Option<(Vec<i32>, Vec<i32>)>,
}

impl TensorDef {
    /// `dtype` is a [`schema::tensor_type`] code.
    pub fn new(name: impl Into<String>, dtype: i8, shape: &[i32]) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape: shape.to_vec(),
            data: None,
            scales: Vec::new(),
            zero_points: Vec::new(),
            quantization: false,
            custom_quantization: false,
            is_variable: false,
            sparsity: None,
        }
    }

    /// Makes the tensor constant with the given raw bytes.
    pub fn with_data(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.data = Some(bytes.into());
        self
    }

    pub fn with_f32s(self, values: &[f32]) -> Self {
        self.with_data(bytemuck::cast_slice::<f32, u8>(values))
    }

    pub fn with_i32s(self, values: &[i32]) -> Self {
        self.with_data(bytemuck::cast_slice::<i32, u8>(values))
    }

    pub fn with_i64s(self, values: &[i64]) -> Self {
        self.with_data(bytemuck::cast_slice::<i64, u8>(values))
    }

    pub fn with_quantization(mut self, scales: &[f32], zero_points: &[i64]) -> Self {
        self.quantization = true;
        self.scales = scales.to_vec();
        self.zero_points = zero_points.to_vec();
        self
    }

    /// Attaches a `CustomQuantization` detail, which the loader rejects.
    pub fn with_custom_quantization(mut self) -> Self {
        self.quantization = true;
        self.custom_quantization = true;
        self
    }

    pub fn variable(mut self) -> Self {
        self.is_variable = true;
        self
    }

    /// 2-D sparsity: dense rows, CSR columns, stored as `Int32Vector`s.
    pub fn with_sparsity(mut self, segments: &[i32], indices: &[i32]) -> Self {
        self.sparsity = Some((segments.to_vec(), indices.to_vec()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Field {
    I8(i8),
    I32(i32),
    F32(f32),
    Bool(bool),
    I32s(Vec<i32>),
}

/// A builtin options table: its union tag plus `(vtable slot, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinOptions {
    tag: u8,
    fields: Vec<(VOffsetT, Field)>,
}

impl BuiltinOptions {
    /// An empty table of the given [`schema::builtin_options`] tag.
    pub fn new(tag: u8) -> Self {
        Self { tag, fields: Vec::new() }
    }

    pub fn i8(mut self, slot: VOffsetT, value: i8) -> Self {
        self.fields.push((slot, Field::I8(value)));
        self
    }

    pub fn i32(mut self, slot: VOffsetT, value: i32) -> Self {
        self.fields.push((slot, Field::I32(value)));
        self
    }

    pub fn f32(mut self, slot: VOffsetT, value: f32) -> Self {
        self.fields.push((slot, Field::F32(value)));
        self
    }

    pub fn bool(mut self, slot: VOffsetT, value: bool) -> Self {
        self.fields.push((slot, Field::Bool(value)));
        self
    }

    pub fn i32s(mut self, slot: VOffsetT, values: &[i32]) -> Self {
        self.fields.push((slot, Field::I32s(values.to_vec())));
        self
    }

    pub fn conv_2d(padding: i8, stride_w: i32, stride_h: i32, fused_activation: i8) -> Self {
        use schema::Conv2DOptions as O;
        Self::new(tag::CONV_2D)
            .i8(O::VT_PADDING, padding)
            .i32(O::VT_STRIDE_W, stride_w)
            .i32(O::VT_STRIDE_H, stride_h)
            .i8(O::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn depthwise_conv_2d(padding: i8, stride_w: i32, stride_h: i32, multiplier: i32, fused_activation: i8) -> Self {
        use schema::DepthwiseConv2DOptions as O;
        Self::new(tag::DEPTHWISE_CONV_2D)
            .i8(O::VT_PADDING, padding)
            .i32(O::VT_STRIDE_W, stride_w)
            .i32(O::VT_STRIDE_H, stride_h)
            .i32(O::VT_DEPTH_MULTIPLIER, multiplier)
            .i8(O::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn pool_2d(padding: i8, stride: i32, filter: i32, fused_activation: i8) -> Self {
        use schema::Pool2DOptions as O;
        Self::new(tag::POOL_2D)
            .i8(O::VT_PADDING, padding)
            .i32(O::VT_STRIDE_W, stride)
            .i32(O::VT_STRIDE_H, stride)
            .i32(O::VT_FILTER_WIDTH, filter)
            .i32(O::VT_FILTER_HEIGHT, filter)
            .i8(O::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn fully_connected(fused_activation: i8) -> Self {
        Self::new(tag::FULLY_CONNECTED).i8(schema::FullyConnectedOptions::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn softmax(beta: f32) -> Self {
        Self::new(tag::SOFTMAX).f32(schema::SoftmaxOptions::VT_BETA, beta)
    }

    pub fn concatenation(axis: i32, fused_activation: i8) -> Self {
        use schema::ConcatenationOptions as O;
        Self::new(tag::CONCATENATION)
            .i32(O::VT_AXIS, axis)
            .i8(O::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn add(fused_activation: i8) -> Self {
        Self::new(tag::ADD).i8(schema::AddOptions::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn sub(fused_activation: i8) -> Self {
        Self::new(tag::SUB).i8(schema::SubOptions::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn mul(fused_activation: i8) -> Self {
        Self::new(tag::MUL).i8(schema::MulOptions::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn div(fused_activation: i8) -> Self {
        Self::new(tag::DIV).i8(schema::DivOptions::VT_FUSED_ACTIVATION_FUNCTION, fused_activation)
    }

    pub fn reshape(new_shape: &[i32]) -> Self {
        Self::new(tag::RESHAPE).i32s(schema::ReshapeOptions::VT_NEW_SHAPE, new_shape)
    }

    pub fn squeeze(dims: &[i32]) -> Self {
        Self::new(tag::SQUEEZE).i32s(schema::SqueezeOptions::VT_SQUEEZE_DIMS, dims)
    }

    pub fn resize_bilinear(align_corners: bool, half_pixel_centers: bool) -> Self {
        use schema::ResizeBilinearOptions as O;
        Self::new(tag::RESIZE_BILINEAR)
            .bool(O::VT_ALIGN_CORNERS, align_corners)
            .bool(O::VT_HALF_PIXEL_CENTERS, half_pixel_centers)
    }

    pub fn reducer(keep_dims: bool) -> Self {
        Self::new(tag::REDUCER).bool(schema::ReducerOptions::VT_KEEP_DIMS, keep_dims)
    }

    pub fn gather(axis: i32) -> Self {
        Self::new(tag::GATHER).i32(schema::GatherOptions::VT_AXIS, axis)
    }

    pub fn split(num_splits: i32) -> Self {
        Self::new(tag::SPLIT).i32(schema::SplitOptions::VT_NUM_SPLITS, num_splits)
    }

    pub fn arg_max(output_type: i8) -> Self {
        Self::new(tag::ARG_MAX).i8(schema::ArgMaxOptions::VT_OUTPUT_TYPE, output_type)
    }

    pub fn pack(values_count: i32, axis: i32) -> Self {
        use schema::PackOptions as O;
        Self::new(tag::PACK)
            .i32(O::VT_VALUES_COUNT, values_count)
            .i32(O::VT_AXIS, axis)
    }

    pub fn leaky_relu(alpha: f32) -> Self {
        Self::new(tag::LEAKY_RELU).f32(schema::LeakyReluOptions::VT_ALPHA, alpha)
    }

    pub fn batch_matmul(adj_x: bool, adj_y: bool) -> Self {
        use schema::BatchMatMulOptions as O;
        Self::new(tag::BATCH_MATMUL)
            .bool(O::VT_ADJ_X, adj_x)
            .bool(O::VT_ADJ_Y, adj_y)
    }

    pub fn if_(then_subgraph: i32, else_subgraph: i32) -> Self {
        use schema::IfOptions as O;
        Self::new(tag::IF)
            .i32(O::VT_THEN_SUBGRAPH_INDEX, then_subgraph)
            .i32(O::VT_ELSE_SUBGRAPH_INDEX, else_subgraph)
    }

    pub fn while_(cond_subgraph: i32, body_subgraph: i32) -> Self {
        use schema::WhileOptions as O;
        Self::new(tag::WHILE)
            .i32(O::VT_COND_SUBGRAPH_INDEX, cond_subgraph)
            .i32(O::VT_BODY_SUBGRAPH_INDEX, body_subgraph)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Code {
    Builtin(BuiltinOperator),
    Custom(String),
}

/// One operator entry.
#[derive(Debug, Clone)]
pub struct OperatorDef {
    code: Code,
    inputs: Vec<i32>,
    outputs: Vec<i32>,
    options: Option<BuiltinOptions>,
    custom_options: Option<Vec<u8>>,
    custom_options_format: i8,
}

impl OperatorDef {
    pub fn builtin(code: BuiltinOperator, inputs: &[i32], outputs: &[i32]) -> Self {
        Self::with_code(Code::Builtin(code), inputs, outputs)
    }

    pub fn custom(name: impl Into<String>, inputs: &[i32], outputs: &[i32]) -> Self {
        Self::with_code(Code::Custom(name.into()), inputs, outputs)
    }

    fn with_code(code: Code, inputs: &[i32], outputs: &[i32]) -> Self {
        Self {
            code,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            options: None,
            custom_options: None,
            custom_options_format: custom_options_format::FLEXBUFFERS,
        }
    }

    pub fn with_options(mut self, options: BuiltinOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Raw custom option bytes, normally from [`flex_options`].
    pub fn with_custom_options(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.custom_options = Some(bytes.into());
        self
    }

    pub fn with_custom_options_format(mut self, format: i8) -> Self {
        self.custom_options_format = format;
        self
    }
}

/// A value in a flexbuffer attribute map.
#[derive(Debug, Clone, PartialEq)]
pub enum FlexValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
}

/// Encodes an attribute map the way converters write custom options.
pub fn flex_options(entries: &[(&str, FlexValue)]) -> Vec<u8> {
    let mut builder = flexbuffers::Builder::default();
    let mut map = builder.start_map();
    for (key, value) in entries {
        match value {
            FlexValue::Bool(v) => map.push(key, *v),
            FlexValue::Int(v) => map.push(key, *v),
            FlexValue::Float(v) => map.push(key, *v),
            FlexValue::Str(v) => map.push(key, v.as_str()),
        }
    }
    map.end_map();
    builder.view().to_vec()
}

/// One subgraph: tensors, operators and the input/output lists.
#[derive(Debug, Clone, Default)]
pub struct SubgraphDef {
    name: String,
    tensors: Vec<TensorDef>,
    operators: Vec<OperatorDef>,
    inputs: Vec<i32>,
    outputs: Vec<i32>,
}

impl SubgraphDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a tensor and returns its index.
    pub fn add_tensor(&mut self, tensor: TensorDef) -> i32 {
        self.tensors.push(tensor);
        (self.tensors.len() - 1) as i32
    }

    pub fn add_operator(&mut self, operator: OperatorDef) -> &mut Self {
        self.operators.push(operator);
        self
    }

    pub fn set_inputs(&mut self, inputs: &[i32]) -> &mut Self {
        self.inputs = inputs.to_vec();
        self
    }

    pub fn set_outputs(&mut self, outputs: &[i32]) -> &mut Self {
        self.outputs = outputs.to_vec();
        self
    }
}

/// Assembles subgraphs into a finished `TFL3` buffer.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    version: u32,
    description: Option<String>,
    subgraphs: Vec<SubgraphDef>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            description: None,
            subgraphs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Overrides the schema version written into the file.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Appends a subgraph; the first one added is the primary subgraph.
    pub fn with_subgraph(mut self, subgraph: SubgraphDef) -> Self {
        self.subgraphs.push(subgraph);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::with_capacity(1024);

        // Buffer 0 is the empty sentinel every non-constant tensor points at.
        let mut payloads: Vec<&[u8]> = vec![&[]];
        let buffer_ids: Vec<Vec<u32>> = self
            .subgraphs
            .iter()
            .map(|sg| {
                sg.tensors
                    .iter()
                    .map(|t| match &t.data {
                        Some(data) => {
                            payloads.push(data);
                            (payloads.len() - 1) as u32
                        }
                        None => 0,
                    })
                    .collect()
            })
            .collect();

        let mut codes: Vec<&Code> = Vec::new();
        for op in self.subgraphs.iter().flat_map(|sg| &sg.operators) {
            if !codes.contains(&&op.code) {
                codes.push(&op.code);
            }
        }

        let buffers: Vec<_> = payloads.iter().map(|data| write_buffer(&mut fbb, data)).collect();
        let buffers = fbb.create_vector(&buffers);
        let opcodes: Vec<_> = codes.iter().map(|code| write_opcode(&mut fbb, code)).collect();
        let opcodes = fbb.create_vector(&opcodes);

        let subgraphs: Vec<_> = self
            .subgraphs
            .iter()
            .zip(&buffer_ids)
            .map(|(sg, ids)| write_subgraph(&mut fbb, sg, ids, &codes))
            .collect();
        let subgraphs = fbb.create_vector(&subgraphs);
        let description = self.description.as_deref().map(|d| fbb.create_string(d));

        let start = fbb.start_table();
        fbb.push_slot::<u32>(schema::Model::VT_VERSION, self.version, 0);
        fbb.push_slot_always(schema::Model::VT_OPERATOR_CODES, opcodes);
        fbb.push_slot_always(schema::Model::VT_SUBGRAPHS, subgraphs);
        if let Some(description) = description {
            fbb.push_slot_always(schema::Model::VT_DESCRIPTION, description);
        }
        fbb.push_slot_always(schema::Model::VT_BUFFERS, buffers);
        let model = fbb.end_table(start);

        fbb.finish(model, Some(FILE_IDENTIFIER));
        fbb.finished_data().to_vec()
    }
}

type Finished = WIPOffset<TableFinishedWIPOffset>;

fn write_buffer<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, data: &[u8]) -> Finished {
    let data = (!data.is_empty()).then(|| fbb.create_vector(data));
    let start = fbb.start_table();
    if let Some(data) = data {
        fbb.push_slot_always(schema::Buffer::VT_DATA, data);
    }
    fbb.end_table(start)
}

fn write_opcode<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, code: &Code) -> Finished {
    use schema::OperatorCode as O;
    let (builtin, custom) = match code {
        Code::Builtin(code) => (code.0, None),
        Code::Custom(name) => (BuiltinOperator::CUSTOM.0, Some(fbb.create_string(name))),
    };
    let start = fbb.start_table();
    fbb.push_slot::<i8>(O::VT_DEPRECATED_BUILTIN_CODE, builtin.min(127) as i8, 0);
    if let Some(custom) = custom {
        fbb.push_slot_always(O::VT_CUSTOM_CODE, custom);
    }
    fbb.push_slot::<i32>(O::VT_VERSION, 1, 1);
    fbb.push_slot::<i32>(O::VT_BUILTIN_CODE, builtin, 0);
    fbb.end_table(start)
}

fn write_subgraph<'fbb>(
    fbb: &mut FlatBufferBuilder<'fbb>,
    subgraph: &SubgraphDef,
    buffer_ids: &[u32],
    codes: &[&Code],
) -> Finished {
    use schema::SubGraph as S;
    let tensors: Vec<_> = subgraph
        .tensors
        .iter()
        .zip(buffer_ids)
        .map(|(t, &buffer)| write_tensor(fbb, t, buffer))
        .collect();
    let tensors = fbb.create_vector(&tensors);
    let operators: Vec<_> = subgraph
        .operators
        .iter()
        .map(|op| {
            let index = codes.iter().position(|c| *c == &op.code).unwrap_or_default() as u32;
            write_operator(fbb, op, index)
        })
        .collect();
    let operators = fbb.create_vector(&operators);
    let inputs = fbb.create_vector(&subgraph.inputs);
    let outputs = fbb.create_vector(&subgraph.outputs);
    let name = fbb.create_string(&subgraph.name);

    let start = fbb.start_table();
    fbb.push_slot_always(S::VT_TENSORS, tensors);
    fbb.push_slot_always(S::VT_INPUTS, inputs);
    fbb.push_slot_always(S::VT_OUTPUTS, outputs);
    fbb.push_slot_always(S::VT_OPERATORS, operators);
    fbb.push_slot_always(S::VT_NAME, name);
    fbb.end_table(start)
}

fn write_tensor<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, tensor: &TensorDef, buffer: u32) -> Finished {
    use schema::Tensor as T;
    let shape = fbb.create_vector(&tensor.shape);
    let name = fbb.create_string(&tensor.name);
    let quantization = tensor.quantization.then(|| write_quantization(fbb, tensor));
    let sparsity = tensor
        .sparsity
        .as_ref()
        .map(|(segments, indices)| write_sparsity(fbb, &tensor.shape, segments, indices));

    let start = fbb.start_table();
    fbb.push_slot_always(T::VT_SHAPE, shape);
    fbb.push_slot::<i8>(T::VT_TYPE, tensor.dtype, 0);
    fbb.push_slot::<u32>(T::VT_BUFFER, buffer, 0);
    fbb.push_slot_always(T::VT_NAME, name);
    if let Some(quantization) = quantization {
        fbb.push_slot_always(T::VT_QUANTIZATION, quantization);
    }
    fbb.push_slot::<bool>(T::VT_IS_VARIABLE, tensor.is_variable, false);
    if let Some(sparsity) = sparsity {
        fbb.push_slot_always(T::VT_SPARSITY, sparsity);
    }
    fbb.end_table(start)
}

fn write_quantization<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, tensor: &TensorDef) -> Finished {
    use schema::QuantizationParameters as Q;
    let scale = fbb.create_vector(&tensor.scales);
    let zero_point = fbb.create_vector(&tensor.zero_points);
    let details = tensor.custom_quantization.then(|| {
        let custom = fbb.create_vector(&[0u8; 4]);
        let start = fbb.start_table();
        fbb.push_slot_always(schema::CustomQuantization::VT_CUSTOM, custom);
        fbb.end_table(start)
    });

    let start = fbb.start_table();
    fbb.push_slot_always(Q::VT_SCALE, scale);
    fbb.push_slot_always(Q::VT_ZERO_POINT, zero_point);
    if let Some(details) = details {
        fbb.push_slot::<u8>(Q::VT_DETAILS_TYPE, schema::quantization_details::CUSTOM_QUANTIZATION, 0);
        fbb.push_slot_always(Q::VT_DETAILS, details);
    }
    fbb.end_table(start)
}

fn write_sparsity<'fbb>(
    fbb: &mut FlatBufferBuilder<'fbb>,
    shape: &[i32],
    segments: &[i32],
    indices: &[i32],
) -> Finished {
    use schema::DimensionMetadata as D;
    let index_vector = |fbb: &mut FlatBufferBuilder<'fbb>, values: &[i32]| {
        let values = fbb.create_vector(values);
        let start = fbb.start_table();
        fbb.push_slot_always(schema::Int32Vector::VT_VALUES, values);
        fbb.end_table(start)
    };

    let dense = {
        let start = fbb.start_table();
        fbb.push_slot::<i8>(D::VT_FORMAT, dimension_type::DENSE, -1);
        fbb.push_slot::<i32>(D::VT_DENSE_SIZE, shape.first().copied().unwrap_or_default(), 0);
        fbb.end_table(start)
    };
    let segments = index_vector(fbb, segments);
    let indices = index_vector(fbb, indices);
    let csr = {
        let start = fbb.start_table();
        fbb.push_slot::<i8>(D::VT_FORMAT, dimension_type::SPARSE_CSR, -1);
        fbb.push_slot::<u8>(D::VT_ARRAY_SEGMENTS_TYPE, sparse_index_vector::INT32_VECTOR, 0);
        fbb.push_slot_always(D::VT_ARRAY_SEGMENTS, segments);
        fbb.push_slot::<u8>(D::VT_ARRAY_INDICES_TYPE, sparse_index_vector::INT32_VECTOR, 0);
        fbb.push_slot_always(D::VT_ARRAY_INDICES, indices);
        fbb.end_table(start)
    };
    let traversal = fbb.create_vector(&[0i32, 1]);
    let dims = fbb.create_vector(&[dense, csr]);

    let start = fbb.start_table();
    fbb.push_slot_always(schema::SparsityParameters::VT_TRAVERSAL_ORDER, traversal);
    fbb.push_slot_always(schema::SparsityParameters::VT_DIM_METADATA, dims);
    fbb.end_table(start)
}

fn write_operator<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, op: &OperatorDef, opcode_index: u32) -> Finished {
    use schema::Operator as O;
    let inputs = fbb.create_vector(&op.inputs);
    let outputs = fbb.create_vector(&op.outputs);
    let options = op.options.as_ref().map(|o| (o.tag, write_options(fbb, o)));
    let custom = op.custom_options.as_ref().map(|bytes| fbb.create_vector(bytes));

    let start = fbb.start_table();
    fbb.push_slot::<u32>(O::VT_OPCODE_INDEX, opcode_index, 0);
    fbb.push_slot_always(O::VT_INPUTS, inputs);
    fbb.push_slot_always(O::VT_OUTPUTS, outputs);
    if let Some((tag, options)) = options {
        fbb.push_slot::<u8>(O::VT_BUILTIN_OPTIONS_TYPE, tag, 0);
        fbb.push_slot_always(O::VT_BUILTIN_OPTIONS, options);
    }
    if let Some(custom) = custom {
        fbb.push_slot_always(O::VT_CUSTOM_OPTIONS, custom);
        fbb.push_slot::<i8>(O::VT_CUSTOM_OPTIONS_FORMAT, op.custom_options_format, -1);
    }
    fbb.end_table(start)
}

fn write_options<'fbb>(fbb: &mut FlatBufferBuilder<'fbb>, options: &BuiltinOptions) -> Finished {
    // Vectors are children and must be written before the table opens.
    let vectors: Vec<_> = options
        .fields
        .iter()
        .map(|(_, field)| match field {
            Field::I32s(values) => Some(fbb.create_vector(values)),
            _ => None,
        })
        .collect();

    let start = fbb.start_table();
    for ((slot, field), vector) in options.fields.iter().zip(vectors) {
        match (field, vector) {
            (Field::I8(v), _) => push(fbb, *slot, *v),
            (Field::I32(v), _) => push(fbb, *slot, *v),
            (Field::F32(v), _) => push(fbb, *slot, *v),
            (Field::Bool(v), _) => push(fbb, *slot, *v),
            (Field::I32s(_), Some(vector)) => fbb.push_slot_always(*slot, vector),
            (Field::I32s(_), None) => {}
        }
    }
    fbb.end_table(start)
}

fn push<X: Push + Copy>(fbb: &mut FlatBufferBuilder<'_>, slot: VOffsetT, value: X) {
    fbb.push_slot_always(slot, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{root_as_model, tensor_type};

    #[test]
    fn test_identifier_and_version() {
        let bytes = ModelBuilder::new().with_subgraph(SubgraphDef::new("main")).build();
        assert_eq!(&bytes[4..8], b"TFL3");
        let model = root_as_model(&bytes).unwrap();
        assert_eq!(model.version(), SCHEMA_VERSION);
        assert_eq!(model.buffers().unwrap().len(), 1);
    }

    #[test]
    fn test_opcodes_deduplicated() {
        let mut sg = SubgraphDef::new("main");
        let a = sg.add_tensor(TensorDef::new("a", tensor_type::FLOAT32, &[2]));
        let b = sg.add_tensor(TensorDef::new("b", tensor_type::FLOAT32, &[2]));
        let c = sg.add_tensor(TensorDef::new("c", tensor_type::FLOAT32, &[2]));
        sg.add_operator(OperatorDef::builtin(BuiltinOperator::RELU, &[a], &[b]));
        sg.add_operator(OperatorDef::builtin(BuiltinOperator::RELU, &[b], &[c]));
        sg.add_operator(OperatorDef::custom("Erf", &[c], &[a]));
        let bytes = ModelBuilder::new().with_subgraph(sg).build();

        let model = root_as_model(&bytes).unwrap();
        let codes = model.operator_codes().unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes.get(1).custom_code(), Some("Erf"));
        assert_eq!(codes.get(1).resolved_code(), BuiltinOperator::CUSTOM);
    }

    #[test]
    fn test_constant_gets_own_buffer() {
        let mut sg = SubgraphDef::new("main");
        sg.add_tensor(TensorDef::new("w", tensor_type::FLOAT32, &[2]).with_f32s(&[1.0, 2.0]));
        let bytes = ModelBuilder::new().with_subgraph(sg).build();

        let model = root_as_model(&bytes).unwrap();
        let tensor = model.subgraphs().unwrap().get(0).tensors().unwrap().get(0);
        assert_eq!(tensor.buffer(), 1);
        let data = model.buffers().unwrap().get(1).data().unwrap();
        assert_eq!(data.bytes(), bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0]));
    }
}
