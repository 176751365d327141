// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Custom operators.
//!
//! A custom operator carries its attributes as a flexbuffer map. Names the
//! IR knows are mapped onto their builtin equivalents; anything else
//! becomes [`OperationKind::Custom`] with the raw option bytes attached.

use crate::operations::convert_activation;
use crate::schema::{self, custom_options_format};
use crate::LoadError;
use flexbuffers::{MapReader, Reader};
use model_ir::{
    ArithmeticOp, BatchMatMulParams, BinaryArithmeticParams, CustomParams, EinsumParams, FusedBatchNormParams,
    OperationKind, ReduceKind, ReduceParams, UnaryOp,
};

/// A decoded attribute map, or nothing when the operator has no options.
struct Attributes<'a> {
    op: &'a str,
    map: Option<MapReader<&'a [u8]>>,
}

impl<'a> Attributes<'a> {
    fn parse(op: &'a str, bytes: Option<&'a [u8]>) -> Result<Self, LoadError> {
        let map = match bytes {
            Some(bytes) if !bytes.is_empty() => {
                let decode = |source| LoadError::CustomOptionsDecode {
                    op: op.to_string(),
                    source,
                };
                let root = Reader::get_root(bytes).map_err(decode)?;
                Some(root.get_map().map_err(decode)?)
            }
            _ => None,
        };
        Ok(Self { op, map })
    }

    /// Fails when the operator carries no options at all.
    fn required(self) -> Result<Self, LoadError> {
        if self.map.is_none() {
            return Err(self.malformed("options are required"));
        }
        Ok(self)
    }

    fn get(&self, key: &str) -> Option<Reader<&'a [u8]>> {
        self.map.as_ref().and_then(|m| m.index(key).ok())
    }

    fn require(&self, key: &str) -> Result<Reader<&'a [u8]>, LoadError> {
        self.get(key)
            .ok_or_else(|| self.malformed(&format!("missing attribute '{key}'")))
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |r| r.as_bool())
    }

    fn string(&self, key: &str) -> Result<String, LoadError> {
        self.require(key)?
            .get_str()
            .map(str::to_string)
            .map_err(|source| LoadError::CustomOptionsDecode {
                op: self.op.to_string(),
                source,
            })
    }

    fn malformed(&self, reason: &str) -> LoadError {
        LoadError::MalformedCustomOptions {
            op: self.op.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Maps a custom operator onto an IR kind.
pub(crate) fn custom_kind(name: &str, op: &schema::Operator<'_>) -> Result<OperationKind, LoadError> {
    let bytes = op.custom_options().map(|v| v.bytes());
    if bytes.is_some() && op.custom_options_format() != custom_options_format::FLEXBUFFERS {
        return Err(LoadError::MalformedCustomOptions {
            op: name.to_string(),
            reason: format!("unsupported options format {}", op.custom_options_format()),
        });
    }

    let kind = match name {
        "AddV2" => {
            let attrs = Attributes::parse(name, bytes)?;
            let code = attrs.get("fused_activation_function").map_or(0, |r| r.as_i64());
            let code = i8::try_from(code).map_err(|_| attrs.malformed("fused_activation_function out of range"))?;
            OperationKind::BinaryArithmetic(BinaryArithmeticParams {
                op: ArithmeticOp::Add,
                activation: convert_activation("AddV2", code)?,
            })
        }
        "All" => {
            let attrs = Attributes::parse(name, bytes)?;
            OperationKind::Reduce(ReduceParams {
                kind: ReduceKind::All,
                keep_dims: attrs.bool_or("keep_dims", false),
            })
        }
        "BatchMatMulV2" => {
            let attrs = Attributes::parse(name, bytes)?;
            OperationKind::BatchMatMul(BatchMatMulParams {
                adj_x: attrs.bool_or("adj_x", false),
                adj_y: attrs.bool_or("adj_y", false),
            })
        }
        "Einsum" => {
            let attrs = Attributes::parse(name, bytes)?.required()?;
            OperationKind::Einsum(EinsumParams {
                equation: attrs.string("equation")?,
            })
        }
        "FusedBatchNormV3" => {
            let attrs = Attributes::parse(name, bytes)?.required()?;
            OperationKind::FusedBatchNorm(FusedBatchNormParams {
                is_training: attrs.require("is_training")?.as_bool(),
                epsilon: attrs.require("epsilon")?.as_f32(),
                data_format: attrs.string("data_format")?,
            })
        }
        "MatrixBandPart" => OperationKind::MatrixBandPart,
        "BroadcastTo" => OperationKind::BroadcastTo,
        "StatelessRandomUniform" => OperationKind::StatelessRandomUniform,
        "Erf" => OperationKind::ElementwiseUnary(UnaryOp::Erf),
        _ => {
            tracing::warn!("custom operator '{name}' passed through opaquely");
            OperationKind::Custom(CustomParams {
                id: name.to_string(),
                user_data: bytes.map(<[u8]>::to_vec).unwrap_or_default(),
            })
        }
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_bytes(build: impl FnOnce(&mut flexbuffers::MapBuilder<'_>)) -> Vec<u8> {
        let mut builder = flexbuffers::Builder::default();
        let mut map = builder.start_map();
        build(&mut map);
        map.end_map();
        builder.view().to_vec()
    }

    #[test]
    fn test_attributes_defaults_without_options() {
        let attrs = Attributes::parse("All", None).unwrap();
        assert!(!attrs.bool_or("keep_dims", false));
        assert!(attrs.required().is_err());
    }

    #[test]
    fn test_attributes_read_values() {
        let bytes = map_bytes(|m| {
            m.push("equation", "ij,jk->ik");
            m.push("is_training", true);
            m.push("epsilon", 0.001f32);
        });
        let attrs = Attributes::parse("Einsum", Some(&bytes)).unwrap();
        assert_eq!(attrs.string("equation").unwrap(), "ij,jk->ik");
        assert!(attrs.require("is_training").unwrap().as_bool());
        assert!((attrs.require("epsilon").unwrap().as_f32() - 0.001).abs() < 1e-6);
        assert!(matches!(
            attrs.require("data_format"),
            Err(LoadError::MalformedCustomOptions { .. })
        ));
    }

    #[test]
    fn test_garbage_options_rejected() {
        let err = Attributes::parse("Einsum", Some(&[0xff, 0x01])).err().unwrap();
        assert!(matches!(err, LoadError::CustomOptionsDecode { .. }));
    }
}
