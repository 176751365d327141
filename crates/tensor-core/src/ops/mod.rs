// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference compute routines.
//!
//! These operate on typed slices that the caller has already sized; none
//! of them allocate their output. The runtime's CPU backend converts
//! operand buffers to slices and dispatches here.

mod activation;
mod binary;
mod fully_connected;
mod softmax;

pub use activation::{clamp, leaky_relu, logistic, tanh};
pub use binary::{broadcast_binary, broadcast_compare};
pub use fully_connected::fully_connected;
pub use softmax::softmax;
