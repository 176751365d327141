// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `nnrt inspect` command: display subgraphs, operands and operations.

use super::truncate;
use anyhow::Context;
use model_ir::Graph;
use std::path::Path;

pub fn execute(model: &Path) -> anyhow::Result<()> {
    let model = model_loader::load_from_file(model)
        .with_context(|| format!("failed to load model from '{}'", model.display()))?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               nnrt · Model Inspector                 ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  {}", model.summary());
    if let Some(description) = model.description() {
        println!("  Description: {description}");
    }
    println!(
        "  Constant data: {:.2} MB",
        model.total_constant_bytes() as f64 / (1024.0 * 1024.0)
    );
    println!();

    for (index, graph) in model.subgraphs() {
        println!("  ── {index} ({}) ──", graph.name().unwrap_or("<unnamed>"));
        print_operands(graph);
        print_operations(graph);
        println!();
    }
    Ok(())
}

fn print_operands(graph: &Graph) {
    println!("  {:<6} {:<32} {:<8} {:<18} {}", "Index", "Name", "DType", "Shape", "Flags");
    println!("  {}", "-".repeat(78));
    for (index, operand) in graph.operands() {
        let mut flags = Vec::new();
        if operand.is_constant() {
            flags.push("const");
        }
        if operand.info().type_info().scale() != 0.0 {
            flags.push("quantized");
        }
        if operand.info().type_info().sparsity().is_some() {
            flags.push("sparse");
        }
        if graph.inputs().contains(&index) {
            flags.push("input");
        }
        if graph.outputs().contains(&index) {
            flags.push("output");
        }
        println!(
            "  {:<6} {:<32} {:<8} {:<18} {}",
            index.to_string(),
            truncate(operand.name().unwrap_or(""), 32),
            operand.dtype().as_str(),
            operand.shape().to_string(),
            flags.join(","),
        );
    }
}

fn print_operations(graph: &Graph) {
    let list = |v: &[model_ir::OperandIndex]| v.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
    println!();
    println!("  {:<6} {:<24} {:<24} {}", "Index", "Kind", "Inputs", "Outputs");
    println!("  {}", "-".repeat(78));
    for (index, op) in graph.operations() {
        println!("  {:<6} {:<24} {:<24} {}", index.to_string(), op.name(), list(op.inputs()), list(op.outputs()));
    }
}
