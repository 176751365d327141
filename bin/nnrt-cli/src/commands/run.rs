// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `nnrt run` command: execute a model on constant-filled inputs.
//!
//! Walks the full type-state pipeline:
//! ```text
//! InferenceSession<Idle> → load_model → <Loaded> → prepare → <Ready> → run
//! ```

use super::truncate;
use anyhow::{bail, Context};
use memory_manager::MemoryBudget;
use model_ir::Graph;
use runtime::{ExecutionOutput, InferenceSession, IoDescription, RuntimeConfig};
use std::path::{Path, PathBuf};
use tensor_core::{DType, Tensor};

/// Merges the optional config file with the command-line overrides.
pub fn resolve_config(
    file: Option<&Path>,
    model: Option<PathBuf>,
    memory_budget: Option<String>,
) -> anyhow::Result<RuntimeConfig> {
    let mut config = match file {
        Some(path) => RuntimeConfig::from_file(path).context("reading configuration")?,
        None => RuntimeConfig::default(),
    };
    match model {
        Some(model) => config.model_path = model,
        None if file.is_none() => bail!("no model given; pass --model or a config file with model_path"),
        None => {}
    }
    if let Some(budget) = memory_budget {
        config.memory_budget = budget;
    }
    Ok(config)
}

pub fn execute(config: RuntimeConfig, fill: f32, repeat: usize) -> anyhow::Result<()> {
    let budget = MemoryBudget::parse(&config.memory_budget).context("invalid --memory-budget")?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                nnrt · Inference Runner               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Config:");
    println!("   Model:    {}", truncate(&config.model_path.display().to_string(), 50));
    println!("   Budget:   {budget}");
    println!("   Backend:  {} ({})", config.backend, config.layout.as_str());
    println!("   Fill:     {fill}");
    println!("   Repeat:   {repeat}");
    println!();

    println!("  [1/3] Loading model...");
    let model_path = config.model_path.clone();
    let loaded = InferenceSession::new(config)
        .load_model()
        .with_context(|| format!("failed to load '{}'", model_path.display()))?;
    println!("        {}", loaded.model().summary());
    println!();

    println!("  [2/3] Planning and preparing executors...");
    let ready = loaded.prepare().context("failed to prepare the session")?;
    let primary = ready.executors().primary()?;
    println!("        {}", primary.plan().summary());
    if primary.has_dynamic_input() {
        println!("        Inputs are dynamically shaped; declared shapes are used.");
    }
    println!();

    let io = IoDescription::new(filled_inputs(ready.model().primary(), fill)?);

    println!("  [3/3] Executing...");
    let mut last = None;
    for i in 0..repeat.max(1) {
        let output = ready.run(&io).with_context(|| format!("execution {} failed", i + 1))?;
        tracing::info!("run {}: {}", i + 1, output.metrics.summary());
        last = Some(output);
    }
    println!();

    if let Some(output) = &last {
        print_results(output);
    }
    println!("  Pool Stats:");
    println!("   {}", ready.memory_stats().summary());
    Ok(())
}

/// One tensor per primary input at its declared shape, every element set to
/// `fill`. Integer inputs get the truncated value.
fn filled_inputs(graph: &Graph, fill: f32) -> anyhow::Result<Vec<Tensor>> {
    graph
        .inputs()
        .iter()
        .map(|&index| {
            let operand = graph.operand(index).with_context(|| format!("input {index} is not in the graph"))?;
            let shape = operand.shape().clone();
            let n = shape.num_elements();
            let tensor = match operand.dtype() {
                DType::Float32 => Tensor::from_f32(shape, &vec![fill; n])?,
                DType::Int32 => Tensor::from_i32(shape, &vec![fill as i32; n])?,
                DType::Int64 => Tensor::from_values(shape, DType::Int64, &vec![fill as i64; n])?,
                DType::Bool8 => Tensor::from_bool(shape, &vec![fill != 0.0; n])?,
                DType::Uint8 => Tensor::from_values(shape, DType::Uint8, &vec![fill as u8; n])?,
                other => bail!("cannot fill input {index} of type {other}"),
            };
            Ok(tensor)
        })
        .collect()
}

fn print_results(output: &ExecutionOutput) {
    println!("  Results:");
    for (i, tensor) in output.outputs.iter().enumerate() {
        let preview = match tensor.dtype() {
            DType::Float32 => format!("{:?}", &tensor.to_vec::<f32>()[..tensor.shape().num_elements().min(8)]),
            DType::Int32 => format!("{:?}", &tensor.to_vec::<i32>()[..tensor.shape().num_elements().min(8)]),
            _ => String::new(),
        };
        println!("   output {i}: {} {} {preview}", tensor.dtype(), tensor.shape());
    }
    println!();
    println!("  Metrics:");
    println!("   {}", output.metrics.summary());
    println!();
}
