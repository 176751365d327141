// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # nnrt
//!
//! Command-line interface for the nnrt inference runtime.
//!
//! ## Usage
//! ```bash
//! # Print subgraphs, operands and operations
//! nnrt inspect --model ./mobilenet.tflite
//!
//! # Execute with every input filled with 0.5, three times
//! nnrt run --model ./mobilenet.tflite --memory-budget 256M --fill 0.5 --repeat 3
//!
//! # Take model path and budget from a config file
//! nnrt -c nnrt.toml -vv run
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nnrt", about = "Dynamic-shape inference runtime for TFLite models", version, author)]
struct Cli {
    /// Path to a TOML configuration file (CLI arguments override it).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a model on constant-filled inputs.
    Run {
        /// Path to the `.tflite` file.
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Memory budget (e.g., "512M", "1G").
        #[arg(short = 'b', long)]
        memory_budget: Option<String>,

        /// Value written into every input element.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        fill: f32,

        /// Number of executions.
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },

    /// Inspect a model: print every subgraph's operands and operations.
    Inspect {
        /// Path to the `.tflite` file.
        #[arg(short, long)]
        model: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { model, memory_budget, fill, repeat } => {
            let config = commands::run::resolve_config(cli.config.as_deref(), model, memory_budget)?;
            commands::run::execute(config, fill, repeat)
        }
        Commands::Inspect { model } => commands::inspect::execute(&model),
    }
}
