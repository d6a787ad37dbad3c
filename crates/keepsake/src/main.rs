// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keepsake - long-term memory for conversational agents.
//!
//! Binary entry point: loads configuration, wires the storage factory,
//! embedding client and memory engine, then runs one subcommand.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod commands;
mod logging;

use std::sync::Arc;

use clap::Parser;
use keepsake_core::KeepsakeError;
use keepsake_memory::{HttpEmbedder, MemoryEngine, recording};
use keepsake_storage::StoreFactory;
use tracing::{debug, error};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => keepsake_config::load_and_validate_path(path),
        None => keepsake_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            keepsake_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    logging::init_tracing(&config.logging);
    recording::register_metrics();

    match run(cli, config).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("keepsake: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, config: keepsake_config::KeepsakeConfig) -> Result<String, KeepsakeError> {
    debug!(owner = %cli.owner, data_dir = %config.storage.data_dir.display(), "starting");
    let factory = Arc::new(StoreFactory::new(&config.storage));
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let engine = MemoryEngine::new(config, factory, embedder);

    let result = commands::execute(&engine, &cli.owner, cli.command).await;
    engine.shutdown().await?;
    result
}
