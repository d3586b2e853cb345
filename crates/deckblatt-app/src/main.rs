// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deckblatt: embeds a fixed cover image into PDF and EPUB documents.
//
// Entry point. Initialises logging, loads configuration and the cover image,
// then runs the given files through the pipeline.

mod cli;
mod orchestrator;

use std::process::ExitCode;

use clap::Parser;
use deckblatt_core::AppConfig;
use deckblatt_pipeline::Pipeline;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    tracing::info!("Deckblatt starting");

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration could not be loaded");
            return ExitCode::FAILURE;
        }
    };

    // Without a cover there is nothing to serve.
    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "pipeline could not start");
            return ExitCode::FAILURE;
        }
    };

    match orchestrator::run_files(&pipeline, &cli.files, &cli.out_dir, cli.thumbnails).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, out_dir = %cli.out_dir.display(), "output directory unavailable");
            ExitCode::FAILURE
        }
    }
}
