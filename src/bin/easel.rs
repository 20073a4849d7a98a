//! Easel CLI Binary
//!
//! Command-line interface for the Easel creative generation orchestrator.

use clap::Parser;
use easel::cli::{Cli, RunContext};
use easel::config::ConfigLoader;
use easel::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = match build_logging_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", easel::cli::map_error(&e));
            process::exit(1);
        }
    };
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    info!("Easel CLI starting");
    let result = runtime.block_on(async {
        let context = RunContext::new(cli.workspace.clone(), cli.config.clone())?;
        info!("CLI context initialized");
        let output = context.execute(&cli.command).await;
        context.shutdown().await;
        output
    });

    match result {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", easel::cli::map_error(&e));
            drop(runtime);
            process::exit(1);
        }
    }
}

/// Logging config from the config file, overridden by CLI flags.
fn build_logging_config(cli: &Cli) -> Result<LoggingConfig, easel::error::ApiError> {
    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.workspace)
            .map(|c| c.logging)
            .unwrap_or_default()
    };

    if cli.verbose {
        config.level = "info".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.parse()?;
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.parse()?;
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }
    Ok(config)
}
