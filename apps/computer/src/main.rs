// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the computer VM launcher.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the computer VM launcher.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use computer::{install_signal_handlers, resolve_config, DisplayMode, Orchestrator, ShutdownToken};
use env_logger::Env;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Boot a QEMU virtual machine behind noVNC")]
struct Cli {
    /// Run QEMU in a local full-screen window instead of serving it through noVNC.
    #[arg(long = "no-vnc", default_value_t = false)]
    no_vnc: bool,
}

fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(LevelFilter::Info.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config().context("failed to resolve computer configuration")?;
    let token = ShutdownToken::new();
    install_signal_handlers(&token).context("failed to install signal handlers")?;

    let mut orchestrator = Orchestrator::new(config, DisplayMode::from_preference(!cli.no_vnc));
    let mut session = orchestrator.boot().context("failed to boot virtual machine")?;
    orchestrator.run_until_shutdown(&mut session, &token);
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[ERROR] {err:#}");
            ExitCode::FAILURE
        }
    }
}
