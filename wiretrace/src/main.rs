// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

mod convert;
mod loopback;

use args::{CmdArgs, Command, Configuration, Parser};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Log filter precedence: command line, `RUST_LOG`, configuration file, `info`.
fn init_logging(args: &CmdArgs, config: &Configuration) -> miette::Result<()> {
    let filter = match args.log_level() {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.tracing.level.as_deref().unwrap_or("info"))),
    }
    .map_err(|e| miette::miette!("invalid log filter: {e}"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .with(filter)
        .try_init()
        .map_err(|e| miette::miette!("failed to install the log subscriber: {e}"))?;
    Ok(())
}

fn main() -> miette::Result<()> {
    let args = CmdArgs::parse();
    let config = args.configuration()?;
    init_logging(&args, &config)?;
    stats::describe();
    debug!("configuration: {config:?}");

    match args.command() {
        Command::Import(import) => convert::import(import, &config),
        Command::Export(export) => convert::export(export, &config),
        Command::Validate(validate) => convert::validate(validate),
        Command::Generate(generate) => convert::generate(generate),
        Command::Loopback(loopback) => loopback::run(loopback, &config),
    }
}
