// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;
use faucet_config::{Config, LogFormat};
use tracing::{
    level_filters::LevelFilter,
    subscriber::{set_global_default, SetGlobalDefaultError},
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file.
    /// Values missing from it are taken from the defaults and from
    /// `FAUCET_`-prefixed environment variables.
    #[arg(long, value_name = "FILE", verbatim_doc_comment)]
    pub config: Option<PathBuf>,
}

/// Sets up tracing, allows log level to be set from the environment variables
pub fn init_tracing(format: LogFormat) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let subscriber_builder = FmtSubscriber::builder().with_env_filter(filter);
    match format {
        LogFormat::Json => set_global_default(subscriber_builder.json().finish()),
        LogFormat::Full => set_global_default(subscriber_builder.finish()),
        LogFormat::Compact => set_global_default(subscriber_builder.compact().finish()),
        LogFormat::Pretty => {
            set_global_default(subscriber_builder.with_ansi(true).pretty().finish())
        }
    }
}

pub fn get_config() -> anyhow::Result<Config> {
    let cli = Cli::parse();
    let config = Config::parse(cli.config.as_ref()).map_err(|e| {
        // tracing is not set up yet
        eprintln!(
            "Invalid configuration file `{}`: {}, if a value is missing you can also use \
                --config to fill the rest of the values",
            cli.config.unwrap_or_default().display(),
            e
        );
        anyhow::anyhow!(e)
    })?;

    init_tracing(config.log.format).map_err(|e| {
        anyhow::anyhow!(
            "Could not set up global default subscriber for logger, check \
            environmental variable `RUST_LOG`: {e}"
        )
    })?;

    Ok(config)
}
