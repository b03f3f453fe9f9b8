//! # jailfs: jail-aware filesystem statistics
//!
//! Loads a topology file, installs the filtered statistics calls, and
//! queries them on behalf of one of the topology's processes.

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
