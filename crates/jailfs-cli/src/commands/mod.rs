//! CLI command definitions and dispatch.

pub mod fstatfs;
pub mod mounts;
pub mod root;
pub mod statfs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jailfs_common::config::JailFsConfig;
use jailfs_core::dispatch::{Handlers, Interceptor, SyscallTable};
use jailfs_core::topology::Topology;
use jailfs_core::vfs::syscalls::HostCalls;
use jailfs_core::vfs::{Caller, Vfs};

/// jailfs: filesystem statistics as seen from inside a jail.
#[derive(Parser, Debug)]
#[command(name = jailfs_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Topology file describing mounts and processes.
    #[arg(long, env = "JAILFS_TOPOLOGY")]
    pub topology: PathBuf,

    /// Process to query as; defaults to an unconfined process.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Query the unfiltered calls.
    #[arg(long)]
    pub no_filter: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List mounted filesystems.
    Mounts(mounts::MountsArgs),
    /// Show statistics for the filesystem holding a path.
    Statfs(statfs::StatfsArgs),
    /// Show statistics for the filesystem an open descriptor is on.
    Fstatfs(fstatfs::FstatfsArgs),
    /// Print the resolved confinement root.
    Root(root::RootArgs),
}

/// Everything a command needs to issue calls.
#[derive(Debug)]
pub struct Session {
    /// The namespace built from the topology.
    pub vfs: Arc<Vfs>,
    /// Table the calls are dispatched through.
    pub table: Arc<SyscallTable>,
    /// Process the calls are made as.
    pub caller: Caller,
    /// Interceptor configuration.
    pub config: JailFsConfig,
}

/// Dispatches the parsed CLI command to its handler.
///
/// The filtered calls are installed for the duration of the command
/// unless `--no-filter` is given.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let scenario = Topology::load(&cli.topology)?.build()?;
    let caller = match cli.pid {
        Some(pid) => scenario.caller(pid)?,
        None => Caller::host(0),
    };
    let table = Arc::new(SyscallTable::new(Handlers::from_calls(Arc::new(
        HostCalls::new(Arc::clone(&scenario.vfs)),
    ))));
    let interceptor = Interceptor::new(
        Arc::clone(&scenario.vfs),
        Arc::clone(&table),
        scenario.config.clone(),
    )?;
    if !cli.no_filter {
        interceptor.activate()?;
    }
    tracing::debug!(
        pid = caller.pid(),
        confined = caller.is_confined(),
        filtered = interceptor.is_active(),
        "session ready"
    );

    let session = Session {
        vfs: scenario.vfs,
        table,
        caller,
        config: scenario.config,
    };
    let result = match cli.command {
        Command::Mounts(args) => mounts::execute(&session, &args),
        Command::Statfs(args) => statfs::execute(&session, &args),
        Command::Fstatfs(args) => fstatfs::execute(&session, &args),
        Command::Root(args) => root::execute(&session, &args),
    };

    let teardown = if interceptor.is_active() {
        interceptor.deactivate()
    } else {
        Ok(())
    };
    settle(result, teardown)
}

/// Combines the command outcome with the interceptor teardown.
///
/// A command error always wins; a teardown error is reported only when
/// the command itself succeeded.
fn settle(
    result: anyhow::Result<()>,
    teardown: jailfs_common::error::Result<()>,
) -> anyhow::Result<()> {
    match (result, teardown) {
        (result, Ok(())) => result,
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(e), Err(teardown)) => {
            tracing::warn!(error = %teardown, "filtered calls left installed");
            Err(e)
        }
    }
}
