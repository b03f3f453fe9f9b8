//! `jailfs fstatfs`: Statistics for the filesystem an open descriptor is on.

use clap::Args;
use jailfs_common::types::Fd;

use super::Session;
use crate::output;

/// Arguments for the `fstatfs` command.
#[derive(Args, Debug)]
pub struct FstatfsArgs {
    /// Descriptor number in the process.
    pub fd: i32,

    /// Print the record as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `fstatfs` command.
///
/// # Errors
///
/// Returns an error if the descriptor is not open or cannot be queried.
pub fn execute(session: &Session, args: &FstatfsArgs) -> anyhow::Result<()> {
    let record = session.table.fstatfs(&session.caller, Fd(args.fd))?;
    if args.json {
        println!("{}", output::to_json(&record)?);
    } else {
        print!("{}", output::record_details(&record));
    }
    Ok(())
}
