//! `jailfs statfs`: Statistics for the filesystem holding a path.

use clap::Args;

use super::Session;
use crate::output;

/// Arguments for the `statfs` command.
#[derive(Args, Debug)]
pub struct StatfsArgs {
    /// Path as the process sees it.
    pub path: String,

    /// Print the record as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `statfs` command.
///
/// # Errors
///
/// Returns an error if the path cannot be resolved or queried.
pub fn execute(session: &Session, args: &StatfsArgs) -> anyhow::Result<()> {
    let record = session.table.statfs(&session.caller, &args.path)?;
    if args.json {
        println!("{}", output::to_json(&record)?);
    } else {
        print!("{}", output::record_details(&record));
    }
    Ok(())
}
