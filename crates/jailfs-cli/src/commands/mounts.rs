//! `jailfs mounts`: List mounted filesystems.

use clap::Args;
use jailfs_common::types::FsStatFlags;
use jailfs_core::vfs::syscalls::{StatBuffer, StatSink};

use super::Session;
use crate::output;

/// Arguments for the `mounts` command.
#[derive(Args, Debug)]
pub struct MountsArgs {
    /// Report cached statistics without refreshing them.
    #[arg(long)]
    pub nowait: bool,

    /// Same as `--nowait`.
    #[arg(long)]
    pub lazy: bool,

    /// Refresh statistics even when combined with `--nowait` or `--lazy`.
    #[arg(long)]
    pub wait: bool,

    /// Number of record slots to pass; defaults to the reported count.
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Print records as JSON.
    #[arg(long)]
    pub json: bool,
}

impl MountsArgs {
    fn flags(&self) -> FsStatFlags {
        let mut flags = FsStatFlags::default();
        if self.nowait {
            flags = flags | FsStatFlags::NOWAIT;
        }
        if self.lazy {
            flags = flags | FsStatFlags::LAZY;
        }
        if self.wait {
            flags = flags | FsStatFlags::WAIT;
        }
        flags
    }
}

/// Executes the `mounts` command.
///
/// Without `--capacity`, asks for the count first and then sizes the
/// buffer to it.
///
/// # Errors
///
/// Returns an error if either call fails.
pub fn execute(session: &Session, args: &MountsArgs) -> anyhow::Result<()> {
    let flags = args.flags();
    let capacity = match args.capacity {
        Some(capacity) => capacity,
        None => session.table.getfsstat(&session.caller, None, flags)?,
    };

    let mut buffer = StatBuffer::with_records(capacity);
    let sink: &mut dyn StatSink = &mut buffer;
    let count = session.table.getfsstat(&session.caller, Some(sink), flags)?;
    let records = buffer.records();
    tracing::debug!(count, capacity, "mounts listed");

    if args.json {
        println!("{}", output::to_json(&records)?);
    } else if records.is_empty() {
        println!("No filesystems visible.");
    } else {
        print!("{}", output::mount_table(&records));
    }
    Ok(())
}
