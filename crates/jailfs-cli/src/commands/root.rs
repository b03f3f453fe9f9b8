//! `jailfs root`: Print the resolved confinement root.

use clap::Args;
use jailfs_core::jail::confinement_root;
use jailfs_core::jail::lookup::root_mount;

use super::Session;

/// Arguments for the `root` command.
#[derive(Args, Debug)]
pub struct RootArgs {
    /// Also print the filesystem the root lives on.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Executes the `root` command.
///
/// # Errors
///
/// Returns an error if the confinement root cannot be resolved.
pub fn execute(session: &Session, args: &RootArgs) -> anyhow::Result<()> {
    let root = confinement_root(
        session.vfs.dcache(),
        session.caller.confinement(),
        session.config.effective_path_len(),
    )?;
    if args.verbose {
        let mount = root_mount(&session.vfs, &session.caller)?;
        println!(
            "{root}\t{}\t{}\t{}",
            mount.device(),
            mount.fs_type(),
            mount.mount_point()
        );
    } else {
        println!("{root}");
    }
    Ok(())
}
