//! Identity of the mount a caller's root directory lives on.

use std::sync::Arc;

use jailfs_common::error::Result;

use crate::vfs::mount::Mount;
use crate::vfs::{Caller, Vfs};

/// Resolves `"/"` as `caller` sees it and returns the mount it lands on.
///
/// # Errors
///
/// Returns an error if the lookup fails or the mount is detached.
pub fn root_mount(vfs: &Vfs, caller: &Caller) -> Result<Arc<Mount>> {
    let dir = vfs.lookup(caller, "/")?;
    vfs.mount_of(dir)
}
