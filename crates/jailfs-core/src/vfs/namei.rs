//! Path lookup on behalf of a caller.
//!
//! Absolute paths start at the caller's root (its confinement directory,
//! or the global root), relative ones at its working directory. Lookups
//! descend into mounts covering a directory and never climb above the
//! caller's root.

use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::DirId;

use super::dcache::DirectoryEntryCache;
use super::{Caller, Vfs};

impl Vfs {
    /// Root directory of `caller`.
    #[must_use]
    pub fn root_dir(&self, caller: &Caller) -> DirId {
        caller
            .confinement()
            .and_then(|c| c.root)
            .unwrap_or_else(|| self.global_root())
    }

    pub(super) fn start_dir(&self, caller: &Caller, path: &str) -> DirId {
        if path.starts_with('/') {
            self.root_dir(caller)
        } else {
            caller.cwd.unwrap_or_else(|| self.root_dir(caller))
        }
    }

    /// Follows mounts stacked on `dir` down to the topmost mount root.
    pub(super) fn cross_mounts(&self, mut dir: DirId) -> DirId {
        while let Some(mount) = self.dcache.mounted_here(dir) {
            dir = mount.root();
        }
        dir
    }

    /// Parent of `dir`, clamped at the caller's root and the global root.
    pub(super) fn dotdot(&self, caller: &Caller, mut dir: DirId) -> DirId {
        let root = self.root_dir(caller);
        let global = self.global_root();
        loop {
            if dir == root || dir == global {
                return dir;
            }
            if !self.dcache.is_mount_root(dir) {
                break;
            }
            match self.dcache.mount_of(dir).and_then(|m| m.covered()) {
                Some(covered) => dir = covered,
                None => return dir,
            }
        }
        self.dcache
            .parent_link(dir)
            .map_or(dir, |link| self.cross_mounts(link.parent))
    }

    /// Resolves `path` to a directory as seen by `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::NotFound`] if the path is empty or a
    /// component does not exist.
    pub fn lookup(&self, caller: &Caller, path: &str) -> Result<DirId> {
        if path.is_empty() {
            return Err(not_found(path));
        }
        let mut dir = self.cross_mounts(self.start_dir(caller, path));
        for name in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            dir = if name == ".." {
                self.dotdot(caller, dir)
            } else {
                let child = self.dcache.child(dir, name).ok_or_else(|| not_found(path))?;
                self.cross_mounts(child)
            };
        }
        Ok(dir)
    }
}

fn not_found(path: &str) -> JailFsError {
    JailFsError::NotFound {
        kind: "path",
        id: path.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jailfs_common::types::{ConfinementContext, MountFlags, PrisonId};

    use super::*;
    use crate::vfs::mount::{MountOptions, StaticDriver, Usage};

    fn options(device: &str) -> MountOptions {
        MountOptions {
            device: device.into(),
            fs_type: "ufs".into(),
            flags: MountFlags::LOCAL,
            owner: 0,
            driver: Arc::new(StaticDriver::new(Usage::default())),
        }
    }

    #[test]
    fn lookup_crosses_into_mounts() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let usr = vfs.mount(&host, "/usr", options("/dev/ad0s1f")).expect("mount");
        let local = vfs.mkdir_all(&host, "/usr/local").expect("mkdir");

        assert_eq!(vfs.lookup(&host, "/usr").expect("lookup"), usr.root());
        assert_eq!(vfs.lookup(&host, "/usr/local").expect("lookup"), local);
        assert_eq!(vfs.mount_of(local).expect("mounted").id(), usr.id());
    }

    #[test]
    fn dotdot_climbs_out_of_mounts() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let _ = vfs.mount(&host, "/usr", options("/dev/ad0s1f")).expect("mount");
        let etc = vfs.mkdir_all(&host, "/etc").expect("mkdir");
        assert_eq!(vfs.lookup(&host, "/usr/../etc").expect("lookup"), etc);
    }

    #[test]
    fn confined_lookup_starts_and_stops_at_jail_root() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let jail = vfs.mkdir_all(&host, "/jail/www").expect("mkdir");
        let inner = vfs.mkdir_all(&host, "/jail/www/tmp").expect("mkdir");
        let confined = Caller::confined(
            2,
            ConfinementContext {
                prison: PrisonId(1),
                root: Some(jail),
            },
        );

        assert_eq!(vfs.lookup(&confined, "/").expect("lookup"), jail);
        assert_eq!(vfs.lookup(&confined, "/tmp").expect("lookup"), inner);
        assert_eq!(vfs.lookup(&confined, "/../..").expect("lookup"), jail);
    }

    #[test]
    fn missing_component_is_not_found() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let err = vfs.lookup(&Caller::host(1), "/nope").expect_err("missing");
        assert!(matches!(err, JailFsError::NotFound { kind: "path", .. }));
        assert!(vfs.lookup(&Caller::host(1), "").is_err());
    }

    #[test]
    fn stacked_mounts_resolve_to_topmost() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let lower = vfs.mount(&host, "/mnt", options("/dev/da0")).expect("mount");
        let upper = vfs.mount(&host, "/mnt", options("/dev/da1")).expect("mount");
        assert_eq!(upper.covered(), Some(lower.root()));
        assert_eq!(vfs.lookup(&host, "/mnt").expect("lookup"), upper.root());
    }
}
