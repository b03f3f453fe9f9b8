//! In-memory virtual filesystem model.
//!
//! Holds the directory-entry cache and the mount collection, resolves
//! paths on behalf of callers, and implements the unfiltered stat calls
//! that the jail filter wraps.

pub mod dcache;
pub mod mount;
pub mod namei;
pub mod syscalls;

use std::collections::HashMap;
use std::sync::Arc;

use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{ConfinementContext, DirId, Fd, MountId};

use self::dcache::{DirCache, DirectoryEntryCache};
use self::mount::{Mount, MountOptions, MountTable};

/// The calling process, as seen by the stat calls.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pid: u32,
    confinement: Option<ConfinementContext>,
    cwd: Option<DirId>,
    fds: HashMap<Fd, DirId>,
}

impl Caller {
    /// An unconfined process.
    #[must_use]
    pub fn host(pid: u32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }

    /// A process confined by `context`.
    #[must_use]
    pub fn confined(pid: u32, context: ConfinementContext) -> Self {
        Self {
            pid,
            confinement: Some(context),
            ..Self::default()
        }
    }

    /// Sets the working directory used for relative lookups.
    #[must_use]
    pub const fn with_cwd(mut self, dir: DirId) -> Self {
        self.cwd = Some(dir);
        self
    }

    /// Opens `fd` on `dir`.
    #[must_use]
    pub fn with_fd(mut self, fd: Fd, dir: DirId) -> Self {
        let _ = self.fds.insert(fd, dir);
        self
    }

    /// Process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Confinement context, `None` for unconfined processes.
    #[must_use]
    pub const fn confinement(&self) -> Option<&ConfinementContext> {
        self.confinement.as_ref()
    }

    /// Whether the process is confined.
    #[must_use]
    pub const fn is_confined(&self) -> bool {
        self.confinement.is_some()
    }

    /// Directory an open descriptor refers to.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::BadDescriptor`] if `fd` is not open.
    pub fn file(&self, fd: Fd) -> Result<DirId> {
        self.fds
            .get(&fd)
            .copied()
            .ok_or(JailFsError::BadDescriptor { fd: fd.0 })
    }
}

/// The filesystem namespace: cache plus mounts.
#[derive(Debug)]
pub struct Vfs {
    dcache: DirCache,
    mounts: MountTable,
}

impl Vfs {
    /// Creates a namespace whose global root is a fresh root filesystem.
    pub fn new(root: MountOptions) -> Self {
        let dcache = DirCache::new();
        let mounts = MountTable::new();
        let global_root = dcache.global_root();
        let mount = mounts.insert_with(|id| Mount::new(id, "/", global_root, None, root));
        let vfs = Self { dcache, mounts };
        // The global root always exists, so attaching it cannot fail.
        let _ = vfs.dcache.attach(&mount);
        tracing::debug!(device = mount.device(), "root filesystem attached");
        vfs
    }

    /// The directory-entry cache.
    #[must_use]
    pub const fn dcache(&self) -> &DirCache {
        &self.dcache
    }

    /// The global mount collection.
    #[must_use]
    pub const fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// The global root directory.
    #[must_use]
    pub fn global_root(&self) -> DirId {
        self.dcache.global_root()
    }

    /// Mount whose filesystem contains `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is unknown or its mount is detached.
    pub fn mount_of(&self, dir: DirId) -> Result<Arc<Mount>> {
        let mount = self.dcache.mount_of(dir).ok_or_else(|| JailFsError::NotFound {
            kind: "directory",
            id: dir.to_string(),
        })?;
        if mount.is_detached() {
            return Err(JailFsError::StaleResource {
                message: format!("{} was unmounted", mount.mount_point()),
            });
        }
        Ok(mount)
    }

    /// Creates every missing directory along `path`, as seen by `caller`.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be created.
    pub fn mkdir_all(&self, caller: &Caller, path: &str) -> Result<DirId> {
        let mut dir = self.cross_mounts(self.start_dir(caller, path));
        for name in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            dir = if name == ".." {
                self.dotdot(caller, dir)
            } else {
                self.cross_mounts(self.dcache.mkdir(dir, name)?)
            };
        }
        Ok(dir)
    }

    /// Mounts a new filesystem on `path`, creating it if needed.
    ///
    /// `path` is recorded verbatim as the mount point.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not absolute or cannot be created.
    pub fn mount(&self, caller: &Caller, path: &str, options: MountOptions) -> Result<Arc<Mount>> {
        if !path.starts_with('/') {
            return Err(JailFsError::InvalidArgument {
                message: format!("mount point {path:?} is not absolute"),
            });
        }
        let covered = self.mkdir_all(caller, path)?;
        let root = self.dcache.allocate();
        let mount = self
            .mounts
            .insert_with(|id| Mount::new(id, path, root, Some(covered), options));
        self.dcache.attach(&mount)?;
        tracing::info!(
            mount = %mount.id(),
            path,
            device = mount.device(),
            "filesystem mounted"
        );
        Ok(mount)
    }

    /// Unmounts the mount with the given id.
    ///
    /// A forced unmount proceeds even while traversals hold the mount busy.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount is unknown, or busy and `force` is unset.
    pub fn unmount(&self, id: MountId, force: bool) -> Result<()> {
        let mount = self.mounts.begin_unmount(id)?;
        if let Err(e) = self.mounts.finish_unmount(&mount, force) {
            self.mounts.abort_unmount(&mount);
            return Err(e);
        }
        self.dcache.detach(&mount);
        tracing::info!(mount = %id, path = mount.mount_point(), force, "filesystem unmounted");
        Ok(())
    }
}
