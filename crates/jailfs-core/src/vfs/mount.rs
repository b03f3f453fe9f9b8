//! Mount records and the global mount collection.
//!
//! The collection is guarded by one lock. Traversal takes the lock for a
//! single step only: find the next attached mount after the previous
//! position, mark it busy, and release. The next position is re-derived
//! from the previous mount id on every step, so mounts removed while the
//! lock was dropped never leave a dangling cursor.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Bound, Deref};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jailfs_common::constants::MNAMELEN;
use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{DirId, MountFlags, MountId, StatsRecord, bounded};
use serde::{Deserialize, Serialize};

/// Computes statistics for a mounted filesystem.
pub trait FilesystemDriver: Send + Sync + fmt::Debug {
    /// Returns fresh statistics for `mount`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried.
    fn statfs(&self, mount: &Mount) -> Result<StatsRecord>;
}

/// Block and file usage of a filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    /// Fundamental block size.
    pub block_size: u64,
    /// Total data blocks.
    pub blocks: u64,
    /// Free blocks.
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_avail: u64,
    /// Total file nodes.
    pub files: u64,
    /// Free file nodes.
    pub files_free: u64,
}

/// Driver reporting fixed usage figures, optionally failing every refresh.
#[derive(Debug, Default)]
pub struct StaticDriver {
    usage: Usage,
    failing: AtomicBool,
}

impl StaticDriver {
    /// Creates a driver that reports `usage`.
    #[must_use]
    pub const fn new(usage: Usage) -> Self {
        Self {
            usage,
            failing: AtomicBool::new(false),
        }
    }

    /// Makes subsequent refreshes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl FilesystemDriver for StaticDriver {
    fn statfs(&self, mount: &Mount) -> Result<StatsRecord> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JailFsError::StaleResource {
                message: format!("device {} not responding", mount.device()),
            });
        }
        let usage = self.usage;
        Ok(StatsRecord {
            block_size: usage.block_size,
            io_size: usage.block_size,
            blocks: usage.blocks,
            blocks_free: usage.blocks_free,
            blocks_avail: usage.blocks_avail,
            files: usage.files,
            files_free: usage.files_free,
            ..StatsRecord::default()
        })
    }
}

/// Parameters of a new mount.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Mounted device or source.
    pub device: String,
    /// Filesystem type name.
    pub fs_type: String,
    /// Mount flags.
    pub flags: MountFlags,
    /// Uid of the mounting user.
    pub owner: u32,
    /// Driver computing statistics.
    pub driver: Arc<dyn FilesystemDriver>,
}

/// One attached filesystem.
#[derive(Debug)]
pub struct Mount {
    id: MountId,
    mount_point: String,
    options: MountOptions,
    root: DirId,
    covered: Option<DirId>,
    cached: Mutex<StatsRecord>,
    busy: AtomicUsize,
    unmounting: AtomicBool,
    detached: AtomicBool,
}

impl Mount {
    pub(crate) fn new(
        id: MountId,
        mount_point: &str,
        root: DirId,
        covered: Option<DirId>,
        options: MountOptions,
    ) -> Self {
        Self {
            id,
            mount_point: bounded(mount_point, MNAMELEN),
            options,
            root,
            covered,
            cached: Mutex::new(StatsRecord::default()),
            busy: AtomicUsize::new(0),
            unmounting: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    /// Identity of this mount.
    #[must_use]
    pub const fn id(&self) -> MountId {
        self.id
    }

    /// Real mount-point path, bounded to `MNAMELEN`.
    #[must_use]
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Mounted device or source.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.options.device
    }

    /// Filesystem type name.
    #[must_use]
    pub fn fs_type(&self) -> &str {
        &self.options.fs_type
    }

    /// All mount flags, including internal ones.
    #[must_use]
    pub const fn flags(&self) -> MountFlags {
        self.options.flags
    }

    /// Root directory of the mounted filesystem.
    #[must_use]
    pub const fn root(&self) -> DirId {
        self.root
    }

    /// Directory this mount covers; `None` for the root filesystem.
    #[must_use]
    pub const fn covered(&self) -> Option<DirId> {
        self.covered
    }

    /// Whether the mount has been detached from the namespace.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Whether an unmount of this mount is in progress.
    #[must_use]
    pub fn is_unmounting(&self) -> bool {
        self.unmounting.load(Ordering::SeqCst)
    }

    /// Number of traversals currently holding this mount busy.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Returns the mount's statistics, refreshing them from the driver
    /// first when `refresh` is set.
    ///
    /// Identity fields always come from the mount itself, and flags are
    /// reduced to the visible set.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::RefreshFailed`] if the driver fails.
    pub fn statistics(&self, refresh: bool) -> Result<StatsRecord> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if refresh {
            *cached = self
                .options
                .driver
                .statfs(self)
                .map_err(|e| JailFsError::RefreshFailed {
                    mount: self.mount_point.clone(),
                    message: e.to_string(),
                })?;
        }
        let mut record = cached.clone();
        drop(cached);
        record.flags = self.options.flags.masked(MountFlags::VISIBLE);
        record.owner = self.options.owner;
        record.fsid = fsid(self.id);
        record.set_fs_type(&self.options.fs_type);
        record.set_mount_on_name(&self.mount_point);
        record.set_mount_from_name(&self.options.device);
        Ok(record)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn fsid(id: MountId) -> [i32; 2] {
    [id.get() as i32, (id.get() >> 32) as i32]
}

/// Busy reference on a mount, released on drop.
#[derive(Debug)]
pub struct BusyMount {
    mount: Arc<Mount>,
}

impl BusyMount {
    /// The underlying shared mount record.
    #[must_use]
    pub const fn shared(&self) -> &Arc<Mount> {
        &self.mount
    }
}

impl Deref for BusyMount {
    type Target = Mount;

    fn deref(&self) -> &Mount {
        &self.mount
    }
}

impl Drop for BusyMount {
    fn drop(&mut self) {
        let _ = self.mount.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The global, ordered mount collection.
#[derive(Debug, Default)]
pub struct MountTable {
    inner: Mutex<MountList>,
}

#[derive(Debug, Default)]
struct MountList {
    next_id: u64,
    entries: BTreeMap<MountId, Arc<Mount>>,
}

impl MountTable {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MountList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a mount built by `build` from the next free id.
    pub(crate) fn insert_with(&self, build: impl FnOnce(MountId) -> Mount) -> Arc<Mount> {
        let mut list = self.lock();
        list.next_id += 1;
        let id = MountId::new(list.next_id);
        let mount = Arc::new(build(id));
        let _ = list.entries.insert(id, Arc::clone(&mount));
        mount
    }

    /// Returns the attached mount with the given id.
    #[must_use]
    pub fn get(&self, id: MountId) -> Option<Arc<Mount>> {
        self.lock().entries.get(&id).cloned()
    }

    /// Number of attached mounts, including any being torn down.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no mount is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Snapshot of all attached mounts in collection order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Mount>> {
        self.lock().entries.values().cloned().collect()
    }

    /// Starts a step-locked traversal of the collection.
    #[must_use]
    pub const fn cursor(&self) -> MountCursor<'_> {
        MountCursor {
            table: self,
            last: None,
        }
    }

    /// Marks a mount as being torn down; new busy attempts fail.
    ///
    /// # Errors
    ///
    /// Returns an error if no such mount is attached.
    pub fn begin_unmount(&self, id: MountId) -> Result<Arc<Mount>> {
        let list = self.lock();
        let mount = list.entries.get(&id).cloned().ok_or_else(|| JailFsError::NotFound {
            kind: "mount",
            id: id.to_string(),
        })?;
        mount.unmounting.store(true, Ordering::SeqCst);
        Ok(mount)
    }

    /// Cancels a pending unmount.
    pub fn abort_unmount(&self, mount: &Mount) {
        let _list = self.lock();
        mount.unmounting.store(false, Ordering::SeqCst);
    }

    /// Removes a mount whose unmount has begun and marks it detached.
    ///
    /// Unless `force` is set, fails while traversals hold it busy.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::Busy`] if the mount is busy and `force` is unset.
    pub fn finish_unmount(&self, mount: &Mount, force: bool) -> Result<()> {
        let mut list = self.lock();
        let busy = mount.busy_count();
        if busy > 0 && !force {
            return Err(JailFsError::Busy { in_flight: busy });
        }
        let _ = list.entries.remove(&mount.id);
        mount.detached.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Step-locked iterator over attached mounts, yielding each one busy.
///
/// Mounts being torn down are skipped.
#[derive(Debug)]
pub struct MountCursor<'a> {
    table: &'a MountTable,
    last: Option<MountId>,
}

impl Iterator for MountCursor<'_> {
    type Item = BusyMount;

    fn next(&mut self) -> Option<BusyMount> {
        let list = self.table.lock();
        let lower = self.last.map_or(Bound::Unbounded, Bound::Excluded);
        for (id, mount) in list.entries.range((lower, Bound::Unbounded)) {
            self.last = Some(*id);
            if mount.is_unmounting() {
                tracing::trace!(mount = %id, "skipping mount being torn down");
                continue;
            }
            let _ = mount.busy.fetch_add(1, Ordering::SeqCst);
            return Some(BusyMount {
                mount: Arc::clone(mount),
            });
        }
        None
    }
}
