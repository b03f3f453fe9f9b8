//! Domain primitive types used across the jailfs workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MFSNAMELEN, MNAMELEN};

/// Reference to a directory known to the directory-entry cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirId(u64);

impl DirId {
    /// Creates a directory reference from its raw number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

/// Identity of a mount in the global mount collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MountId(u64);

impl MountId {
    /// Creates a mount identity from its raw number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount#{}", self.0)
    }
}

/// Per-process file descriptor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fd(pub i32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the prison a confined process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrisonId(pub u32);

/// Confinement state of one process, owned by the containment subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfinementContext {
    /// Prison the process is confined to.
    pub prison: PrisonId,
    /// Directory the process is rooted at, if one has been set.
    pub root: Option<DirId>,
}

/// Mount flag bits as stored on a mount and reported in statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountFlags(u64);

impl MountFlags {
    /// Read-only filesystem.
    pub const RDONLY: Self = Self(0x0000_0001);
    /// All I/O is synchronous.
    pub const SYNCHRONOUS: Self = Self(0x0000_0002);
    /// Executables are not allowed.
    pub const NOEXEC: Self = Self(0x0000_0004);
    /// Set-id bits are ignored.
    pub const NOSUID: Self = Self(0x0000_0008);
    /// Device special files are not interpreted.
    pub const NODEV: Self = Self(0x0000_0010);
    /// Union with the underlying filesystem.
    pub const UNION: Self = Self(0x0000_0020);
    /// All I/O is asynchronous.
    pub const ASYNC: Self = Self(0x0000_0040);
    /// Filesystem is stored locally.
    pub const LOCAL: Self = Self(0x0000_1000);
    /// Quotas are enabled.
    pub const QUOTA: Self = Self(0x0000_2000);
    /// The root filesystem.
    pub const ROOTFS: Self = Self(0x0000_4000);
    /// Mounted by an unprivileged user.
    pub const USER: Self = Self(0x0000_8000);
    /// Access times are not updated.
    pub const NOATIME: Self = Self(0x1000_0000);
    /// Mount request is an update (internal).
    pub const UPDATE: Self = Self(0x0001_0000);
    /// Reload filesystem data (internal).
    pub const RELOAD: Self = Self(0x0004_0000);
    /// Forced unmount in progress (internal).
    pub const FORCE: Self = Self(0x0008_0000);

    /// Flags that statistics records may expose to callers.
    pub const VISIBLE: Self = Self(
        Self::RDONLY.0
            | Self::SYNCHRONOUS.0
            | Self::NOEXEC.0
            | Self::NOSUID.0
            | Self::NODEV.0
            | Self::UNION.0
            | Self::ASYNC.0
            | Self::LOCAL.0
            | Self::QUOTA.0
            | Self::ROOTFS.0
            | Self::USER.0
            | Self::NOATIME.0,
    );

    /// Returns whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the bits of `self` also set in `mask`.
    #[must_use]
    pub const fn masked(self, mask: Self) -> Self {
        Self(self.0 & mask.0)
    }
}

impl std::ops::BitOr for MountFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Caller flags of the mount enumeration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsStatFlags(u32);

impl FsStatFlags {
    /// Refresh statistics before returning them.
    pub const WAIT: Self = Self(0x1);
    /// Return cached statistics.
    pub const NOWAIT: Self = Self(0x2);
    /// Return cached statistics, refreshing lazily.
    pub const LAZY: Self = Self(0x4);

    /// Returns whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether a mount's statistics must be refreshed before reporting.
    ///
    /// `NOWAIT` and `LAZY` select cached data; `WAIT` overrides both.
    #[must_use]
    pub const fn wants_refresh(self) -> bool {
        let cached_only = self.contains(Self::NOWAIT) || self.contains(Self::LAZY);
        !cached_only || self.contains(Self::WAIT)
    }
}

impl std::ops::BitOr for FsStatFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Filesystem statistics as returned by the stat calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Filesystem type name.
    pub fs_type: String,
    /// Visible mount flags.
    pub flags: MountFlags,
    /// Fundamental block size.
    pub block_size: u64,
    /// Optimal transfer block size.
    pub io_size: u64,
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
    /// Uid of the user that mounted the filesystem.
    pub owner: u32,
    /// Filesystem identifier.
    pub fsid: [i32; 2],
    /// Directory the filesystem is mounted on, as displayed to the caller.
    pub mount_on_name: String,
    /// Mounted device or source.
    pub mount_from_name: String,
}

impl StatsRecord {
    /// Replaces the displayed mount point, truncated to fit `MNAMELEN`.
    pub fn set_mount_on_name(&mut self, name: &str) {
        self.mount_on_name = bounded(name, MNAMELEN);
    }

    /// Replaces the device name, truncated to fit `MNAMELEN`.
    pub fn set_mount_from_name(&mut self, name: &str) {
        self.mount_from_name = bounded(name, MNAMELEN);
    }

    /// Replaces the filesystem type name, truncated to fit `MFSNAMELEN`.
    pub fn set_fs_type(&mut self, name: &str) {
        self.fs_type = bounded(name, MFSNAMELEN);
    }
}

/// Copies at most `size - 1` bytes of `s`, backing off to a char boundary.
#[must_use]
pub fn bounded(s: &str, size: usize) -> String {
    let mut end = s.len().min(size.saturating_sub(1));
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_rules_follow_caller_flags() {
        assert!(FsStatFlags::default().wants_refresh());
        assert!(FsStatFlags::WAIT.wants_refresh());
        assert!(!FsStatFlags::NOWAIT.wants_refresh());
        assert!(!FsStatFlags::LAZY.wants_refresh());
        assert!((FsStatFlags::NOWAIT | FsStatFlags::WAIT).wants_refresh());
    }

    #[test]
    fn visible_mask_strips_internal_flags() {
        let flags = MountFlags::RDONLY | MountFlags::UPDATE | MountFlags::FORCE;
        assert_eq!(flags.masked(MountFlags::VISIBLE), MountFlags::RDONLY);
    }

    #[test]
    fn mount_on_name_is_bounded() {
        let mut record = StatsRecord::default();
        record.set_mount_on_name(&"x".repeat(200));
        assert_eq!(record.mount_on_name.len(), MNAMELEN - 1);
    }

    #[test]
    fn bounded_respects_char_boundaries() {
        assert_eq!(bounded("aé", 3), "a");
        assert_eq!(bounded("abc", 0), "");
    }
}
