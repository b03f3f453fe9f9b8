//! The filtered `getfsstat`, `statfs`, and `fstatfs` calls.
//!
//! Unconfined callers go straight to the saved originals. Confined callers
//! get their confinement root resolved afresh on every call; mounts outside
//! it are dropped and the rest are shown relative to it.

use std::sync::Arc;

use jailfs_common::config::JailFsConfig;
use jailfs_common::error::Result;
use jailfs_common::types::{Fd, FsStatFlags, StatsRecord};

use super::filter::{Visibility, filter_path};
use super::{lookup, resolver};
use crate::dispatch::{FStatFs, GetFsStat, Handlers, StatFs};
use crate::vfs::mount::{BusyMount, Mount};
use crate::vfs::syscalls::StatSink;
use crate::vfs::{Caller, Vfs};

/// A record fetched for one mount, before it is committed to the
/// caller's buffer.
#[derive(Debug)]
enum Staged {
    /// Visible: write it to the next slot.
    Commit(StatsRecord),
    /// Hidden: drop it without using a slot.
    Discard,
}

/// Filtered calls, wrapping the originals they replace.
pub struct JailCalls {
    vfs: Arc<Vfs>,
    originals: Handlers,
    max_path_len: usize,
}

impl JailCalls {
    /// Filtered calls over `vfs`, falling back to `originals`.
    #[must_use]
    pub fn new(vfs: Arc<Vfs>, originals: Handlers, config: &JailFsConfig) -> Self {
        Self {
            vfs,
            originals,
            max_path_len: config.effective_path_len(),
        }
    }

    fn root_path(&self, caller: &Caller) -> Result<String> {
        resolver::confinement_root(self.vfs.dcache(), caller.confinement(), self.max_path_len)
    }

    /// Path `mount` is displayed under, or `None` if it is hidden.
    fn displayed_path(mount: &BusyMount, root_mount: &Arc<Mount>, root: &str) -> Option<String> {
        if Arc::ptr_eq(mount.shared(), root_mount) {
            return Some("/".to_owned());
        }
        filter_path(mount.mount_point(), root).into_path()
    }

    fn stage(
        mount: &BusyMount,
        root_mount: &Arc<Mount>,
        root: &str,
        refresh: bool,
    ) -> Result<Staged> {
        let mut record = mount.statistics(refresh)?;
        Ok(match Self::displayed_path(mount, root_mount, root) {
            Some(path) => {
                record.set_mount_on_name(&path);
                Staged::Commit(record)
            }
            None => Staged::Discard,
        })
    }

    fn confine_record(&self, caller: &Caller, mut record: StatsRecord) -> Result<StatsRecord> {
        if !caller.is_confined() {
            return Ok(record);
        }
        let root = self.root_path(caller)?;
        match filter_path(&record.mount_on_name, &root) {
            Visibility::Visible(path) if !path.is_empty() => record.set_mount_on_name(&path),
            _ => record.set_mount_on_name("/"),
        }
        Ok(record)
    }
}

impl GetFsStat for JailCalls {
    fn getfsstat(
        &self,
        caller: &Caller,
        mut buffer: Option<&mut dyn StatSink>,
        flags: FsStatFlags,
    ) -> Result<usize> {
        if !caller.is_confined() {
            return self.originals.getfsstat.getfsstat(caller, buffer, flags);
        }
        let root = self.root_path(caller)?;
        let root_mount = lookup::root_mount(&self.vfs, caller)?;
        let max_count = buffer.as_ref().map_or(0, |b| b.record_capacity());
        let refresh = flags.wants_refresh();

        let mut count = 0;
        for mount in self.vfs.mounts().cursor() {
            match buffer.as_mut() {
                Some(sink) if count < max_count => {
                    match Self::stage(&mount, &root_mount, &root, refresh) {
                        Ok(Staged::Commit(record)) => {
                            sink.copy_out(count, &record)?;
                            count += 1;
                        }
                        Ok(Staged::Discard) => {}
                        Err(e) => {
                            tracing::warn!(
                                pid = caller.pid(),
                                mount = mount.mount_point(),
                                error = %e,
                                "skipping mount"
                            );
                        }
                    }
                }
                _ => {
                    if Self::displayed_path(&mount, &root_mount, &root).is_some() {
                        count += 1;
                    }
                }
            }
        }

        tracing::debug!(pid = caller.pid(), root = root.as_str(), count, max_count, "filtered getfsstat");
        Ok(if buffer.is_some() && count > max_count {
            max_count
        } else {
            count
        })
    }
}

impl StatFs for JailCalls {
    fn statfs(&self, caller: &Caller, path: &str) -> Result<StatsRecord> {
        let record = self.originals.statfs.statfs(caller, path)?;
        self.confine_record(caller, record)
    }
}

impl FStatFs for JailCalls {
    fn fstatfs(&self, caller: &Caller, fd: Fd) -> Result<StatsRecord> {
        let record = self.originals.fstatfs.fstatfs(caller, fd)?;
        self.confine_record(caller, record)
    }
}
