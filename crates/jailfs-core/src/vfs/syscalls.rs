//! Unfiltered filesystem statistics calls.
//!
//! These report every mount with its real path, exactly as an unconfined
//! process sees them. The jail filter installs itself in front of them.

use std::sync::Arc;

use jailfs_common::constants::STATFS_RECORD_BYTES;
use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{Fd, FsStatFlags, StatsRecord};

use super::{Caller, Vfs};
use crate::dispatch::{FStatFs, GetFsStat, StatFs};

/// Caller-owned destination for statistics records.
pub trait StatSink {
    /// Size of the destination in bytes.
    fn byte_len(&self) -> usize;

    /// Writes `record` into record slot `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::CopyFault`] if the slot cannot be written.
    fn copy_out(&mut self, slot: usize, record: &StatsRecord) -> Result<()>;

    /// Number of whole records the destination can hold.
    fn record_capacity(&self) -> usize {
        self.byte_len() / STATFS_RECORD_BYTES
    }
}

/// Vector-backed statistics buffer.
#[derive(Debug, Clone, Default)]
pub struct StatBuffer {
    byte_len: usize,
    slots: Vec<Option<StatsRecord>>,
}

impl StatBuffer {
    /// A buffer of `byte_len` bytes.
    #[must_use]
    pub fn with_byte_len(byte_len: usize) -> Self {
        Self {
            byte_len,
            slots: vec![None; byte_len / STATFS_RECORD_BYTES],
        }
    }

    /// A buffer with room for exactly `records` records.
    #[must_use]
    pub fn with_records(records: usize) -> Self {
        Self::with_byte_len(records * STATFS_RECORD_BYTES)
    }

    /// Records written so far, up to the first unwritten slot.
    #[must_use]
    pub fn records(&self) -> Vec<StatsRecord> {
        self.slots.iter().map_while(Clone::clone).collect()
    }

    /// Record in `slot`, if written.
    #[must_use]
    pub fn slot(&self, slot: usize) -> Option<&StatsRecord> {
        self.slots.get(slot)?.as_ref()
    }
}

impl StatSink for StatBuffer {
    fn byte_len(&self) -> usize {
        self.byte_len
    }

    fn copy_out(&mut self, slot: usize, record: &StatsRecord) -> Result<()> {
        let dest = self.slots.get_mut(slot).ok_or(JailFsError::CopyFault { slot })?;
        *dest = Some(record.clone());
        Ok(())
    }
}

/// The unfiltered calls over a [`Vfs`].
#[derive(Debug, Clone)]
pub struct HostCalls {
    vfs: Arc<Vfs>,
}

impl HostCalls {
    /// Unfiltered calls over `vfs`.
    #[must_use]
    pub const fn new(vfs: Arc<Vfs>) -> Self {
        Self { vfs }
    }
}

impl GetFsStat for HostCalls {
    fn getfsstat(
        &self,
        caller: &Caller,
        mut buffer: Option<&mut dyn StatSink>,
        flags: FsStatFlags,
    ) -> Result<usize> {
        let max_count = buffer.as_ref().map_or(0, |b| b.record_capacity());
        let refresh = flags.wants_refresh();
        let mut count = 0;
        for mount in self.vfs.mounts().cursor() {
            if let Some(sink) = buffer.as_mut() {
                if count < max_count {
                    let record = match mount.statistics(refresh) {
                        Ok(record) => record,
                        Err(e) => {
                            tracing::warn!(mount = mount.mount_point(), error = %e, "skipping mount");
                            continue;
                        }
                    };
                    sink.copy_out(count, &record)?;
                }
            }
            count += 1;
        }
        tracing::trace!(pid = caller.pid(), count, "getfsstat");
        Ok(if buffer.is_some() && count > max_count {
            max_count
        } else {
            count
        })
    }
}

impl StatFs for HostCalls {
    fn statfs(&self, caller: &Caller, path: &str) -> Result<StatsRecord> {
        let dir = self.vfs.lookup(caller, path)?;
        self.vfs.mount_of(dir)?.statistics(true)
    }
}

impl FStatFs for HostCalls {
    fn fstatfs(&self, caller: &Caller, fd: Fd) -> Result<StatsRecord> {
        let dir = caller.file(fd)?;
        self.vfs.mount_of(dir)?.statistics(true)
    }
}
