//! Call dispatch for the filesystem statistics calls.
//!
//! The [`SyscallTable`] routes each call to the handler currently bound to
//! it. Handlers are swapped as one [`Handlers`] set under a write lock, so
//! the table never holds a mix of filtered and unfiltered handlers. Every
//! call registers itself as in flight while still holding the read lock it
//! used to fetch its handler; a writer therefore sees every call that could
//! still be running an old handler.

pub mod interceptor;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{Fd, FsStatFlags, StatsRecord};

use crate::vfs::Caller;
use crate::vfs::syscalls::StatSink;

pub use self::interceptor::Interceptor;

/// Enumerates mounted filesystems.
pub trait GetFsStat: Send + Sync {
    /// Writes statistics for mounted filesystems into `buffer` and returns
    /// how many were written, or how many exist when `buffer` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails as a whole.
    fn getfsstat(
        &self,
        caller: &Caller,
        buffer: Option<&mut dyn StatSink>,
        flags: FsStatFlags,
    ) -> Result<usize>;
}

/// Reports statistics for the filesystem containing a path.
pub trait StatFs: Send + Sync {
    /// Statistics for the filesystem `path` lives on.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be resolved or queried.
    fn statfs(&self, caller: &Caller, path: &str) -> Result<StatsRecord>;
}

/// Reports statistics for the filesystem an open descriptor refers to.
pub trait FStatFs: Send + Sync {
    /// Statistics for the filesystem `fd` lives on.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is not open or cannot be queried.
    fn fstatfs(&self, caller: &Caller, fd: Fd) -> Result<StatsRecord>;
}

/// One handler per dispatched call.
#[derive(Clone)]
pub struct Handlers {
    /// Handler for `getfsstat`.
    pub getfsstat: Arc<dyn GetFsStat>,
    /// Handler for `statfs`.
    pub statfs: Arc<dyn StatFs>,
    /// Handler for `fstatfs`.
    pub fstatfs: Arc<dyn FStatFs>,
}

impl Handlers {
    /// Binds all three calls to `calls`.
    pub fn from_calls<T>(calls: Arc<T>) -> Self
    where
        T: GetFsStat + StatFs + FStatFs + 'static,
    {
        let getfsstat: Arc<dyn GetFsStat> = calls.clone();
        let statfs: Arc<dyn StatFs> = calls.clone();
        let fstatfs: Arc<dyn FStatFs> = calls;
        Self {
            getfsstat,
            statfs,
            fstatfs,
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers").finish_non_exhaustive()
    }
}

/// Marks one call as in flight until dropped.
#[derive(Debug)]
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Routes calls to their bound handlers.
#[derive(Debug)]
pub struct SyscallTable {
    handlers: RwLock<Handlers>,
    in_flight: AtomicUsize,
}

impl SyscallTable {
    /// A table bound to `handlers`.
    #[must_use]
    pub const fn new(handlers: Handlers) -> Self {
        Self {
            handlers: RwLock::new(handlers),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetches a handler and registers the call, both under the read lock.
    fn enter<T>(&self, pick: impl FnOnce(&Handlers) -> T) -> (T, InFlight<'_>) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let _ = self.in_flight.fetch_add(1, Ordering::SeqCst);
        (pick(&handlers), InFlight(&self.in_flight))
    }

    /// Number of calls currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The currently bound handlers.
    #[must_use]
    pub fn bound(&self) -> Handlers {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the bound handlers with `build(current)` in one step and
    /// returns the handlers that were bound before.
    pub(crate) fn rebind(&self, build: impl FnOnce(&Handlers) -> Handlers) -> Handlers {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let next = build(&handlers);
        std::mem::replace(&mut *handlers, next)
    }

    /// Binds `handlers` if no call is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::Busy`] if calls are still executing; the
    /// bound handlers are left untouched.
    pub(crate) fn rebind_idle(&self, handlers: Handlers) -> Result<Handlers> {
        let mut bound = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let in_flight = self.in_flight();
        if in_flight > 0 {
            return Err(JailFsError::Busy { in_flight });
        }
        Ok(std::mem::replace(&mut *bound, handlers))
    }

    /// Dispatches `getfsstat`.
    ///
    /// # Errors
    ///
    /// Returns whatever the bound handler returns.
    pub fn getfsstat(
        &self,
        caller: &Caller,
        buffer: Option<&mut dyn StatSink>,
        flags: FsStatFlags,
    ) -> Result<usize> {
        let (handler, _call) = self.enter(|h| Arc::clone(&h.getfsstat));
        handler.getfsstat(caller, buffer, flags)
    }

    /// Dispatches `statfs`.
    ///
    /// # Errors
    ///
    /// Returns whatever the bound handler returns.
    pub fn statfs(&self, caller: &Caller, path: &str) -> Result<StatsRecord> {
        let (handler, _call) = self.enter(|h| Arc::clone(&h.statfs));
        handler.statfs(caller, path)
    }

    /// Dispatches `fstatfs`.
    ///
    /// # Errors
    ///
    /// Returns whatever the bound handler returns.
    pub fn fstatfs(&self, caller: &Caller, fd: Fd) -> Result<StatsRecord> {
        let (handler, _call) = self.enter(|h| Arc::clone(&h.fstatfs));
        handler.fstatfs(caller, fd)
    }
}
