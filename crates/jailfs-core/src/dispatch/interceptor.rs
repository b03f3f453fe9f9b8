//! Installs and removes the filtered calls.
//!
//! An [`Interceptor`] is either inactive, or active and holding the
//! handlers it displaced. Activation captures the bound handlers and
//! installs the filtered ones in a single table swap. Deactivation puts the
//! captured handlers back, but only once no call is running through the
//! table.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jailfs_common::config::JailFsConfig;
use jailfs_common::constants::{APP_NAME, VERSION};
use jailfs_common::error::{JailFsError, Result};

use super::{Handlers, SyscallTable};
use crate::jail::JailCalls;
use crate::vfs::Vfs;

#[derive(Debug)]
enum State {
    Inactive,
    Active { originals: Handlers },
}

/// Owner of the filtered-call installation on one table.
#[derive(Debug)]
pub struct Interceptor {
    vfs: Arc<Vfs>,
    table: Arc<SyscallTable>,
    config: JailFsConfig,
    state: Mutex<State>,
}

impl Interceptor {
    /// An inactive interceptor for `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(vfs: Arc<Vfs>, table: Arc<SyscallTable>, config: JailFsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vfs,
            table,
            config,
            state: Mutex::new(State::Inactive),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the filtered calls are installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(*self.lock(), State::Active { .. })
    }

    /// Installs the filtered calls.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::AlreadyActive`] if they are already installed.
    pub fn activate(&self) -> Result<()> {
        let mut state = self.lock();
        if matches!(*state, State::Active { .. }) {
            return Err(JailFsError::AlreadyActive);
        }
        let originals = self.table.rebind(|current| {
            let calls = JailCalls::new(Arc::clone(&self.vfs), current.clone(), &self.config);
            Handlers::from_calls(Arc::new(calls))
        });
        *state = State::Active { originals };
        if self.config.announce {
            tracing::info!(version = VERSION, "{APP_NAME} loaded");
        }
        Ok(())
    }

    /// Restores the handlers displaced by [`Interceptor::activate`].
    ///
    /// # Errors
    ///
    /// - [`JailFsError::NotActive`] if the filtered calls are not installed.
    /// - [`JailFsError::Busy`] if calls are still running; the interceptor
    ///   stays active and may be deactivated again later.
    pub fn deactivate(&self) -> Result<()> {
        let mut state = self.lock();
        let State::Active { originals } = &*state else {
            return Err(JailFsError::NotActive);
        };
        let _filtered = self.table.rebind_idle(originals.clone())?;
        *state = State::Inactive;
        tracing::info!("{APP_NAME} unloaded");
        Ok(())
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.deactivate() {
                tracing::warn!(error = %e, "filtered calls left installed");
            }
        }
    }
}
