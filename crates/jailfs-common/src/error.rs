//! Unified error types for the jailfs workspace.
//!
//! Every variant maps onto the errno the unfiltered calls would report, so a
//! confined caller sees failures in the same error domain as an unconfined one.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::types::DirId;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum JailFsError {
    /// A caller-supplied argument is unusable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// Path reconstruction does not fit in the bounded buffer.
    #[error("path does not fit in {limit} bytes")]
    OutOfSpace {
        /// Buffer size the path had to fit into, terminator included.
        limit: usize,
    },

    /// The directory-entry cache no longer agrees with the directory's parent.
    #[error("directory {dir} is out of sync with its parent")]
    NotADirectory {
        /// Directory whose recorded parent identity is stale.
        dir: DirId,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A mount or cache link vanished while it was being used.
    #[error("stale resource: {message}")]
    StaleResource {
        /// What went stale.
        message: String,
    },

    /// A descriptor is not open in the calling process.
    #[error("bad file descriptor: {fd}")]
    BadDescriptor {
        /// The descriptor number.
        fd: i32,
    },

    /// Writing into caller-owned memory failed.
    #[error("fault copying record into slot {slot}")]
    CopyFault {
        /// Output slot that could not be written.
        slot: usize,
    },

    /// A filesystem driver could not refresh its statistics.
    #[error("statistics refresh failed for {mount}: {message}")]
    RefreshFailed {
        /// Mount-point path of the failing mount.
        mount: String,
        /// Driver-supplied reason.
        message: String,
    },

    /// The interceptor is already installed.
    #[error("filtered calls are already installed")]
    AlreadyActive,

    /// The interceptor is not installed.
    #[error("filtered calls are not installed")]
    NotActive,

    /// Calls are still running through the dispatch table.
    #[error("{in_flight} call(s) still in flight")]
    Busy {
        /// Number of outstanding calls.
        in_flight: usize,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl JailFsError {
    /// Returns the errno an unfiltered call would use for this failure.
    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidArgument { .. }
            | Self::AlreadyActive
            | Self::NotActive
            | Self::Config { .. }
            | Self::Serialization { .. } => Errno::EINVAL,
            Self::OutOfSpace { .. } => Errno::ENOMEM,
            Self::NotADirectory { .. } => Errno::ENOTDIR,
            Self::NotFound { .. } => Errno::ENOENT,
            Self::StaleResource { .. } | Self::BadDescriptor { .. } => Errno::EBADF,
            Self::CopyFault { .. } => Errno::EFAULT,
            Self::RefreshFailed { .. } => Errno::EIO,
            Self::Busy { .. } => Errno::EBUSY,
            Self::Io { source, .. } => source.raw_os_error().map_or(Errno::EIO, Errno::from_raw),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, JailFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_failures_map_to_distinct_errnos() {
        let errors = [
            JailFsError::OutOfSpace { limit: 8 },
            JailFsError::NotADirectory { dir: DirId::new(3) },
            JailFsError::NotFound {
                kind: "directory entry",
                id: "3".into(),
            },
            JailFsError::StaleResource {
                message: "forced unmount".into(),
            },
        ];
        let errnos: Vec<Errno> = errors.iter().map(JailFsError::errno).collect();
        assert_eq!(
            errnos,
            vec![Errno::ENOMEM, Errno::ENOTDIR, Errno::ENOENT, Errno::EBADF]
        );
    }

    #[test]
    fn io_error_keeps_os_errno() {
        let err = JailFsError::Io {
            path: PathBuf::from("/nowhere"),
            source: std::io::Error::from_raw_os_error(Errno::EACCES as i32),
        };
        assert_eq!(err.errno(), Errno::EACCES);
    }

    #[test]
    fn copy_fault_display_names_slot() {
        let err = JailFsError::CopyFault { slot: 2 };
        assert_eq!(err.errno(), Errno::EFAULT);
        assert!(err.to_string().contains("slot 2"));
    }
}
