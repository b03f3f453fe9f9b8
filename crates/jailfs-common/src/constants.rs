//! System-wide limits and sizes.

/// Maximum length of a reconstructed path, terminator included.
pub const MAX_PATH_LEN: usize = 1024;

/// Size of the mount-point and device-name fields of a statistics record,
/// terminator included.
pub const MNAMELEN: usize = 80;

/// Size of the filesystem type name field, terminator included.
pub const MFSNAMELEN: usize = 16;

/// Bytes one statistics record occupies in a caller-supplied buffer.
pub const STATFS_RECORD_BYTES: usize = 472;

/// Consecutive mount crossings after which a resolver walk is considered
/// to be looping through a corrupt cache.
pub const MAX_MOUNT_CROSSINGS: usize = 64;

/// Application name used in log output and the activation banner.
pub const APP_NAME: &str = "jailfs";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "jailfs";

/// Version reported in the activation banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
