//! Jail-aware filtering of filesystem statistics.
//!
//! - [`resolver`]: rebuilds a jail's root path from the directory-entry cache.
//! - [`filter`]: decides mount visibility and rewrites mount paths.
//! - [`lookup`]: finds the mount a jail's root lives on.
//! - [`calls`]: the filtered calls built from the three above.

pub mod calls;
pub mod filter;
pub mod lookup;
pub mod resolver;

pub use self::calls::JailCalls;
pub use self::filter::{Visibility, filter_path};
pub use self::resolver::confinement_root;
