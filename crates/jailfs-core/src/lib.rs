//! # jailfs-core
//!
//! Jail-aware filesystem statistics for processes confined to a
//! subtree of the global namespace.
//!
//! This crate provides:
//! - **VFS model**: directory-entry cache, mount collection, path lookup,
//!   and the unfiltered `getfsstat`/`statfs`/`fstatfs` calls.
//! - **Jail filtering**: confinement-root resolution from the cache,
//!   mount visibility and path rewriting, and the filtered calls.
//! - **Dispatch**: the call table and the interceptor that swaps the
//!   filtered calls in and out.
//! - **Topology**: JSON descriptions of a mount layout and its processes.

pub mod dispatch;
pub mod jail;
pub mod topology;
pub mod vfs;
