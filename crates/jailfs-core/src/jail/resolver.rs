//! Confinement-root resolution.
//!
//! Rebuilds the absolute path of a jail's root directory by walking the
//! directory-entry cache from that directory up to the global root. Mount
//! roots are stepped over to the directory they cover without contributing
//! a segment. The path is collected segment by segment and joined once.

use jailfs_common::constants::{MAX_MOUNT_CROSSINGS, MAX_PATH_LEN};
use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{ConfinementContext, DirId};

use crate::vfs::dcache::{Boundary, DirectoryEntryCache};

/// Walks from a directory toward the global root, yielding name segments
/// child-first.
///
/// Stops for good after the first error.
pub struct AncestorWalk<'a> {
    cache: &'a dyn DirectoryEntryCache,
    current: Option<DirId>,
    crossings: usize,
}

impl<'a> AncestorWalk<'a> {
    /// Starts a walk at `dir`.
    #[must_use]
    pub fn new(cache: &'a dyn DirectoryEntryCache, dir: DirId) -> Self {
        Self {
            cache,
            current: Some(dir),
            crossings: 0,
        }
    }

    fn step(&mut self, dir: DirId) -> Result<String> {
        let link = self.cache.parent_link(dir).ok_or_else(|| cache_miss(dir))?;
        if self.cache.generation(link.parent) != Some(link.parent_id) {
            return Err(JailFsError::NotADirectory { dir });
        }
        let entry = self.cache.name_entry(dir).ok_or_else(|| cache_miss(dir))?;
        if entry.parent != link.parent {
            return Err(JailFsError::StaleResource {
                message: format!("cache entry for {dir} names a different parent"),
            });
        }
        self.current = Some(link.parent);
        Ok(entry.name)
    }

    fn cross(&mut self, dir: DirId) -> Result<()> {
        match self.cache.boundary(dir) {
            Boundary::Inside => {
                self.crossings = 0;
                Ok(())
            }
            Boundary::Covers(covered) => {
                self.crossings += 1;
                if self.crossings > MAX_MOUNT_CROSSINGS {
                    return Err(JailFsError::StaleResource {
                        message: format!("mount crossings from {dir} do not terminate"),
                    });
                }
                self.current = Some(covered);
                Ok(())
            }
            Boundary::Detached => Err(JailFsError::StaleResource {
                message: format!("mount above {dir} was forcibly unmounted"),
            }),
        }
    }
}

impl Iterator for AncestorWalk<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        loop {
            let dir = self.current.take()?;
            if dir == self.cache.global_root() {
                return None;
            }
            if let Err(e) = self.cross(dir) {
                return Some(Err(e));
            }
            if self.current.is_some() {
                continue;
            }
            return Some(self.step(dir));
        }
    }
}

fn cache_miss(dir: DirId) -> JailFsError {
    JailFsError::NotFound {
        kind: "directory entry",
        id: dir.to_string(),
    }
}

/// Resolves the absolute path of the confinement root in `context`.
///
/// `max_len` is the size of the destination including its terminator and
/// is clamped to [`MAX_PATH_LEN`]; the returned path is at most
/// `max_len - 1` bytes. Without a confinement directory the result is `"/"`.
///
/// # Errors
///
/// - [`JailFsError::InvalidArgument`] if `max_len` cannot hold `"/"`.
/// - [`JailFsError::OutOfSpace`] if the path does not fit.
/// - [`JailFsError::NotADirectory`] if a cached parent link is stale.
/// - [`JailFsError::NotFound`] on a cache miss.
/// - [`JailFsError::StaleResource`] if a mount on the way was detached.
pub fn confinement_root(
    cache: &dyn DirectoryEntryCache,
    context: Option<&ConfinementContext>,
    max_len: usize,
) -> Result<String> {
    if max_len < 2 {
        return Err(JailFsError::InvalidArgument {
            message: format!("path buffer of {max_len} bytes cannot hold \"/\""),
        });
    }
    let limit = max_len.min(MAX_PATH_LEN);
    let Some(start) = context.and_then(|c| c.root) else {
        return Ok("/".to_owned());
    };

    let mut segments = Vec::new();
    let mut used = 0;
    for segment in AncestorWalk::new(cache, start) {
        let segment = segment?;
        used += segment.len() + 1;
        if used > limit - 1 {
            return Err(JailFsError::OutOfSpace { limit });
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        return Ok("/".to_owned());
    }

    let mut path = String::with_capacity(used);
    for segment in segments.iter().rev() {
        path.push('/');
        path.push_str(segment);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use jailfs_common::types::{MountFlags, PrisonId};

    use super::*;
    use crate::vfs::dcache::{NameEntry, ParentLink};
    use crate::vfs::mount::{MountOptions, StaticDriver, Usage};
    use crate::vfs::{Caller, Vfs};

    fn options(device: &str) -> MountOptions {
        MountOptions {
            device: device.into(),
            fs_type: "ufs".into(),
            flags: MountFlags::LOCAL,
            owner: 0,
            driver: Arc::new(StaticDriver::new(Usage::default())),
        }
    }

    fn jailed_at(dir: DirId) -> ConfinementContext {
        ConfinementContext {
            prison: PrisonId(1),
            root: Some(dir),
        }
    }

    #[test]
    fn unconfined_resolves_to_slash() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let root = confinement_root(vfs.dcache(), None, MAX_PATH_LEN).expect("resolve");
        assert_eq!(root, "/");
    }

    #[test]
    fn context_without_directory_resolves_to_slash() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let context = ConfinementContext {
            prison: PrisonId(3),
            root: None,
        };
        let root = confinement_root(vfs.dcache(), Some(&context), MAX_PATH_LEN).expect("resolve");
        assert_eq!(root, "/");
    }

    #[test]
    fn jail_at_global_root_resolves_to_slash() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let context = jailed_at(vfs.global_root());
        let root = confinement_root(vfs.dcache(), Some(&context), MAX_PATH_LEN).expect("resolve");
        assert_eq!(root, "/");
    }

    #[test]
    fn nested_directory_resolves_to_full_path() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let dir = vfs.mkdir_all(&Caller::host(1), "/usr/jails/www").expect("mkdir");
        let root = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect("resolve");
        assert_eq!(root, "/usr/jails/www");
    }

    #[test]
    fn mount_boundaries_add_no_segment() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let _ = vfs.mount(&host, "/usr", options("/dev/ad0s1f")).expect("mount");
        let _ = vfs.mount(&host, "/usr/jails", options("/dev/ad1s1d")).expect("mount");
        let dir = vfs.mkdir_all(&host, "/usr/jails/www").expect("mkdir");

        let root = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect("resolve");
        assert_eq!(root, "/usr/jails/www");
    }

    #[test]
    fn jail_on_mount_root_resolves_to_mount_point() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let mount = vfs.mount(&host, "/jail", options("/dev/md0")).expect("mount");
        let root = confinement_root(vfs.dcache(), Some(&jailed_at(mount.root())), MAX_PATH_LEN)
            .expect("resolve");
        assert_eq!(root, "/jail");
    }

    #[test]
    fn path_filling_the_buffer_exactly_fits() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let dir = vfs.mkdir_all(&Caller::host(1), "/abc/def").expect("mkdir");
        // "/abc/def" is 8 bytes; 9 leaves room for the terminator.
        let root = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), 9).expect("fits");
        assert_eq!(root, "/abc/def");
    }

    #[test]
    fn path_one_byte_too_long_is_out_of_space() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let dir = vfs.mkdir_all(&Caller::host(1), "/abc/def").expect("mkdir");
        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), 8).expect_err("too long");
        assert!(matches!(err, JailFsError::OutOfSpace { limit: 8 }));
    }

    #[test]
    fn oversized_buffer_is_clamped() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let name = "d".repeat(200);
        let path = format!("/{name}/{name}/{name}/{name}/{name}/{name}");
        let dir = vfs.mkdir_all(&Caller::host(1), &path).expect("mkdir");
        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), 1 << 20)
            .expect_err("longer than MAX_PATH_LEN");
        assert!(matches!(err, JailFsError::OutOfSpace { limit: MAX_PATH_LEN }));
    }

    #[test]
    fn tiny_buffer_is_invalid() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let err = confinement_root(vfs.dcache(), None, 1).expect_err("too small");
        assert!(matches!(err, JailFsError::InvalidArgument { .. }));
    }

    #[test]
    fn evicted_entry_is_not_found() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let parent = vfs.mkdir_all(&host, "/jails").expect("mkdir");
        let dir = vfs.mkdir_all(&host, "/jails/db").expect("mkdir");
        vfs.dcache().evict(parent);

        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect_err("cache miss");
        assert!(matches!(err, JailFsError::NotFound { kind: "directory entry", .. }));
    }

    #[test]
    fn recycled_parent_is_not_a_directory() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let parent = vfs.mkdir_all(&host, "/jails").expect("mkdir");
        let dir = vfs.mkdir_all(&host, "/jails/db").expect("mkdir");
        vfs.dcache().recycle(parent);

        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect_err("stale link");
        assert!(matches!(err, JailFsError::NotADirectory { dir: d } if d == dir));
    }

    #[test]
    fn entry_naming_another_parent_is_stale() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let other = vfs.mkdir_all(&host, "/other").expect("mkdir");
        let dir = vfs.mkdir_all(&host, "/jails/db").expect("mkdir");
        vfs.dcache().relink(dir, other, "db");

        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect_err("mismatched entry");
        assert!(matches!(err, JailFsError::StaleResource { .. }));
    }

    #[test]
    fn forced_unmount_above_jail_is_stale() {
        let vfs = Vfs::new(options("/dev/ad0s1a"));
        let host = Caller::host(1);
        let mount = vfs.mount(&host, "/jails", options("/dev/ad1s1d")).expect("mount");
        let dir = vfs.mkdir_all(&host, "/jails/www").expect("mkdir");
        vfs.unmount(mount.id(), true).expect("unmount");

        let err = confinement_root(vfs.dcache(), Some(&jailed_at(dir)), MAX_PATH_LEN)
            .expect_err("detached");
        assert!(matches!(err, JailFsError::StaleResource { .. }));
    }

    /// Cache whose only mount root covers itself.
    struct LoopingCache;

    impl DirectoryEntryCache for LoopingCache {
        fn global_root(&self) -> DirId {
            DirId::new(1)
        }
        fn boundary(&self, dir: DirId) -> Boundary {
            Boundary::Covers(dir)
        }
        fn parent_link(&self, _dir: DirId) -> Option<ParentLink> {
            None
        }
        fn generation(&self, _dir: DirId) -> Option<u64> {
            None
        }
        fn name_entry(&self, _dir: DirId) -> Option<NameEntry> {
            None
        }
    }

    #[test]
    fn self_covering_mount_terminates() {
        let err = confinement_root(&LoopingCache, Some(&jailed_at(DirId::new(2))), MAX_PATH_LEN)
            .expect_err("loop");
        assert!(matches!(err, JailFsError::StaleResource { .. }));
    }

    /// Cache built from a flat (child -> parent, name) table.
    struct TableCache {
        entries: HashMap<u64, (u64, &'static str)>,
    }

    impl DirectoryEntryCache for TableCache {
        fn global_root(&self) -> DirId {
            DirId::new(1)
        }
        fn boundary(&self, _dir: DirId) -> Boundary {
            Boundary::Inside
        }
        fn parent_link(&self, dir: DirId) -> Option<ParentLink> {
            self.entries.get(&dir.get()).map(|(p, _)| ParentLink {
                parent: DirId::new(*p),
                parent_id: 0,
            })
        }
        fn generation(&self, _dir: DirId) -> Option<u64> {
            Some(0)
        }
        fn name_entry(&self, dir: DirId) -> Option<NameEntry> {
            self.entries.get(&dir.get()).map(|(p, n)| NameEntry {
                parent: DirId::new(*p),
                name: (*n).to_owned(),
            })
        }
    }

    #[test]
    fn walk_yields_segments_child_first() {
        let cache = TableCache {
            entries: HashMap::from([(2, (1, "a")), (3, (2, "b")), (4, (3, "c"))]),
        };
        let segments: Vec<String> = AncestorWalk::new(&cache, DirId::new(4))
            .collect::<Result<_>>()
            .expect("walk");
        assert_eq!(segments, vec!["c", "b", "a"]);
    }
}
