//! Directory-entry cache.
//!
//! Maps every directory back to its parent and the name it is cached
//! under. The cache may be incomplete (an entry was evicted) or stale (the
//! parent was recycled after the child recorded its identity); readers must
//! check both.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::DirId;

use super::mount::Mount;

/// Position of a directory relative to the mount it lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// An ordinary directory inside its filesystem.
    Inside,
    /// Root of an attached mount covering the given directory.
    Covers(DirId),
    /// Root of a mount that has been detached.
    Detached,
}

/// A directory's recorded parent and the identity it recorded for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    /// Recorded parent directory.
    pub parent: DirId,
    /// Generation of `parent` when the link was recorded.
    pub parent_id: u64,
}

/// A cached (parent, name) entry pointing at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// Directory containing the name.
    pub parent: DirId,
    /// Name segment.
    pub name: String,
}

/// Read-only view of the cache used by the confinement-root resolver.
pub trait DirectoryEntryCache: Send + Sync {
    /// The global root directory.
    fn global_root(&self) -> DirId;

    /// Where `dir` sits relative to its mount.
    fn boundary(&self, dir: DirId) -> Boundary;

    /// The recorded parent of `dir`, if any.
    fn parent_link(&self, dir: DirId) -> Option<ParentLink>;

    /// Current generation of `dir`, or `None` if it is unknown.
    fn generation(&self, dir: DirId) -> Option<u64>;

    /// The cached name entry for `dir`, or `None` on a cache miss.
    fn name_entry(&self, dir: DirId) -> Option<NameEntry>;
}

#[derive(Debug)]
struct Node {
    parent: Option<ParentLink>,
    generation: u64,
    entry: Option<NameEntry>,
    children: BTreeMap<String, DirId>,
    mount: Option<Arc<Mount>>,
    is_mount_root: bool,
    mounted_here: Option<Arc<Mount>>,
}

impl Node {
    const fn new(parent: Option<ParentLink>, entry: Option<NameEntry>, mount: Option<Arc<Mount>>) -> Self {
        Self {
            parent,
            generation: 1,
            entry,
            children: BTreeMap::new(),
            mount,
            is_mount_root: false,
            mounted_here: None,
        }
    }
}

/// In-memory directory-entry cache.
#[derive(Debug)]
pub struct DirCache {
    nodes: RwLock<HashMap<DirId, Node>>,
    next_id: AtomicU64,
    root: DirId,
}

impl Default for DirCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DirCache {
    /// Creates a cache holding only the global root directory.
    #[must_use]
    pub fn new() -> Self {
        let root = DirId::new(1);
        let mut nodes = HashMap::new();
        let _ = nodes.insert(root, Node::new(None, None, None));
        Self {
            nodes: RwLock::new(nodes),
            next_id: AtomicU64::new(2),
            root,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DirId, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DirId, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn allocate(&self) -> DirId {
        DirId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Creates `name` under `parent`, or returns the existing child.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown or `name` is not a single
    /// path segment.
    pub fn mkdir(&self, parent: DirId, name: &str) -> Result<DirId> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(JailFsError::InvalidArgument {
                message: format!("bad directory name {name:?}"),
            });
        }
        let mut nodes = self.write();
        let parent_node = nodes.get_mut(&parent).ok_or_else(|| unknown(parent))?;
        if let Some(existing) = parent_node.children.get(name) {
            return Ok(*existing);
        }
        let id = self.allocate();
        let _ = parent_node.children.insert(name.to_owned(), id);
        let link = ParentLink {
            parent,
            parent_id: parent_node.generation,
        };
        let mount = parent_node.mount.clone();
        let entry = NameEntry {
            parent,
            name: name.to_owned(),
        };
        let _ = nodes.insert(id, Node::new(Some(link), Some(entry), mount));
        Ok(id)
    }

    /// Registers `mount`'s root directory and, unless it is the root
    /// filesystem, records it as covering its covered directory.
    pub(crate) fn attach(&self, mount: &Arc<Mount>) -> Result<()> {
        let mut nodes = self.write();
        if let Some(covered) = mount.covered() {
            let node = nodes.get_mut(&covered).ok_or_else(|| unknown(covered))?;
            node.mounted_here = Some(Arc::clone(mount));
        }
        let root = nodes
            .entry(mount.root())
            .or_insert_with(|| Node::new(None, None, None));
        root.mount = Some(Arc::clone(mount));
        root.is_mount_root = true;
        Ok(())
    }

    /// Uncovers the directory `mount` was covering.
    pub(crate) fn detach(&self, mount: &Mount) {
        let mut nodes = self.write();
        if let Some(node) = mount.covered().and_then(|c| nodes.get_mut(&c)) {
            if node
                .mounted_here
                .as_ref()
                .is_some_and(|m| m.id() == mount.id())
            {
                node.mounted_here = None;
            }
        }
    }

    /// Child `name` of `dir`, without crossing mounts.
    #[must_use]
    pub fn child(&self, dir: DirId, name: &str) -> Option<DirId> {
        self.read().get(&dir)?.children.get(name).copied()
    }

    /// Mount attached on top of `dir`, if any.
    #[must_use]
    pub fn mounted_here(&self, dir: DirId) -> Option<Arc<Mount>> {
        self.read().get(&dir)?.mounted_here.clone()
    }

    /// Mount whose filesystem contains `dir`.
    #[must_use]
    pub fn mount_of(&self, dir: DirId) -> Option<Arc<Mount>> {
        self.read().get(&dir)?.mount.clone()
    }

    /// Whether `dir` is the root of a mounted filesystem.
    #[must_use]
    pub fn is_mount_root(&self, dir: DirId) -> bool {
        self.read().get(&dir).is_some_and(|n| n.is_mount_root)
    }

    /// Evicts the cached name entry of `dir`.
    pub fn evict(&self, dir: DirId) {
        if let Some(node) = self.write().get_mut(&dir) {
            node.entry = None;
        }
    }

    /// Recycles `dir`, invalidating every link recorded against it.
    pub fn recycle(&self, dir: DirId) {
        if let Some(node) = self.write().get_mut(&dir) {
            node.generation += 1;
        }
    }

    /// Points the cached name entry of `dir` at another parent.
    pub fn relink(&self, dir: DirId, parent: DirId, name: &str) {
        if let Some(node) = self.write().get_mut(&dir) {
            node.entry = Some(NameEntry {
                parent,
                name: name.to_owned(),
            });
        }
    }
}

fn unknown(dir: DirId) -> JailFsError {
    JailFsError::NotFound {
        kind: "directory",
        id: dir.to_string(),
    }
}

impl DirectoryEntryCache for DirCache {
    fn global_root(&self) -> DirId {
        self.root
    }

    fn boundary(&self, dir: DirId) -> Boundary {
        let nodes = self.read();
        let Some(node) = nodes.get(&dir).filter(|n| n.is_mount_root) else {
            return Boundary::Inside;
        };
        match node.mount.as_ref() {
            Some(mount) if !mount.is_detached() => {
                mount.covered().map_or(Boundary::Detached, Boundary::Covers)
            }
            _ => Boundary::Detached,
        }
    }

    fn parent_link(&self, dir: DirId) -> Option<ParentLink> {
        self.read().get(&dir)?.parent
    }

    fn generation(&self, dir: DirId) -> Option<u64> {
        self.read().get(&dir).map(|n| n.generation)
    }

    fn name_entry(&self, dir: DirId) -> Option<NameEntry> {
        self.read().get(&dir)?.entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_records_parent_link_and_name() {
        let cache = DirCache::new();
        let root = cache.global_root();
        let jail = cache.mkdir(root, "jail").expect("mkdir");

        assert_eq!(
            cache.parent_link(jail),
            Some(ParentLink {
                parent: root,
                parent_id: 1
            })
        );
        assert_eq!(
            cache.name_entry(jail).map(|e| e.name),
            Some("jail".to_owned())
        );
        assert_eq!(cache.child(root, "jail"), Some(jail));
    }

    #[test]
    fn mkdir_is_idempotent() {
        let cache = DirCache::new();
        let root = cache.global_root();
        let first = cache.mkdir(root, "usr").expect("mkdir");
        let second = cache.mkdir(root, "usr").expect("mkdir");
        assert_eq!(first, second);
    }

    #[test]
    fn mkdir_rejects_multi_segment_names() {
        let cache = DirCache::new();
        assert!(cache.mkdir(cache.global_root(), "a/b").is_err());
        assert!(cache.mkdir(cache.global_root(), "..").is_err());
    }

    #[test]
    fn recycle_bumps_generation() {
        let cache = DirCache::new();
        let root = cache.global_root();
        let dir = cache.mkdir(root, "var").expect("mkdir");
        cache.recycle(root);
        assert_eq!(cache.generation(root), Some(2));
        assert_eq!(cache.parent_link(dir).map(|l| l.parent_id), Some(1));
    }

    #[test]
    fn evict_leaves_parent_link() {
        let cache = DirCache::new();
        let dir = cache.mkdir(cache.global_root(), "tmp").expect("mkdir");
        cache.evict(dir);
        assert!(cache.name_entry(dir).is_none());
        assert!(cache.parent_link(dir).is_some());
    }

    #[test]
    fn plain_directories_are_inside() {
        let cache = DirCache::new();
        let dir = cache.mkdir(cache.global_root(), "home").expect("mkdir");
        assert_eq!(cache.boundary(dir), Boundary::Inside);
    }
}
