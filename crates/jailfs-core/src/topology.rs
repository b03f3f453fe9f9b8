//! JSON descriptions of a mount layout and the processes that use it.
//!
//! A topology file names the root filesystem, the mounts stacked on it,
//! extra directories, and a set of processes, each optionally confined to
//! a directory. [`Topology::build`] turns it into a populated [`Vfs`] plus
//! one [`Caller`] per process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use jailfs_common::config::JailFsConfig;
use jailfs_common::error::{JailFsError, Result};
use jailfs_common::types::{ConfinementContext, Fd, MountFlags, PrisonId};
use serde::{Deserialize, Serialize};

use crate::vfs::mount::{MountOptions, StaticDriver, Usage};
use crate::vfs::{Caller, Vfs};

/// A filesystem to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemEntry {
    /// Device or source name.
    pub device: String,
    /// Filesystem type name.
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
    /// Raw mount flags.
    #[serde(default)]
    pub flags: MountFlags,
    /// Uid of the mounting user.
    #[serde(default)]
    pub owner: u32,
    /// Usage figures the filesystem reports.
    #[serde(default)]
    pub usage: Usage,
    /// Whether statistics refreshes fail.
    #[serde(default)]
    pub fail_refresh: bool,
}

fn default_fs_type() -> String {
    "ufs".to_owned()
}

impl FilesystemEntry {
    fn options(&self) -> MountOptions {
        let driver = StaticDriver::new(self.usage);
        driver.set_failing(self.fail_refresh);
        MountOptions {
            device: self.device.clone(),
            fs_type: self.fs_type.clone(),
            flags: self.flags,
            owner: self.owner,
            driver: Arc::new(driver),
        }
    }
}

/// A filesystem mounted on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Absolute mount point.
    pub path: String,
    /// What is mounted there.
    #[serde(flatten)]
    pub filesystem: FilesystemEntry,
}

/// A process and its view of the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Process id.
    pub pid: u32,
    /// Directory the process is confined to, as a global path.
    #[serde(default)]
    pub jail: Option<String>,
    /// Prison id; defaults to the process's position in the file.
    #[serde(default)]
    pub prison: Option<u32>,
    /// Working directory, as a global path.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Open descriptors and the global paths they refer to.
    #[serde(default)]
    pub fds: BTreeMap<i32, String>,
}

/// A complete topology file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Interceptor configuration.
    #[serde(default)]
    pub config: JailFsConfig,
    /// The root filesystem.
    pub root: FilesystemEntry,
    /// Mounts, applied in order.
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
    /// Directories created after all mounts.
    #[serde(default)]
    pub directories: Vec<String>,
    /// Processes.
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
}

impl Topology {
    /// Reads a topology from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JailFsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parses a topology from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid topology.
    pub fn parse(content: &str) -> Result<Self> {
        let topology: Self = serde_json::from_str(content)?;
        topology.config.validate()?;
        Ok(topology)
    }

    /// Builds the namespace and its processes.
    ///
    /// # Errors
    ///
    /// Returns an error if a mount, directory, jail, or descriptor path
    /// cannot be created or resolved, or a pid appears twice.
    pub fn build(&self) -> Result<Scenario> {
        let vfs = Arc::new(Vfs::new(self.root.options()));
        let host = Caller::host(0);
        for entry in &self.mounts {
            let _ = vfs.mount(&host, &entry.path, entry.filesystem.options())?;
        }
        for dir in &self.directories {
            let _ = vfs.mkdir_all(&host, dir)?;
        }

        let mut callers = BTreeMap::new();
        for (index, entry) in self.processes.iter().enumerate() {
            let caller = process_caller(&vfs, &host, index, entry)?;
            if callers.insert(entry.pid, caller).is_some() {
                return Err(JailFsError::InvalidArgument {
                    message: format!("pid {} listed twice", entry.pid),
                });
            }
        }
        tracing::debug!(
            mounts = vfs.mounts().len(),
            processes = callers.len(),
            "topology built"
        );
        Ok(Scenario {
            vfs,
            callers,
            config: self.config.clone(),
        })
    }
}

fn process_caller(vfs: &Vfs, host: &Caller, index: usize, entry: &ProcessEntry) -> Result<Caller> {
    let mut caller = match &entry.jail {
        Some(path) => {
            let root = vfs.lookup(host, path)?;
            let prison = entry
                .prison
                .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX));
            Caller::confined(
                entry.pid,
                ConfinementContext {
                    prison: PrisonId(prison),
                    root: Some(root),
                },
            )
        }
        None => Caller::host(entry.pid),
    };
    if let Some(cwd) = &entry.cwd {
        caller = caller.with_cwd(vfs.lookup(host, cwd)?);
    }
    for (fd, path) in &entry.fds {
        caller = caller.with_fd(Fd(*fd), vfs.lookup(host, path)?);
    }
    Ok(caller)
}

/// A built topology.
#[derive(Debug)]
pub struct Scenario {
    /// The populated namespace.
    pub vfs: Arc<Vfs>,
    /// Processes by pid.
    pub callers: BTreeMap<u32, Caller>,
    /// Interceptor configuration.
    pub config: JailFsConfig,
}

impl Scenario {
    /// The process with the given pid.
    ///
    /// # Errors
    ///
    /// Returns [`JailFsError::NotFound`] if no such process is listed.
    pub fn caller(&self, pid: u32) -> Result<Caller> {
        self.callers
            .get(&pid)
            .cloned()
            .ok_or_else(|| JailFsError::NotFound {
                kind: "process",
                id: pid.to_string(),
            })
    }
}
