//! Typed paths into a deployment workspace.
//!
//! Every path the pipeline creates or removes is registered here, so the
//! cleaner, the link manager and the status scan agree on one layout.
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Active compose descriptor consumed by the orchestration tool.
pub const COMPOSE_LINK_REL: &str = "compose.yaml";
/// Active master configuration directory mounted into the salt master.
pub const MASTER_DATA_LINK_REL: &str = "data/master.d";
/// Persisted key/value configuration read by the orchestration tool.
pub const ENV_FILE_REL: &str = ".env";
/// Scratch tree the installer bundle is unpacked into.
pub const SCRATCH_DIR_REL: &str = "build";
/// Installer tree produced by unpacking the bundle.
pub const INSTALLER_TREE_REL: &str = "build/sse-installer";
/// Relocation destination for the RaaS service installer.
pub const EAPI_SERVICE_DEST_REL: &str = "build/raas/eapi_service";
/// Relocation destination for the master plugin installer.
pub const EAPI_PLUGIN_DEST_REL: &str = "build/salt-master/eapi_plugin";

/// Kind of filesystem object a managed path is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedKind {
    Directory,
    File,
    Symlink,
}

/// A path whose whole lifecycle belongs to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedPath {
    pub kind: ManagedKind,
    pub name: &'static str,
    pub rel: &'static str,
}

impl ManagedPath {
    const fn dir(name: &'static str, rel: &'static str) -> Self {
        Self {
            kind: ManagedKind::Directory,
            name,
            rel,
        }
    }

    const fn file(name: &'static str, rel: &'static str) -> Self {
        Self {
            kind: ManagedKind::File,
            name,
            rel,
        }
    }

    const fn symlink(name: &'static str, rel: &'static str) -> Self {
        Self {
            kind: ManagedKind::Symlink,
            name,
            rel,
        }
    }
}

pub const MANAGED_DIRECTORIES: [ManagedPath; 7] = [
    ManagedPath::dir("installer tree", INSTALLER_TREE_REL),
    ManagedPath::dir("raas service installer", EAPI_SERVICE_DEST_REL),
    ManagedPath::dir("master plugin installer", EAPI_PLUGIN_DEST_REL),
    ManagedPath::dir("postgres data", "data/postgres"),
    ManagedPath::dir("raas pki", "data/raas/pki"),
    ManagedPath::dir("master pki", "data/master/pki"),
    ManagedPath::dir("redis data", "data/redis"),
];

pub const MANAGED_FILES: [ManagedPath; 4] = [
    ManagedPath::file("environment file", ENV_FILE_REL),
    ManagedPath::file("raas secure config", "data/raas/raas.secconf"),
    ManagedPath::file("raas init marker", "data/raas/initialized"),
    ManagedPath::file("redis config", "data/redis/redis.conf"),
];

pub const COMPOSE_LINK: ManagedPath =
    ManagedPath::symlink("compose descriptor", COMPOSE_LINK_REL);
pub const MASTER_DATA_LINK: ManagedPath =
    ManagedPath::symlink("master data directory", MASTER_DATA_LINK_REL);

pub const MANAGED_SYMLINKS: [ManagedPath; 2] = [COMPOSE_LINK, MASTER_DATA_LINK];

/// Every managed path in removal order: directories, files, then symlinks.
pub fn managed_paths() -> impl Iterator<Item = ManagedPath> {
    MANAGED_DIRECTORIES
        .into_iter()
        .chain(MANAGED_FILES)
        .chain(MANAGED_SYMLINKS)
}

/// Convenience wrapper for locating workspace artifacts.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Create a layout rooted at an (ideally absolute) workspace directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the workspace root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path.
    pub fn join(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Resolve a managed path.
    pub fn managed(&self, managed: &ManagedPath) -> PathBuf {
        self.join(managed.rel)
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.join(ENV_FILE_REL)
    }

    pub fn compose_link_path(&self) -> PathBuf {
        self.join(COMPOSE_LINK_REL)
    }

    /// Return the `build/` scratch directory path.
    pub fn scratch_dir(&self) -> PathBuf {
        self.join(SCRATCH_DIR_REL)
    }
}
