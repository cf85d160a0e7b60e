//! Filesystem-derived workspace state.
//!
//! Nothing about the workspace is remembered between runs; each decision is
//! made against a fresh scan.
use crate::layout::{managed_paths, ManagedKind, WorkspaceLayout};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What currently occupies a path on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Presence {
    Absent,
    Directory,
    File,
    Symlink {
        target: PathBuf,
        resolves: bool,
    },
    Other,
}

impl Presence {
    pub fn is_absent(&self) -> bool {
        matches!(self, Presence::Absent)
    }

    /// Whether the occupant is the kind of object the registry expects.
    pub fn matches_kind(&self, kind: ManagedKind) -> bool {
        matches!(
            (self, kind),
            (Presence::Directory, ManagedKind::Directory)
                | (Presence::File, ManagedKind::File)
                | (Presence::Symlink { .. }, ManagedKind::Symlink)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Presence::Absent => "absent",
            Presence::Directory => "directory",
            Presence::File => "file",
            Presence::Symlink { .. } => "symlink",
            Presence::Other => "other",
        }
    }
}

/// Inspect a path without following a final symlink.
pub fn probe(path: &Path) -> Result<Presence> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Presence::Absent),
        Err(err) => return Err(err).with_context(|| format!("inspect {}", path.display())),
    };
    let file_type = meta.file_type();
    if file_type.is_symlink() {
        let target = fs::read_link(path).with_context(|| format!("read {}", path.display()))?;
        return Ok(Presence::Symlink {
            target,
            resolves: path.exists(),
        });
    }
    if file_type.is_dir() {
        return Ok(Presence::Directory);
    }
    if file_type.is_file() {
        return Ok(Presence::File);
    }
    Ok(Presence::Other)
}

/// One managed path and what was found there.
#[derive(Debug, Clone, Serialize)]
pub struct PathState {
    pub name: &'static str,
    pub path: &'static str,
    pub expected: ManagedKind,
    pub found: Presence,
}

impl PathState {
    /// Present, but not as the expected kind of object.
    pub fn is_drift(&self) -> bool {
        !self.found.is_absent() && !self.found.matches_kind(self.expected)
    }
}

/// Snapshot of every managed path.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceState {
    pub root: PathBuf,
    pub paths: Vec<PathState>,
}

impl WorkspaceState {
    /// True when no managed path exists.
    #[cfg(test)]
    pub fn is_clean(&self) -> bool {
        self.paths.iter().all(|state| state.found.is_absent())
    }

    pub fn dangling_links(&self) -> impl Iterator<Item = &PathState> {
        self.paths.iter().filter(|state| {
            matches!(
                state.found,
                Presence::Symlink {
                    resolves: false,
                    ..
                }
            )
        })
    }

    pub fn drifted(&self) -> impl Iterator<Item = &PathState> {
        self.paths.iter().filter(|state| state.is_drift())
    }
}

pub fn scan(layout: &WorkspaceLayout) -> Result<WorkspaceState> {
    let mut paths = Vec::new();
    for managed in managed_paths() {
        let found = probe(&layout.managed(&managed))?;
        paths.push(PathState {
            name: managed.name,
            path: managed.rel,
            expected: managed.kind,
            found,
        });
    }
    Ok(WorkspaceState {
        root: layout.root().to_path_buf(),
        paths,
    })
}

/// Render a scan as an aligned text table.
pub fn render_state(state: &WorkspaceState) -> String {
    let width = state
        .paths
        .iter()
        .map(|entry| entry.path.len())
        .max()
        .unwrap_or(0);
    let mut out = format!("workspace: {}\n", state.root.display());
    for entry in &state.paths {
        let detail = match &entry.found {
            Presence::Symlink { target, resolves } => {
                let suffix = if *resolves { "" } else { " (dangling)" };
                format!("symlink -> {}{suffix}", target.display())
            }
            other => other.label().to_string(),
        };
        let marker = if entry.is_drift() { "  [drift]" } else { "" };
        out.push_str(&format!("  {:<width$}  {detail}{marker}\n", entry.path));
    }
    out
}
