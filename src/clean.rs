//! Workspace cleanup.
//!
//! Cleanup must succeed on any workspace, including an empty or half-built
//! one. Each managed path gets an explicit outcome so callers can tell
//! "removed" from "was never there" from "could not remove".
use crate::compose::{ComposeBackend, ToolStatus, TEARDOWN_ARGS};
use crate::layout::{managed_paths, ManagedKind, ManagedPath, WorkspaceLayout};
use crate::workspace::{probe, Presence};
use anyhow::Result;
use serde::Serialize;
use std::fs;

/// Result of cleaning a single managed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed,
    AlreadyAbsent,
    RemovalFailed { error: String },
    /// The path is occupied by the wrong kind of object and was left alone.
    Drift { found: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PathOutcome {
    pub path: &'static str,
    pub kind: ManagedKind,
    #[serde(flatten)]
    pub outcome: RemovalOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// No active compose descriptor, nothing to tear down.
    Skipped,
    Succeeded,
    Failed { detail: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub teardown: TeardownOutcome,
    pub paths: Vec<PathOutcome>,
}

impl CleanReport {
    pub fn has_failures(&self) -> bool {
        self.paths
            .iter()
            .any(|entry| matches!(entry.outcome, RemovalOutcome::RemovalFailed { .. }))
    }

    pub fn removed(&self) -> usize {
        self.paths
            .iter()
            .filter(|entry| entry.outcome == RemovalOutcome::Removed)
            .count()
    }
}

/// Tear down the running environment and remove every managed path.
pub fn clean(layout: &WorkspaceLayout, compose: &dyn ComposeBackend) -> Result<CleanReport> {
    tracing::info!(workspace = %layout.root().display(), "starting environment cleanup");
    let teardown = teardown(layout, compose);

    let mut paths = Vec::new();
    for managed in managed_paths() {
        let outcome = remove_managed(layout, &managed)?;
        paths.push(PathOutcome {
            path: managed.rel,
            kind: managed.kind,
            outcome,
        });
    }

    let report = CleanReport { teardown, paths };
    tracing::info!(removed = report.removed(), "environment cleanup completed");
    Ok(report)
}

fn teardown(layout: &WorkspaceLayout, compose: &dyn ComposeBackend) -> TeardownOutcome {
    // exists() follows the link: a dangling descriptor has nothing to tear down
    if !layout.compose_link_path().exists() {
        tracing::debug!("no active compose descriptor, skipping teardown");
        return TeardownOutcome::Skipped;
    }
    let command_line = compose.describe(&TEARDOWN_ARGS);
    match compose.run(&TEARDOWN_ARGS, layout.root()) {
        Ok(ToolStatus::Exited(Some(0))) => {
            tracing::info!(command = %command_line, "compose environment torn down");
            TeardownOutcome::Succeeded
        }
        Ok(status) => {
            tracing::warn!(command = %command_line, %status, "compose teardown failed, continuing cleanup");
            TeardownOutcome::Failed {
                detail: status.to_string(),
            }
        }
        Err(err) => {
            tracing::warn!(command = %command_line, error = %format!("{err:#}"), "compose teardown could not run, continuing cleanup");
            TeardownOutcome::Failed {
                detail: format!("{err:#}"),
            }
        }
    }
}

fn remove_managed(layout: &WorkspaceLayout, managed: &ManagedPath) -> Result<RemovalOutcome> {
    let path = layout.managed(managed);
    let found = probe(&path)?;
    if found.is_absent() {
        tracing::debug!(path = managed.rel, "{} does not exist, skipping", managed.name);
        return Ok(RemovalOutcome::AlreadyAbsent);
    }
    if !found.matches_kind(managed.kind) {
        tracing::warn!(
            path = managed.rel,
            found = found.label(),
            "{} is occupied by an unexpected {}, leaving it in place",
            managed.name,
            found.label()
        );
        return Ok(RemovalOutcome::Drift {
            found: found.label().to_string(),
        });
    }

    let result = match found {
        Presence::Directory => fs::remove_dir_all(&path),
        // remove_file unlinks a symlink without touching its target
        _ => fs::remove_file(&path),
    };
    Ok(match result {
        Ok(()) => {
            tracing::info!(path = managed.rel, "removed {}", managed.name);
            RemovalOutcome::Removed
        }
        Err(err) => {
            tracing::error!(path = managed.rel, error = %err, "failed to remove {}", managed.name);
            RemovalOutcome::RemovalFailed {
                error: err.to_string(),
            }
        }
    })
}

#[cfg(test)]
#[path = "clean_tests.rs"]
mod tests;
