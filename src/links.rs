//! Edition symlinks.
//!
//! A link is only created when its target exists and nothing occupies the
//! link path. An occupied path is reported and left exactly as found.
use crate::edition::{Edition, EditionProfile};
use crate::layout::{ManagedPath, WorkspaceLayout, COMPOSE_LINK_REL, MASTER_DATA_LINK_REL};
use crate::workspace::{probe, Presence};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Created { target: PathBuf },
    /// Something already occupied the link path; it was not modified.
    AlreadyPresent { current: Presence },
}

/// Workspace-relative target of `managed` for this edition.
pub fn target_rel(profile: &EditionProfile, managed: &ManagedPath) -> Result<&'static str> {
    match managed.rel {
        COMPOSE_LINK_REL => Ok(profile.compose_target_rel),
        MASTER_DATA_LINK_REL => Ok(profile.master_data_target_rel),
        other => Err(anyhow!("{other} is not an edition link")),
    }
}

/// Point `managed` at the target `edition` selects.
pub fn link(
    layout: &WorkspaceLayout,
    managed: &ManagedPath,
    edition: Edition,
) -> Result<LinkOutcome> {
    let target = layout.join(target_rel(edition.profile(), managed)?);
    if !target.exists() {
        return Err(anyhow!(
            "cannot link {}: target {} does not exist",
            managed.rel,
            target.display()
        ));
    }

    let path = layout.managed(managed);
    let current = probe(&path)?;
    if !current.is_absent() {
        report_existing(layout, managed, edition, &target, &current)?;
        return Ok(LinkOutcome::AlreadyPresent { current });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    symlink(&target, &path)
        .with_context(|| format!("link {} -> {}", path.display(), target.display()))?;
    tracing::info!(link = managed.rel, target = %target.display(), "created {}", managed.name);
    Ok(LinkOutcome::Created { target })
}

fn report_existing(
    layout: &WorkspaceLayout,
    managed: &ManagedPath,
    edition: Edition,
    expected: &Path,
    current: &Presence,
) -> Result<()> {
    let Presence::Symlink { target, resolves } = current else {
        tracing::warn!(
            link = managed.rel,
            found = current.label(),
            "{} path is occupied by a {}, not linking",
            managed.name,
            current.label()
        );
        return Ok(());
    };
    let resolved = resolve_link_target(&layout.managed(managed), target);
    tracing::info!(
        link = managed.rel,
        current = %resolved.display(),
        "{} already present",
        managed.name
    );
    let other_edition = edition.other();
    let other = layout.join(target_rel(other_edition.profile(), managed)?);
    if !resolves {
        tracing::warn!(link = managed.rel, current = %resolved.display(), "existing {} is dangling", managed.name);
    } else if same_file(&resolved, &other) {
        tracing::warn!(
            link = managed.rel,
            current = %resolved.display(),
            "existing {} points at the {other_edition} edition; run clean to switch editions",
            managed.name
        );
    } else if !same_file(&resolved, expected) {
        tracing::warn!(link = managed.rel, current = %resolved.display(), expected = %expected.display(), "existing {} points elsewhere", managed.name);
    }
    Ok(())
}

/// Make a raw link target absolute relative to the link's directory.
fn resolve_link_target(link: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        return raw.to_path_buf();
    }
    link.parent()
        .map(|parent| parent.join(raw))
        .unwrap_or_else(|| raw.to_path_buf())
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}
