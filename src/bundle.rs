//! Enterprise installer bundle: locate, unpack, relocate.
//!
//! The archive is validated in full before anything is unpacked, so a
//! rejected archive leaves the scratch directory exactly as it was. Members
//! and link targets are resolved lexically and may neither leave the root nor
//! pass through a symlink the archive itself creates.
use crate::layout::WorkspaceLayout;
use crate::util::{display_path, file_name_str, matching_files};
use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use walkdir::WalkDir;

pub const INSTALLER_BUNDLE_PATTERN: &str = "vRA_SaltStack_Config*.tar.gz";

/// A subtree of the unpacked installer and where it is copied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub source_rel: &'static str,
    pub dest_rel: &'static str,
}

/// Paths are relative to the scratch directory / the workspace respectively.
pub const RELOCATIONS: [Relocation; 2] = [
    Relocation {
        source_rel: "sse-installer/salt/sse/eapi_service",
        dest_rel: crate::layout::EAPI_SERVICE_DEST_REL,
    },
    Relocation {
        source_rel: "sse-installer/salt/sse/eapi_plugin",
        dest_rel: crate::layout::EAPI_PLUGIN_DEST_REL,
    },
];

#[derive(Debug, Clone)]
pub struct AcquiredBundle {
    pub archive: PathBuf,
    pub entries: usize,
    pub relocated: Vec<PathBuf>,
}

/// Locate, unpack and relocate the installer bundle for `layout`.
pub fn acquire(layout: &WorkspaceLayout) -> Result<AcquiredBundle> {
    tracing::info!("preparing enterprise bundle");
    let archive = locate(layout.root())?;
    let scratch = layout.scratch_dir();
    let entries = extract(&archive, &scratch)?;
    tracing::info!(
        archive = %display_path(&archive, Some(layout.root())),
        entries,
        "enterprise bundle extracted"
    );
    let mut relocated = Vec::new();
    for relocation in RELOCATIONS {
        let source = scratch.join(relocation.source_rel);
        let dest = layout.join(relocation.dest_rel);
        if !source.is_dir() {
            return Err(anyhow!(
                "bundle shape mismatch: {} has no {} directory",
                archive.display(),
                relocation.source_rel
            ));
        }
        let copied = copy_tree(&source, &dest)?;
        tracing::info!(
            from = relocation.source_rel,
            to = relocation.dest_rel,
            files = copied,
            "installer copied"
        );
        relocated.push(dest);
    }
    Ok(AcquiredBundle {
        archive,
        entries,
        relocated,
    })
}

/// Find the installer archive in `base_dir`.
///
/// Several candidates resolve to the first in lexicographic order.
pub fn locate(base_dir: &Path) -> Result<PathBuf> {
    let candidates = matching_files(base_dir, INSTALLER_BUNDLE_PATTERN)?;
    let Some(chosen) = candidates.first() else {
        return Err(anyhow!(
            "installer bundle not found: no file matching {} in {}",
            INSTALLER_BUNDLE_PATTERN,
            base_dir.display()
        ));
    };
    let chosen_name = file_name_str(chosen)?;
    if candidates.len() > 1 {
        let ignored: Vec<&str> = candidates[1..]
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        tracing::warn!(
            chosen = chosen_name,
            ?ignored,
            "multiple installer bundles found, using the first in sorted order"
        );
    } else {
        tracing::debug!(chosen = chosen_name, "installer bundle located");
    }
    Ok(chosen.clone())
}

/// Unpack a gzip tar into `dest`, rejecting entries that would escape it.
///
/// Returns the number of entries unpacked.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let entries = validate_archive(archive)?;
    fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut tar = open_archive(archive)?;
    let mut unpacked = 0;
    for entry in tar
        .entries()
        .with_context(|| format!("read {}", archive.display()))?
    {
        let mut entry = entry.with_context(|| format!("read entry in {}", archive.display()))?;
        let path = entry
            .path()
            .with_context(|| format!("read entry path in {}", archive.display()))?
            .into_owned();
        let inside = entry
            .unpack_in(dest)
            .with_context(|| format!("extract {} from {}", path.display(), archive.display()))?;
        if !inside {
            return Err(anyhow!(
                "archive entry {} escapes {}",
                path.display(),
                dest.display()
            ));
        }
        unpacked += 1;
    }
    debug_assert_eq!(unpacked, entries);
    Ok(unpacked)
}

fn open_archive(archive: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Read every header and check member and link paths stay relative and
/// inside the extraction root. Also surfaces truncated or corrupt archives.
fn validate_archive(archive: &Path) -> Result<usize> {
    let mut tar = open_archive(archive)?;
    let mut symlinks = BTreeSet::new();
    let mut count = 0;
    for entry in tar
        .entries()
        .with_context(|| format!("read {}", archive.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", archive.display()))?;
        let path = entry
            .path()
            .with_context(|| format!("read entry path in {}", archive.display()))?
            .into_owned();
        let member = resolve_member_path(&path, &symlinks)
            .with_context(|| format!("unsafe archive {}", archive.display()))?;

        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
            let link = entry
                .link_name()
                .with_context(|| format!("read link of {}", path.display()))?
                .ok_or_else(|| anyhow!("link entry {} has no target", path.display()))?
                .into_owned();
            let target = if entry_type == EntryType::Symlink {
                member.parent().unwrap_or_else(|| Path::new("")).join(&link)
            } else {
                link.clone()
            };
            resolve_member_path(&target, &symlinks).with_context(|| {
                format!(
                    "unsafe archive {}: link {} -> {}",
                    archive.display(),
                    path.display(),
                    link.display()
                )
            })?;
            if entry_type == EntryType::Symlink {
                symlinks.insert(member);
            }
        }
        count += 1;
    }
    Ok(count)
}

/// Lexically resolve `path` against the extraction root.
///
/// Rejects absolute paths, paths that climb above the root and paths that
/// descend through one of `symlinks`.
fn resolve_member_path(path: &Path, symlinks: &BTreeSet<PathBuf>) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        if symlinks.contains(&resolved) {
            return Err(anyhow!(
                "entry {} passes through archive symlink {}",
                path.display(),
                resolved.display()
            ));
        }
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(anyhow!(
                        "entry {} escapes the extraction root",
                        path.display()
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("entry {} is not relative", path.display()));
            }
        }
    }
    Ok(resolved)
}

/// Copy a directory tree, merging into `dest` and overwriting files.
///
/// Returns the number of files copied.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut copied = 0;
    // Links are followed and their contents copied; archive validation keeps
    // every link inside the scratch directory.
    for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                tracing::warn!(path = ?err.path(), "skipping dangling link during copy");
                continue;
            }
            Err(err) => return Err(err).with_context(|| format!("walk {}", source.display())),
        };
        let rel = entry
            .path()
            .strip_prefix(source)
            .context("strip source prefix")?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {} to {}", entry.path().display(), target.display()))?;
            copied += 1;
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping special file during copy");
        }
    }
    Ok(copied)
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
