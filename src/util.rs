use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Regular files directly inside `dir` whose names match the glob `pattern`,
/// sorted by file name.
///
/// A missing directory yields no matches.
pub fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| anyhow!("directory {} is not valid UTF-8", dir.display()))?;
    let full = format!("{}/{pattern}", glob::Pattern::escape(dir_str));
    let mut files = Vec::new();
    for entry in glob::glob(&full).with_context(|| format!("invalid file pattern {pattern:?}"))? {
        let path = entry.with_context(|| format!("read {}", dir.display()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// File name of `path` as UTF-8, for recording in configuration values.
pub fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no UTF-8 file name", path.display()))
}
