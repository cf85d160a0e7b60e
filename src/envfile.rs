//! `KEY=VALUE` environment file model and persistence.
//!
//! Keys are case-sensitive and unique, values run verbatim to the end of the
//! line, and the last occurrence of a key wins on load. Writes are staged
//! next to the destination and renamed into place.
use crate::interrupt::CriticalSection;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub const REDACTED: &str = "********";

/// Insertion-ordered key/value map with last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentConfig {
    entries: Vec<(String, String)>,
}

impl EnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file contents. Lines without `=` and lines with an empty key
    /// are ignored.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::new();
        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            config.upsert(key.to_string(), value.to_string());
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, replacing the value in place when the key already exists.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        if value.contains(['\n', '\r']) {
            return Err(anyhow!("value for {key} must be a single line"));
        }
        self.upsert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Overlay `fresh` onto `self`: fresh values win, existing keys keep
    /// their position and new keys are appended in `fresh` order.
    pub fn overlay(&mut self, fresh: &EnvironmentConfig) {
        for (key, value) in &fresh.entries {
            self.upsert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as one `KEY=VALUE` line per entry.
    pub fn render(&self) -> String {
        self.render_with(|_| false)
    }

    /// Serialize with the values of `secret_keys` masked, for display.
    pub fn render_redacted(&self, secret_keys: &[&str]) -> String {
        self.render_with(|key| secret_keys.contains(&key))
    }

    fn render_with(&self, is_secret: impl Fn(&str) -> bool) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let shown = if is_secret(key) { REDACTED } else { value };
            out.push_str(key);
            out.push('=');
            out.push_str(shown);
            out.push('\n');
        }
        out
    }

    fn upsert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.trim() != key || key.contains(['=', '\n', '\r']) {
        return Err(anyhow!("invalid environment key {key:?}"));
    }
    Ok(())
}

/// Load a persisted file; a missing file is an empty config.
pub fn load(path: &Path) -> Result<EnvironmentConfig> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(EnvironmentConfig::parse(&text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(EnvironmentConfig::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Replace `path` with `config` atomically, with the given unix mode.
///
/// The contents are written and synced to a temporary file in the same
/// directory, then renamed over the destination. A failure at any point
/// leaves the previous file untouched.
pub fn write_atomic(path: &Path, config: &EnvironmentConfig, mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let _guard = CriticalSection::enter();
    let mut staged = tempfile::Builder::new()
        .prefix(".env.")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("stage {}", path.display()))?;
    staged
        .write_all(config.render().as_bytes())
        .with_context(|| format!("write staged {}", path.display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("sync staged {}", path.display()))?;
    staged
        .as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on staged {}", path.display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
