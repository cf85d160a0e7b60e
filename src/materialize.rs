//! Edition-specific environment configuration.
//!
//! `materialize` computes the values owned by this run; `write_merged`
//! overlays them onto whatever `.env` already holds and swaps the result in.
use crate::edition::Edition;
use crate::envfile::{self, EnvironmentConfig};
use crate::layout::WorkspaceLayout;
use crate::secrets::{self, SecretSource};
use crate::util::{file_name_str, matching_files};
use anyhow::{anyhow, Result};

pub const DEFAULT_SALT_VERSION: &str = "3006.9";
pub const SALT_VERSION_KEY: &str = "SALT_VERSION";
pub const POSTGRES_USER_KEY: &str = "POSTGRES_USER";
pub const POSTGRES_USER: &str = "salteapi";

const PUBLIC_FILE_MODE: u32 = 0o644;
const SECRET_FILE_MODE: u32 = 0o600;

/// Compute the fresh values for `edition`.
///
/// Artifact discovery and credential collection both happen here, so any
/// failure surfaces before the environment file is touched.
pub fn materialize(
    edition: Edition,
    salt_version: &str,
    layout: &WorkspaceLayout,
    secrets: &mut dyn SecretSource,
) -> Result<EnvironmentConfig> {
    let salt_version = salt_version.trim();
    if salt_version.is_empty() {
        return Err(anyhow!("salt version must not be empty"));
    }
    let mut fresh = EnvironmentConfig::new();
    fresh.set(SALT_VERSION_KEY, salt_version)?;

    let profile = edition.profile();
    for artifact in profile.artifacts {
        let dir = layout.join(artifact.dir_rel);
        let files = matching_files(&dir, artifact.pattern)?;
        let Some(chosen) = files.first() else {
            return Err(anyhow!(
                "required package {} not found in {}",
                artifact.pattern,
                dir.display()
            ));
        };
        let name = file_name_str(chosen)?;
        if files.len() > 1 {
            tracing::warn!(key = artifact.key, chosen = name, candidates = files.len(), "multiple packages match, using the first");
        }
        fresh.set(artifact.key, name)?;
    }

    if profile.requires_secrets {
        fresh.set(POSTGRES_USER_KEY, POSTGRES_USER)?;
        for (field, secret) in secrets::resolve(secrets)? {
            fresh.set(field.key(), secret.expose())?;
        }
    }

    tracing::debug!(%edition, keys = fresh.len(), "configuration computed");
    Ok(fresh)
}

/// Merge `fresh` into the persisted file and write it back atomically.
///
/// Returns the full merged configuration as written.
pub fn write_merged(
    layout: &WorkspaceLayout,
    fresh: &EnvironmentConfig,
) -> Result<EnvironmentConfig> {
    let path = layout.env_file_path();
    let mut merged = envfile::load(&path)?;
    let preserved = merged.len();
    merged.overlay(fresh);

    let holds_secrets = secrets::secret_keys()
        .iter()
        .any(|key| merged.contains_key(key));
    let mode = if holds_secrets {
        SECRET_FILE_MODE
    } else {
        PUBLIC_FILE_MODE
    };
    envfile::write_atomic(&path, &merged, mode)?;
    tracing::info!(
        path = %path.display(),
        keys = merged.len(),
        preserved,
        "environment file written"
    );
    Ok(merged)
}
