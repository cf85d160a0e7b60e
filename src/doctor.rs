//! Dependency checks for the orchestration tool.
use crate::compose::{ComposeBackend, ComposeCommand, VERSION_ARGS};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Missing,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<DependencyCheck>,
}

impl DoctorReport {
    pub fn is_ready(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status == CheckStatus::Ok)
    }

    /// Turn the first failing check into a fatal error.
    pub fn ensure_ready(&self) -> Result<()> {
        match self
            .checks
            .iter()
            .find(|check| check.status != CheckStatus::Ok)
        {
            Some(check) => Err(anyhow!(
                "required dependency {} is not usable: {}",
                check.name,
                check.detail
            )),
            None => Ok(()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let status = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Missing => "missing",
                CheckStatus::Failed => "failed",
            };
            out.push_str(&format!("{status:<8} {}  {}\n", check.name, check.detail));
        }
        out
    }
}

/// Confirm the tool binary resolves and its compose subcommand answers.
///
/// The subcommand is only probed once the binary itself was found.
pub fn check(compose: &ComposeCommand, cwd: &Path) -> DoctorReport {
    let mut checks = Vec::new();
    let program = compose.program();
    match which::which(program) {
        Ok(path) => checks.push(DependencyCheck {
            name: program.to_string(),
            status: CheckStatus::Ok,
            detail: path.display().to_string(),
        }),
        Err(err) => {
            checks.push(DependencyCheck {
                name: program.to_string(),
                status: CheckStatus::Missing,
                detail: format!("not found on PATH ({err})"),
            });
            return DoctorReport { checks };
        }
    }

    let quiet = compose.clone().quiet();
    let probe = quiet.describe(&VERSION_ARGS);
    let subcommand = if compose.prefix().is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", compose.prefix().join(" "))
    };
    let subcommand_check = match quiet.run(&VERSION_ARGS, cwd) {
        Ok(status) if status.success() => DependencyCheck {
            name: subcommand,
            status: CheckStatus::Ok,
            detail: format!("`{probe}` succeeded"),
        },
        Ok(status) => DependencyCheck {
            name: subcommand,
            status: CheckStatus::Missing,
            detail: format!("`{probe}` failed with {status}"),
        },
        Err(err) => DependencyCheck {
            name: subcommand,
            status: CheckStatus::Failed,
            detail: format!("`{probe}` could not run: {err:#}"),
        },
    };
    checks.push(subcommand_check);
    let report = DoctorReport { checks };
    tracing::debug!(ready = report.is_ready(), "dependency check finished");
    report
}
