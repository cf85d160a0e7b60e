//! Mode orchestration.
//!
//! Each mode is a fixed sequence of steps. A pending interrupt is checked
//! between steps and stops the run there.
use crate::bundle::{self, AcquiredBundle};
use crate::clean::{self, CleanReport, RemovalOutcome, TeardownOutcome};
use crate::compose::{ComposeBackend, ComposeCommand};
use crate::doctor::{self, DoctorReport};
use crate::edition::Edition;
use crate::envfile::EnvironmentConfig;
use crate::interrupt::checkpoint;
use crate::launch::{self, LaunchOutcome, LaunchPolicy};
use crate::layout::{WorkspaceLayout, MANAGED_SYMLINKS};
use crate::links::{self, LinkOutcome};
use crate::materialize::{materialize, write_merged};
use crate::secrets::{secret_keys, SecretSource};
use crate::util::display_path;
use crate::workspace::{self, WorkspaceState};
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

/// Everything a prepare run talks to besides the filesystem.
pub struct Session<'a> {
    pub layout: &'a WorkspaceLayout,
    pub compose: &'a dyn ComposeBackend,
    pub secrets: &'a mut dyn SecretSource,
    pub input: &'a mut dyn BufRead,
    pub output: &'a mut dyn Write,
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub salt_version: String,
    pub launch: LaunchPolicy,
}

#[derive(Debug)]
pub struct PrepareReport {
    pub edition: Edition,
    pub clean: CleanReport,
    pub bundle: Option<AcquiredBundle>,
    pub config: EnvironmentConfig,
    pub links: Vec<(&'static str, LinkOutcome)>,
    pub launch: LaunchOutcome,
}

impl PrepareReport {
    /// Short closing summary printed after the configuration.
    pub fn render_summary(&self, layout: &WorkspaceLayout) -> String {
        let mut out = format!(
            "{} workspace ready ({} stale path(s) removed)\n",
            self.edition,
            self.clean.removed()
        );
        if let Some(bundle) = &self.bundle {
            out.push_str(&format!(
                "  bundle   {} ({} entries, {} tree(s) relocated)\n",
                display_path(&bundle.archive, Some(layout.root())),
                bundle.entries,
                bundle.relocated.len()
            ));
        }
        out.push_str(&format!(
            "  env      {} ({} key(s))\n",
            display_path(&layout.env_file_path(), Some(layout.root())),
            self.config.len()
        ));
        for (rel, outcome) in &self.links {
            let line = match outcome {
                LinkOutcome::Created { target } => format!(
                    "  linked   {rel} -> {}\n",
                    display_path(target, Some(layout.root()))
                ),
                LinkOutcome::AlreadyPresent { current } => {
                    format!("  kept     {rel} (existing {})\n", current.label())
                }
            };
            out.push_str(&line);
        }
        let launch = match &self.launch {
            LaunchOutcome::Skipped => "not started".to_string(),
            LaunchOutcome::Succeeded => "started".to_string(),
            LaunchOutcome::Failed { detail } => format!("failed to start ({detail})"),
        };
        out.push_str(&format!("  compose  {launch}\n"));
        out
    }
}

/// Clean-only mode. Fails when any managed path could not be removed.
pub fn run_clean(
    layout: &WorkspaceLayout,
    compose: &dyn ComposeBackend,
    output: &mut dyn Write,
) -> Result<CleanReport> {
    let report = clean::clean(layout, compose)?;
    write_clean_summary(output, &report)?;
    if report.has_failures() {
        return Err(anyhow!("cleanup could not remove every managed path"));
    }
    Ok(report)
}

fn write_clean_summary(output: &mut dyn Write, report: &CleanReport) -> Result<()> {
    match &report.teardown {
        TeardownOutcome::Skipped => Ok(()),
        TeardownOutcome::Succeeded => writeln!(output, "compose environment torn down"),
        TeardownOutcome::Failed { detail } => {
            writeln!(output, "compose teardown failed ({detail}), continued cleanup")
        }
    }
    .context("write summary")?;
    writeln!(output, "removed {} managed path(s)", report.removed()).context("write summary")?;
    for entry in &report.paths {
        match &entry.outcome {
            RemovalOutcome::Drift { found } => {
                writeln!(output, "  left {} in place (found {found})", entry.path)
            }
            RemovalOutcome::RemovalFailed { error } => {
                writeln!(output, "  could not remove {}: {error}", entry.path)
            }
            _ => Ok(()),
        }
        .context("write summary")?;
    }
    Ok(())
}

/// OSS and enterprise modes.
pub fn prepare(
    edition: Edition,
    options: &PrepareOptions,
    session: &mut Session<'_>,
) -> Result<PrepareReport> {
    let layout = session.layout;
    tracing::info!(%edition, salt_version = %options.salt_version, "preparing workspace");

    let clean = clean::clean(layout, session.compose)?;
    if clean.has_failures() {
        tracing::warn!("cleanup left some managed paths in place, continuing");
    }
    checkpoint()?;

    let bundle = if edition.profile().requires_bundle {
        let acquired = bundle::acquire(layout)?;
        checkpoint()?;
        Some(acquired)
    } else {
        None
    };

    let fresh = materialize(edition, &options.salt_version, layout, &mut *session.secrets)?;
    checkpoint()?;
    let config = write_merged(layout, &fresh)?;
    checkpoint()?;

    let mut linked = Vec::new();
    for managed in MANAGED_SYMLINKS {
        let outcome = links::link(layout, &managed, edition)?;
        linked.push((managed.rel, outcome));
    }
    checkpoint()?;

    display_config(&mut *session.output, layout, &config)?;
    let tool = session.compose.describe(&[]);
    let decision = launch::decide(
        options.launch,
        tool.trim_end(),
        &mut *session.input,
        &mut *session.output,
    )?;
    checkpoint()?;
    let launch = launch::run(decision, session.compose, layout.root());

    tracing::info!(%edition, "workspace prepared");
    Ok(PrepareReport {
        edition,
        clean,
        bundle,
        config,
        links: linked,
        launch,
    })
}

/// Print the merged configuration with credentials masked.
pub fn display_config(
    output: &mut dyn Write,
    layout: &WorkspaceLayout,
    config: &EnvironmentConfig,
) -> Result<()> {
    let path = layout.env_file_path();
    writeln!(
        output,
        "Generated {}:",
        display_path(&path, Some(layout.root()))
    )
    .context("write configuration")?;
    if config.is_empty() {
        writeln!(output, "(empty)").context("write configuration")?;
    } else {
        output
            .write_all(config.render_redacted(&secret_keys()).as_bytes())
            .context("write configuration")?;
    }
    output.flush().context("flush configuration")?;
    Ok(())
}

/// Doctor mode: report only, never mutate.
pub fn run_doctor(
    compose: &ComposeCommand,
    cwd: &Path,
    json: bool,
    output: &mut dyn Write,
) -> Result<DoctorReport> {
    let report = doctor::check(compose, cwd);
    if json {
        let text = serde_json::to_string_pretty(&report).context("serialize doctor report")?;
        writeln!(output, "{text}").context("write doctor report")?;
    } else {
        output
            .write_all(report.render().as_bytes())
            .context("write doctor report")?;
    }
    Ok(report)
}

/// Status mode: scan and print the managed paths.
pub fn run_status(
    layout: &WorkspaceLayout,
    json: bool,
    output: &mut dyn Write,
) -> Result<WorkspaceState> {
    let state = workspace::scan(layout)?;
    for entry in state.dangling_links() {
        tracing::warn!(path = entry.path, "{} does not resolve", entry.name);
    }
    for entry in state.drifted() {
        tracing::warn!(path = entry.path, found = entry.found.label(), "{} has drifted", entry.name);
    }
    if json {
        let text = serde_json::to_string_pretty(&state).context("serialize workspace state")?;
        writeln!(output, "{text}").context("write workspace state")?;
    } else {
        output
            .write_all(workspace::render_state(&state).as_bytes())
            .context("write workspace state")?;
    }
    Ok(state)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
