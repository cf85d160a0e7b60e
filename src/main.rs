mod bundle;
mod clean;
mod cli;
mod compose;
mod doctor;
mod edition;
mod envfile;
mod interrupt;
mod launch;
mod layout;
mod links;
mod logging;
mod materialize;
mod pipeline;
mod secrets;
mod util;
mod workspace;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Command, PrepareArgs, RootArgs};
use compose::ComposeCommand;
use edition::Edition;
use interrupt::{Interrupted, INTERRUPTED_EXIT_CODE};
use layout::WorkspaceLayout;
use pipeline::{PrepareOptions, Session};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.chain().any(|cause| cause.is::<Interrupted>()) => {
            eprintln!("saltprep: interrupted");
            ExitCode::from(INTERRUPTED_EXIT_CODE as u8)
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: RootArgs) -> Result<()> {
    logging::init(&args.log_level, args.log_file.as_deref())?;
    interrupt::install()?;

    let root = args
        .workspace
        .canonicalize()
        .with_context(|| format!("resolve workspace {}", args.workspace.display()))?;
    let layout = WorkspaceLayout::new(root);
    let compose = ComposeCommand::parse(
        &args.compose_command,
        args.tool_timeout.map(Duration::from_secs),
    )?;
    tracing::debug!(workspace = %layout.root().display(), command = ?args.command, "starting");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Doctor(report) => {
            pipeline::run_doctor(&compose, layout.root(), report.json, &mut out)?.ensure_ready()
        }
        Command::Status(report) => {
            pipeline::run_status(&layout, report.json, &mut out)?;
            Ok(())
        }
        Command::Clean => {
            ensure_tooling(&compose, &layout)?;
            pipeline::run_clean(&layout, &compose, &mut out)?;
            Ok(())
        }
        Command::Oss(prepare) => {
            run_prepare(Edition::OpenSource, prepare, &layout, &compose, &mut out)
        }
        Command::Enterprise(prepare) => {
            run_prepare(Edition::Enterprise, prepare, &layout, &compose, &mut out)
        }
    }
}

/// Mutating modes refuse to start without a working orchestration tool.
fn ensure_tooling(compose: &ComposeCommand, layout: &WorkspaceLayout) -> Result<()> {
    doctor::check(compose, layout.root()).ensure_ready()
}

fn run_prepare(
    edition: Edition,
    args: PrepareArgs,
    layout: &WorkspaceLayout,
    compose: &ComposeCommand,
    out: &mut dyn Write,
) -> Result<()> {
    ensure_tooling(compose, layout)?;
    let launch = args.launch_policy();
    let mut secrets = secrets::default_source(launch.is_interactive())?;
    let options = PrepareOptions {
        salt_version: args.salt_version,
        launch,
    };
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let report = {
        let mut session = Session {
            layout,
            compose,
            secrets: secrets.as_mut(),
            input: &mut input,
            output: &mut *out,
        };
        pipeline::prepare(edition, &options, &mut session)?
    };
    out.write_all(report.render_summary(layout).as_bytes())
        .context("write summary")?;
    Ok(())
}
