//! The optional bring-up step after a successful prepare.
use crate::compose::{ComposeBackend, ToolStatus, LAUNCH_ARGS};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

/// Question asked before bringing the environment up with `tool`.
pub fn launch_prompt(tool: &str) -> String {
    format!("Do you wish to run {tool}? (y/n): ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPolicy {
    Interactive,
    NonInteractive { auto_confirm: bool },
}

impl LaunchPolicy {
    pub fn is_interactive(self) -> bool {
        matches!(self, LaunchPolicy::Interactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDecision {
    Launch,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Skipped,
    Succeeded,
    Failed { detail: String },
}

/// Decide whether to launch.
///
/// Interactive runs prompt until a yes/no answer arrives; end of input
/// counts as "no". `tool` names the orchestration command in the prompt.
pub fn decide(
    policy: LaunchPolicy,
    tool: &str,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<LaunchDecision> {
    let LaunchPolicy::NonInteractive { auto_confirm } = policy else {
        return prompt(&launch_prompt(tool), input, output);
    };
    let decision = if auto_confirm {
        LaunchDecision::Launch
    } else {
        LaunchDecision::Skip
    };
    tracing::debug!(?decision, "non-interactive launch decision");
    Ok(decision)
}

fn prompt(question: &str, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<LaunchDecision> {
    loop {
        output
            .write_all(question.as_bytes())
            .context("write launch prompt")?;
        output.flush().context("flush launch prompt")?;

        let mut answer = String::new();
        if input.read_line(&mut answer).context("read launch answer")? == 0 {
            writeln!(output).context("write launch prompt")?;
            tracing::info!("no answer to launch prompt, not launching");
            return Ok(LaunchDecision::Skip);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(LaunchDecision::Launch),
            "n" | "no" => return Ok(LaunchDecision::Skip),
            other => tracing::debug!(answer = other, "unrecognized launch answer"),
        }
    }
}

/// Run `compose up -d` when asked to. Failure is reported, never fatal.
pub fn run(decision: LaunchDecision, compose: &dyn ComposeBackend, cwd: &Path) -> LaunchOutcome {
    if decision == LaunchDecision::Skip {
        tracing::info!("skipping compose launch");
        return LaunchOutcome::Skipped;
    }
    let command_line = compose.describe(&LAUNCH_ARGS);
    match compose.run(&LAUNCH_ARGS, cwd) {
        Ok(ToolStatus::Exited(Some(0))) => {
            tracing::info!(command = %command_line, "compose environment started");
            LaunchOutcome::Succeeded
        }
        Ok(status) => {
            tracing::warn!(command = %command_line, %status, "compose launch failed");
            LaunchOutcome::Failed {
                detail: status.to_string(),
            }
        }
        Err(err) => {
            tracing::warn!(command = %command_line, error = %format!("{err:#}"), "compose launch could not run");
            LaunchOutcome::Failed {
                detail: format!("{err:#}"),
            }
        }
    }
}
