//! CLI argument parsing for workspace preparation.
//!
//! Every mode shares the global workspace, tool and logging options; only the
//! prepare modes take a version and launch policy.
use crate::compose::DEFAULT_COMPOSE_COMMAND;
use crate::launch::LaunchPolicy;
use crate::materialize::DEFAULT_SALT_VERSION;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "saltprep",
    version,
    about = "Prepare a compose workspace for OSS or Enterprise Salt deployments",
    after_help = "Examples:\n  saltprep doctor\n  saltprep clean\n  saltprep oss --salt-version 3006.9\n  POSTGRES_PASS=... REDIS_PASSWORD=... saltprep enterprise --non-interactive --auto-confirm\n  saltprep status --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Workspace containing the compose files and data directories
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub workspace: PathBuf,

    /// Orchestration command, split like a shell command line
    #[arg(
        long,
        value_name = "CMD",
        env = "SALTPREP_COMPOSE",
        default_value = DEFAULT_COMPOSE_COMMAND,
        global = true
    )]
    pub compose_command: String,

    /// Kill orchestration tool invocations that run longer than this
    #[arg(long, value_name = "SECS", global = true)]
    pub tool_timeout: Option<u64>,

    /// Log filter, e.g. `info` or `saltprep=debug`
    #[arg(
        long,
        value_name = "LEVEL",
        env = "SALTPREP_LOG",
        default_value = "warn",
        global = true
    )]
    pub log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level modes.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tear down the environment and remove generated state
    Clean,
    /// Prepare the open-source edition
    Oss(PrepareArgs),
    /// Prepare the enterprise edition from the installer bundle
    Enterprise(PrepareArgs),
    /// Check that the orchestration tool is usable
    Doctor(ReportArgs),
    /// Show what currently occupies each managed path
    Status(ReportArgs),
}

/// Options shared by the prepare modes.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Salt version written to SALT_VERSION
    #[arg(long, value_name = "VERSION", default_value = DEFAULT_SALT_VERSION)]
    pub salt_version: String,

    /// Never prompt; credentials must come from the environment
    #[arg(long)]
    pub non_interactive: bool,

    /// Start the environment after preparing it
    #[arg(long, requires = "non_interactive")]
    pub auto_confirm: bool,
}

impl PrepareArgs {
    pub fn launch_policy(&self) -> LaunchPolicy {
        if self.non_interactive {
            LaunchPolicy::NonInteractive {
                auto_confirm: self.auto_confirm,
            }
        } else {
            LaunchPolicy::Interactive
        }
    }
}

/// Options for the read-only report modes.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn auto_confirm_requires_non_interactive() {
        assert!(RootArgs::try_parse_from(["saltprep", "oss", "--auto-confirm"]).is_err());
        let args = RootArgs::try_parse_from([
            "saltprep",
            "enterprise",
            "--non-interactive",
            "--auto-confirm",
        ])
        .unwrap();
        let Command::Enterprise(prepare) = args.command else {
            panic!("expected enterprise command");
        };
        assert_eq!(
            prepare.launch_policy(),
            LaunchPolicy::NonInteractive { auto_confirm: true }
        );
        assert_eq!(prepare.salt_version, "3006.9");
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let args = RootArgs::try_parse_from([
            "saltprep",
            "status",
            "--json",
            "--workspace",
            "/srv/deploy",
            "--tool-timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(args.workspace, PathBuf::from("/srv/deploy"));
        assert_eq!(args.tool_timeout, Some(30));
        assert!(matches!(args.command, Command::Status(ReportArgs { json: true })));
    }
}
