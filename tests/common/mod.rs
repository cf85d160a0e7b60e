//! Shared test infrastructure for integration tests.
//!
//! Each test gets a throwaway workspace plus a fake orchestration tool: a
//! shell script that appends its arguments to a log and exits 0.
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use tempfile::TempDir;

/// Credential variables that must never leak in from the developer's shell.
const SCRUBBED_ENV: [&str; 4] = [
    "POSTGRES_PASS",
    "REDIS_PASSWORD",
    "SALTPREP_COMPOSE",
    "SALTPREP_LOG",
];

pub struct TestWorkspace {
    _temp: TempDir,
    pub root: PathBuf,
    pub compose_script: PathBuf,
    pub compose_log: PathBuf,
}

/// Result of one `saltprep` invocation.
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn assert_success(&self) {
        assert_eq!(
            self.code,
            Some(0),
            "saltprep failed\nstdout:\n{}\nstderr:\n{}",
            self.stdout,
            self.stderr
        );
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    /// A workspace with both editions' compose files and master directories.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().join("deploy");
        fs::create_dir_all(root.join("data/oss-master")).expect("create oss master dir");
        fs::create_dir_all(root.join("data/ent-master")).expect("create ent master dir");
        fs::write(root.join("oss-compose.yaml"), "services: {}\n").expect("write oss compose");
        fs::write(root.join("aria-compose.yaml"), "services: {}\n").expect("write aria compose");
        let root = root.canonicalize().expect("canonical workspace");

        let compose_log = temp.path().join("compose.log");
        let compose_script = temp.path().join("fake-orchestrator");
        fs::write(
            &compose_script,
            format!(
                "#!/bin/sh\nshift\necho \"$*\" >> '{}'\nexit 0\n",
                compose_log.display()
            ),
        )
        .expect("write fake tool");
        fs::set_permissions(&compose_script, fs::Permissions::from_mode(0o755))
            .expect("make fake tool executable");

        Self {
            _temp: temp,
            root,
            compose_script,
            compose_log,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Run `saltprep <args>` against this workspace with the fake tool.
    pub fn run(&self, args: &[&str], env: &[(&str, &str)]) -> RunResult {
        let compose_command = format!("{} compose", self.compose_script.display());
        self.run_with_compose(&compose_command, args, env)
    }

    /// Run `saltprep <args>` with an explicit orchestration command.
    pub fn run_with_compose(
        &self,
        compose_command: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> RunResult {
        let mut cmd = self.command(compose_command, args, env);
        cmd.stdin(Stdio::null());
        RunResult::from_output(cmd.output().expect("spawn saltprep"))
    }

    /// Start `saltprep <args>` with piped stdin and stdout, without waiting.
    pub fn spawn(&self, args: &[&str]) -> Child {
        let compose_command = format!("{} compose", self.compose_script.display());
        self.command(&compose_command, args, &[])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn saltprep")
    }

    fn command(&self, compose_command: &str, args: &[&str], env: &[(&str, &str)]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_saltprep"));
        cmd.arg("--workspace")
            .arg(&self.root)
            .arg("--compose-command")
            .arg(compose_command)
            .args(args);
        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Subcommand lines the fake tool received, `version` probes excluded.
    pub fn compose_calls(&self) -> Vec<String> {
        fs::read_to_string(&self.compose_log)
            .unwrap_or_default()
            .lines()
            .filter(|line| *line != "version")
            .map(str::to_string)
            .collect()
    }

    pub fn env_file(&self) -> Option<String> {
        fs::read_to_string(self.path(".env")).ok()
    }

    /// Place a minimal but well-formed installer bundle in the workspace.
    pub fn add_bundle(&self) {
        let archive = self.path("vRA_SaltStack_Config-8.16.2-1.tar.gz");
        let file = fs::File::create(archive).expect("create bundle");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in [
            (
                "sse-installer/salt/sse/eapi_service/files/raas-8.16.2-1.el9.x86_64.rpm",
                &b"rpm"[..],
            ),
            (
                "sse-installer/salt/sse/eapi_plugin/files/SSEAPE-8.16.2-py3-none-any.whl",
                &b"whl"[..],
            ),
            ("sse-installer/README", &b"installer"[..]),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data)
                .expect("append bundle member");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }
}

pub fn read_link(path: &Path) -> PathBuf {
    fs::read_link(path).unwrap_or_else(|err| panic!("read link {}: {err}", path.display()))
}
