//! Diagnostic logging setup.
//!
//! Logs go to stderr, or are appended to a file when one is given. Results
//! meant for the user are printed to stdout by the modes themselves.
use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("parse log level {level:?}"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|err| anyhow!("install log subscriber: {err}"))
}
