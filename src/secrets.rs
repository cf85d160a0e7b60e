//! Credential collection.
//!
//! Secrets come from a [`SecretSource`]: injected environment variables, a
//! no-echo terminal prompt, or a chain of both. Nothing here ever supplies a
//! default value.
use crate::interrupt::{self, CriticalSection, Interrupted};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;

const TERMINAL_PATH: &str = "/dev/tty";

/// A credential value. `Debug` never shows the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

/// Credentials the enterprise edition needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecretField {
    PostgresPassword,
    RedisPassword,
}

impl SecretField {
    pub const ALL: [SecretField; 2] = [SecretField::PostgresPassword, SecretField::RedisPassword];

    /// Environment file key, also the variable that injects the value.
    pub fn key(self) -> &'static str {
        match self {
            SecretField::PostgresPassword => "POSTGRES_PASS",
            SecretField::RedisPassword => "REDIS_PASSWORD",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            SecretField::PostgresPassword => "Postgres password: ",
            SecretField::RedisPassword => "Redis password: ",
        }
    }
}

/// Keys whose values must never be displayed.
pub fn secret_keys() -> [&'static str; 2] {
    SecretField::ALL.map(SecretField::key)
}

/// Somewhere a credential can be obtained from.
pub trait SecretSource {
    /// `Ok(None)` means this source has no value for `field`.
    fn fetch(&mut self, field: SecretField) -> Result<Option<Secret>>;
}

/// Values injected through environment variables, captured once.
#[derive(Debug, Default)]
pub struct EnvSecrets {
    values: BTreeMap<SecretField, Secret>,
}

impl EnvSecrets {
    pub fn from_process() -> Result<Self> {
        let mut values = BTreeMap::new();
        for field in SecretField::ALL {
            match std::env::var(field.key()) {
                Ok(value) => {
                    values.insert(field, Secret::new(value));
                }
                Err(std::env::VarError::NotPresent) => {}
                Err(err) => return Err(anyhow!("read {}: {err}", field.key())),
            }
        }
        Ok(Self { values })
    }
}

impl SecretSource for EnvSecrets {
    fn fetch(&mut self, field: SecretField) -> Result<Option<Secret>> {
        let found = self.values.get(&field).cloned();
        if found.is_some() {
            tracing::debug!(key = field.key(), "secret supplied by environment");
        }
        Ok(found)
    }
}

/// Interactive prompt on the controlling terminal with echo disabled.
#[derive(Debug, Default)]
pub struct PromptSecrets;

impl SecretSource for PromptSecrets {
    fn fetch(&mut self, field: SecretField) -> Result<Option<Secret>> {
        let mut tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TERMINAL_PATH)
            .with_context(|| format!("open {TERMINAL_PATH} to prompt for {}", field.key()))?;
        read_hidden(&mut tty, field.prompt()).map(|value| Some(Secret::new(value)))
    }
}

/// Restores the saved terminal attributes when dropped.
struct EchoGuard {
    fd: libc::c_int,
    saved: libc::termios,
}

impl EchoGuard {
    fn disable(tty: &File) -> Result<Self> {
        let fd = tty.as_raw_fd();
        // SAFETY: termios is plain data filled in by tcgetattr before use.
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(anyhow!("read terminal attributes: {}", io::Error::last_os_error()));
        }
        let mut quiet = saved;
        quiet.c_lflag &= !libc::ECHO;
        quiet.c_lflag |= libc::ECHONL;
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &quiet) } != 0 {
            return Err(anyhow!("disable terminal echo: {}", io::Error::last_os_error()));
        }
        Ok(Self { fd, saved })
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        // SAFETY: restores attributes captured from the same descriptor.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.saved);
        }
    }
}

fn read_hidden(tty: &mut File, prompt: &str) -> Result<String> {
    let _critical = CriticalSection::enter();
    tty.write_all(prompt.as_bytes()).context("write prompt")?;
    tty.flush().context("flush prompt")?;
    let _echo = EchoGuard::disable(tty)?;

    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match tty.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => bytes.push(byte[0]),
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                if interrupt::is_pending() {
                    return Err(Interrupted.into());
                }
            }
            Err(err) => return Err(err).context("read secret from terminal"),
        }
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|_| anyhow!("secret is not valid UTF-8"))
}

/// Asks each source in turn; the first value wins.
pub struct ChainedSecrets {
    sources: Vec<Box<dyn SecretSource>>,
}

impl ChainedSecrets {
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }
}

impl SecretSource for ChainedSecrets {
    fn fetch(&mut self, field: SecretField) -> Result<Option<Secret>> {
        for source in &mut self.sources {
            if let Some(secret) = source.fetch(field)? {
                return Ok(Some(secret));
            }
        }
        Ok(None)
    }
}

/// Environment first, then the terminal when interactive.
pub fn default_source(interactive: bool) -> Result<Box<dyn SecretSource>> {
    let env = EnvSecrets::from_process()?;
    if interactive {
        Ok(Box::new(ChainedSecrets::new(vec![
            Box::new(env),
            Box::new(PromptSecrets),
        ])))
    } else {
        Ok(Box::new(env))
    }
}

/// Collect every field from `source`, failing on a missing or empty value.
pub fn resolve(source: &mut dyn SecretSource) -> Result<Vec<(SecretField, Secret)>> {
    let mut resolved = Vec::new();
    for field in SecretField::ALL {
        let secret = source.fetch(field)?.ok_or_else(|| {
            anyhow!(
                "missing credential {}: set the {} environment variable or run interactively",
                field.key(),
                field.key()
            )
        })?;
        if secret.is_empty() {
            return Err(anyhow!("credential {} must not be empty", field.key()));
        }
        resolved.push((field, secret));
    }
    Ok(resolved)
}
