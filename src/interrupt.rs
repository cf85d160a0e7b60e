//! SIGINT/SIGTERM handling.
//!
//! Outside a critical section a signal ends the process at once with status
//! 130. Inside one (staging the environment file, reading a secret with echo
//! disabled) the signal is only recorded; the section runs to completion or
//! unwinds, and the pipeline stops at its next checkpoint.
use anyhow::{anyhow, Result};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static STATE: InterruptState = InterruptState::new();

/// Signal bookkeeping shared between the handler and the pipeline.
struct InterruptState {
    pending: AtomicBool,
    critical_depth: AtomicUsize,
}

impl InterruptState {
    const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            critical_depth: AtomicUsize::new(0),
        }
    }

    /// Note a signal. Returns true when the process should exit now.
    fn record(&self) -> bool {
        self.pending.store(true, Ordering::SeqCst);
        self.critical_depth.load(Ordering::SeqCst) == 0
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.is_pending() {
            tracing::warn!("interrupt received, stopping before the next step");
            return Err(Interrupted.into());
        }
        Ok(())
    }

    fn enter(&'static self) -> CriticalSection {
        self.critical_depth.fetch_add(1, Ordering::SeqCst);
        CriticalSection { state: self }
    }
}

/// Marker error so `main` can map interrupts to their exit code.
#[derive(Debug)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("interrupted by signal")
    }
}

impl std::error::Error for Interrupted {}

extern "C" fn on_signal(_signal: libc::c_int) {
    if STATE.record() {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(INTERRUPTED_EXIT_CODE) };
    }
}

/// Install handlers for SIGINT and SIGTERM.
///
/// `SA_RESTART` is left unset so a blocking terminal read returns `EINTR`.
pub fn install() -> Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the action is fully initialised before use and the handler
        // only touches atomics and _exit.
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = 0;
            libc::sigaction(signal, &action, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(anyhow!(
                "install handler for signal {signal}: {}",
                io::Error::last_os_error()
            ));
        }
    }
    Ok(())
}

pub fn is_pending() -> bool {
    STATE.is_pending()
}

/// Fail with [`Interrupted`] when a signal arrived since start-up.
pub fn checkpoint() -> Result<()> {
    STATE.checkpoint()
}

/// Defers signal-triggered exit while alive.
pub struct CriticalSection {
    state: &'static InterruptState,
}

impl CriticalSection {
    pub fn enter() -> Self {
        STATE.enter()
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        self.state.critical_depth.fetch_sub(1, Ordering::SeqCst);
    }
}
