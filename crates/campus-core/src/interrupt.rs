//! Process-wide Ctrl+C flag.
//!
//! The signal handler only records the interrupt. Long waits (the login
//! callback listener, the TUI event loop) poll [`is_interrupted`] and unwind
//! themselves; a second Ctrl+C exits immediately.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

static FLAG: AtomicBool = AtomicBool::new(false);
static RESTORE_HOOK: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

/// Returned by operations abandoned because of Ctrl+C; `main` maps it to
/// exit status 130.
#[derive(Debug)]
pub struct InterruptedError;

impl fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the signal handler.
///
/// # Errors
/// Returns an error if a handler is already installed for this process.
pub fn init() -> anyhow::Result<()> {
    ctrlc::set_handler(on_signal)
        .map_err(|err| anyhow::anyhow!("Failed to install Ctrl+C handler: {err}"))
}

fn on_signal() {
    if FLAG.swap(true, Ordering::SeqCst) {
        // exit() skips destructors, so the terminal is restored by hand.
        if let Some(restore) = RESTORE_HOOK.get() {
            restore();
        }
        std::process::exit(130);
    }
}

pub fn is_interrupted() -> bool {
    FLAG.load(Ordering::SeqCst)
}

pub fn reset() {
    FLAG.store(false, Ordering::SeqCst);
}

/// Raises the flag without a signal, e.g. when the TUI quits while a
/// browser login is still waiting for its redirect.
pub fn request() {
    FLAG.store(true, Ordering::SeqCst);
}

/// Registers the callback run before a forced exit. Only the first
/// registration takes effect.
pub fn set_restore_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let _ = RESTORE_HOOK.set(Box::new(hook));
}
