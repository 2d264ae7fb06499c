//! Terminal setup and teardown.
//!
//! `leave` runs on normal exit (runtime drop), on a forced exit after a
//! second Ctrl+C and from the panic hook.

use std::io::{self, Stdout};
use std::panic;

use anyhow::{Context, Result};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Switches to raw mode on the alternate screen with bracketed paste, so a
/// pasted value reaches the form as one event.
///
/// # Errors
/// Returns an error if the terminal rejects any of the mode changes.
pub fn enter() -> Result<Tui> {
    enable_raw_mode().context("enable raw mode")?;
    execute!(io::stdout(), EnterAlternateScreen, EnableBracketedPaste)
        .context("switch to alternate screen")?;
    Terminal::new(CrosstermBackend::new(io::stdout())).context("create terminal backend")
}

/// Undoes [`enter`]. Safe to call more than once.
///
/// # Errors
/// Returns an error if the terminal cannot be switched back.
pub fn leave() -> Result<()> {
    let mut out = io::stdout();
    let _ = execute!(out, DisableBracketedPaste);
    execute!(out, LeaveAlternateScreen).context("leave alternate screen")?;
    disable_raw_mode().context("disable raw mode")
}

/// Chains a hook that puts the terminal back before the panic message prints.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let _ = leave();
        previous(info);
    }));
}
