//! Full-screen terminal client for the campus course catalogue.

pub mod common;
pub mod effects;
pub mod events;
pub mod features;
pub mod render;
pub mod runtime;
pub mod state;
pub mod terminal;
pub mod update;

use std::io::{IsTerminal, stdout};
use std::sync::Arc;

use anyhow::Result;
use campus_core::config::Config;
use campus_core::identity::{IdentityProvider, OnLoad};
use campus_core::session::SessionStore;
pub use runtime::TuiRuntime;

/// Runs the interactive client until the user quits.
///
/// # Errors
/// Returns an error if stdout is not a terminal or terminal I/O fails.
pub async fn run_app<P: IdentityProvider>(
    config: &Config,
    store: Arc<SessionStore<P>>,
    on_load: OnLoad,
) -> Result<()> {
    if !stdout().is_terminal() {
        anyhow::bail!(
            "The interactive client requires a terminal.\n\
             Use `campus courses list` for non-interactive use."
        );
    }

    let mut runtime = TuiRuntime::new(store, on_load, config.ui.notice_duration())?;
    runtime.run()?;
    tracing::info!("tui exited");
    Ok(())
}
