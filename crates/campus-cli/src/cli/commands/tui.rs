//! Interactive client handler.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use campus_core::config::Config;
use campus_core::identity::OnLoad;

use super::session_store;

pub async fn run(config: &Config) -> Result<()> {
    let store = session_store(config)?;

    // Without an interactive stdin nobody can finish a browser login.
    let on_load = if std::io::stdin().is_terminal() {
        OnLoad::LoginRequired
    } else {
        OnLoad::CheckSso
    };

    campus_tui::run_app(config, store, on_load)
        .await
        .context("interactive client failed")
}
