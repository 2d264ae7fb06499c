//! `campus config` handlers.

use anyhow::{Context, Result};
use campus_core::config::{Config, paths};

pub fn path() {
    println!("{}", paths::config_path().display());
}

pub fn init() -> Result<()> {
    let target = paths::config_path();
    Config::init(&target)
        .with_context(|| format!("write default config to {}", target.display()))?;
    println!("Created config at {}", target.display());
    println!("Point [identity] and [api] at your deployment before logging in.");
    Ok(())
}

pub fn generate() -> Result<()> {
    let rendered = Config::generate().context("render default config")?;
    print!("{rendered}");
    Ok(())
}
