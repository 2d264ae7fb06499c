//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod courses;
pub mod tui;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use campus_core::api::ApiClient;
use campus_core::config::Config;
use campus_core::identity::{CredentialStore, KeycloakClient, OnLoad};
use campus_core::session::{Phase, Session, SessionStore};

pub type Store = SessionStore<KeycloakClient>;

pub fn identity_client(config: &Config) -> Result<KeycloakClient> {
    Ok(
        KeycloakClient::new(config.identity.clone(), CredentialStore::default_location())?
            .with_min_validity(config.refresh.min_validity()),
    )
}

pub fn session_store(config: &Config) -> Result<Arc<Store>> {
    let api = ApiClient::new(&config.api).context("create API client")?;
    let provider = identity_client(config)?;
    Ok(Arc::new(SessionStore::new(provider, api, config.refresh)))
}

/// Restores the stored session without prompting.
///
/// # Errors
/// Returns an error if there is no usable session.
pub async fn require_session(config: &Config) -> Result<(Arc<Store>, Session)> {
    let store = session_store(config)?;
    if store.initialize(OnLoad::CheckSso).await != Phase::Authenticated {
        let session = store.snapshot();
        match session.failure {
            Some(failure) => bail!("Not logged in: {failure}\nRun `campus login` first."),
            None => bail!("Not logged in. Run `campus login` first."),
        }
    }
    let session = store.snapshot();
    Ok((store, session))
}
