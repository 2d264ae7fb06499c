//! Login, logout and whoami handlers.

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result, bail};
use campus_core::config::Config;
use campus_core::identity::callback::{CALLBACK_PATH, parse_authorization_input};
use campus_core::identity::pkce::{self, Pkce};
use campus_core::identity::{
    CredentialStore, Credentials, IdentityProvider, KeycloakClient, Profile,
};
use campus_tui::features::shell::render::NO_ROLES_TEXT;
use chrono::{DateTime, Local};

use super::{identity_client, require_session};

pub async fn login(config: &Config, paste: bool) -> Result<()> {
    let client = identity_client(config)?;
    let store = CredentialStore::default_location();

    if let Some(existing) = store.load(&client.issuer())?
        && !existing.is_expired()
    {
        println!(
            "Already logged in (token valid for {} min). Run `campus logout` to switch accounts.",
            existing.remaining().as_secs() / 60
        );
        return Ok(());
    }

    let creds = if paste {
        paste_login(&client).await?
    } else {
        let notify = |url: &str| {
            eprintln!("Open this URL in your browser to log in:\n\n  {url}\n");
            eprintln!("Waiting for the login redirect...");
        };
        client.browser_login(&notify).await?
    };
    let Some(creds) = creds else {
        bail!("Login did not complete (timed out or access denied)");
    };

    let token = creds.access.clone();
    client.adopt(creds).await.context("save credentials")?;

    match client.userinfo(&token).await {
        Ok(profile) => println!("Logged in as {}", profile_name(&profile)),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "userinfo after login failed");
            println!("Logged in.");
        }
    }
    println!("Credentials saved to {}", store.path().display());
    Ok(())
}

/// Login for machines where the browser cannot reach the loopback listener.
async fn paste_login(client: &KeycloakClient) -> Result<Option<Credentials>> {
    if client.config().redirect_port == 0 {
        bail!("Paste login needs a fixed identity.redirect_port");
    }
    let redirect_uri = format!(
        "http://localhost:{}{CALLBACK_PATH}",
        client.config().redirect_port
    );
    let pkce = Pkce::generate();
    let state = pkce::new_state();
    let auth_url = client.build_auth_url(&pkce, &state, &redirect_uri);

    eprintln!("Open this URL in your browser to log in:\n\n  {auth_url}\n");
    if std::io::stdin().is_terminal() {
        eprint!("Paste the redirect URL (or authorization code): ");
        std::io::stderr().flush()?;
    }

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("read authorization input")?;

    let (code, returned_state) = parse_authorization_input(&input);
    if let Some(returned_state) = returned_state
        && returned_state != state
    {
        bail!("State mismatch in the pasted redirect URL");
    }
    let Some(code) = code else {
        return Ok(None);
    };

    let creds = client.exchange_code(&code, &pkce, &redirect_uri).await?;
    Ok(Some(creds))
}

pub async fn logout(config: &Config) -> Result<()> {
    let client = identity_client(config)?;
    let store = CredentialStore::default_location();
    if store.load(&client.issuer())?.is_none() {
        println!("Not logged in.");
        return Ok(());
    }

    let url = client.logout().await?;
    println!("Logged out.");
    println!("Identity provider sign-out: {url}");
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let (store, session) = require_session(config).await?;

    let name = session.display_name().unwrap_or_else(|| "unknown".to_string());
    println!("Name:     {name}");
    if let Some(email) = session.email() {
        println!("Email:    {email}");
    }
    if let Some(username) = session
        .profile
        .as_ref()
        .and_then(|p| p.preferred_username.as_deref())
    {
        println!("Username: {username}");
    }
    let roles = if session.roles.is_empty() {
        NO_ROLES_TEXT.to_string()
    } else {
        session.roles.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    println!("Roles:    {roles}");

    if let Some(creds) = store.provider().current().await {
        println!(
            "Token:    valid until {} ({} min left)",
            format_expiry(creds.expires),
            creds.remaining().as_secs() / 60
        );
    }
    Ok(())
}

fn profile_name(profile: &Profile) -> String {
    profile
        .display_name()
        .unwrap_or_else(|| "unknown user".to_string())
}

fn format_expiry(expires_ms: u64) -> String {
    i64::try_from(expires_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || "unknown".to_string(),
            |utc| {
                utc.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
}
