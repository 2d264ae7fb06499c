//! Identity provider client.
//!
//! The session store talks to the identity provider through the
//! [`IdentityProvider`] trait; [`KeycloakClient`] is the production
//! implementation (authorization code + PKCE against a Keycloak realm).

pub mod callback;
pub mod credentials;
mod keycloak;
pub mod pkce;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
pub use credentials::{CredentialStore, Credentials};
pub use keycloak::KeycloakClient;
use serde::{Deserialize, Serialize};

/// What `init` does when no usable session is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLoad {
    /// Run the browser login flow.
    LoginRequired,
    /// Only reuse a cached session; never prompt.
    CheckSso,
}

/// Result of the identity handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Authenticated { token: String },
    Unauthenticated,
}

/// User profile as returned by the OIDC userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl Profile {
    /// "Given Family", falling back to the provider username.
    pub fn display_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or(""),
            self.family_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if full.is_empty() {
            self.preferred_username.clone()
        } else {
            Some(full.to_string())
        }
    }
}

/// Callback invoked with the authorization URL when a browser login starts.
pub type RedirectNotifier<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Operations the session store needs from an identity provider.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Performs the handshake: reuse, renew, or (for `LoginRequired`)
    /// obtain a session through the browser.
    fn init(
        &self,
        on_load: OnLoad,
        on_redirect: RedirectNotifier<'_>,
    ) -> impl Future<Output = Result<InitOutcome>> + Send;

    /// Renews the access token if it expires within `min_validity`.
    ///
    /// Returns the new token when a renewal happened, `None` when the current
    /// token is still good. Errors mean the session can no longer be renewed.
    fn update_token(
        &self,
        min_validity: Duration,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Fetches the user profile for `token`.
    fn userinfo(&self, token: &str) -> impl Future<Output = Result<Profile>> + Send;

    /// Ends the session and returns the provider's logout URL.
    fn logout(&self) -> impl Future<Output = Result<String>> + Send;
}
