use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::callback::{CALLBACK_PATH, CallbackListener, LOGIN_TIMEOUT};
use super::credentials::{CredentialStore, Credentials, now_millis_u64};
use super::pkce::{self, Pkce};
use super::{IdentityProvider, InitOutcome, OnLoad, Profile, RedirectNotifier};
use crate::config::IdentityConfig;
use crate::interrupt::{self, InterruptedError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_MIN_VALIDITY: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
    #[serde(default)]
    refresh_expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenResponse {
    fn into_credentials(self, previous_refresh: Option<String>) -> Credentials {
        let now = now_millis_u64();
        Credentials {
            access: self.access_token,
            refresh: self.refresh_token.or(previous_refresh),
            expires: now.saturating_add(self.expires_in.saturating_mul(1000)),
            // Keycloak reports 0 for offline tokens that never expire.
            refresh_expires: self
                .refresh_expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now.saturating_add(secs.saturating_mul(1000))),
            id_token: self.id_token,
        }
    }
}

/// OIDC client for a Keycloak realm.
///
/// Holds the live credentials in memory and mirrors them to the
/// [`CredentialStore`] so that later invocations can reuse the session.
pub struct KeycloakClient {
    config: IdentityConfig,
    http: reqwest::Client,
    store: CredentialStore,
    credentials: Mutex<Option<Credentials>>,
    min_validity: Duration,
}

impl KeycloakClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: IdentityConfig, store: CredentialStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build identity HTTP client")?;
        Ok(Self {
            config,
            http,
            store,
            credentials: Mutex::new(None),
            min_validity: DEFAULT_MIN_VALIDITY,
        })
    }

    /// Cached sessions expiring within `min_validity` are renewed on restore.
    #[must_use]
    pub fn with_min_validity(mut self, min_validity: Duration) -> Self {
        self.min_validity = min_validity;
        self
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn issuer(&self) -> String {
        self.config.issuer()
    }

    /// `{issuer}/protocol/openid-connect/{name}`
    fn endpoint(&self, name: &str) -> String {
        format!("{}/protocol/openid-connect/{name}", self.issuer())
    }

    /// Builds the authorization URL for the code + PKCE flow.
    pub fn build_auth_url(&self, pkce: &Pkce, state: &str, redirect_uri: &str) -> String {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", self.config.scopes.as_str()),
            ("code_challenge", &pkce.challenge),
            ("code_challenge_method", "S256"),
            ("state", state),
        ];

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        format!("{}?{query}", self.endpoint("auth"))
    }

    /// Return URL after logout: the configured one, else the login redirect URI.
    fn post_logout_redirect_uri(&self) -> Option<String> {
        if let Some(uri) = &self.config.post_logout_redirect_uri {
            return Some(uri.clone());
        }
        (self.config.redirect_port != 0).then(|| {
            format!(
                "http://localhost:{}{CALLBACK_PATH}",
                self.config.redirect_port
            )
        })
    }

    /// Builds the end-session URL to open in the browser.
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("client_id", &self.config.client_id);
        if let Some(uri) = self.post_logout_redirect_uri() {
            query.append_pair("post_logout_redirect_uri", &uri);
        }
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
        format!("{}?{}", self.endpoint("logout"), query.finish())
    }

    async fn token_request(&self, form: &[(&str, &str)], action: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .form(form)
            .send()
            .await
            .with_context(|| format!("Failed to send {action} request"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{action} failed (HTTP {status}): {body}");
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    /// Returns an error if the provider rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &Pkce,
        redirect_uri: &str,
    ) -> Result<Credentials> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", pkce.verifier.as_str()),
        ];
        let tokens = self.token_request(&form, "Token exchange").await?;
        Ok(tokens.into_credentials(None))
    }

    /// Trades a refresh token for a new token set.
    ///
    /// # Errors
    /// Returns an error if the provider rejects the refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credentials> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        let tokens = self.token_request(&form, "Token refresh").await?;
        Ok(tokens.into_credentials(Some(refresh_token.to_string())))
    }

    /// Makes `creds` the live session and persists it.
    ///
    /// # Errors
    /// Returns an error if the credentials cannot be written.
    pub async fn adopt(&self, creds: Credentials) -> Result<()> {
        self.store.save(&self.issuer(), &creds)?;
        *self.credentials.lock().await = Some(creds);
        Ok(())
    }

    /// Currently held credentials, if any.
    pub async fn current(&self) -> Option<Credentials> {
        self.credentials.lock().await.clone()
    }

    /// Loads cached credentials, renewing them if the access token expires
    /// within the min-validity window.
    ///
    /// A token that is still valid is kept when renewal fails. Unusable
    /// entries are removed from the store.
    async fn restore(&self) -> Option<Credentials> {
        let issuer = self.issuer();
        let cached = match self.store.load(&issuer) {
            Ok(cached) => cached?,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable credentials");
                return None;
            }
        };

        if !cached.expires_within(self.min_validity) {
            tracing::debug!(issuer = %issuer, "reusing cached session");
            return Some(cached);
        }

        if cached.can_refresh()
            && let Some(refresh) = cached.refresh.as_deref()
        {
            match self.refresh(refresh).await {
                Ok(renewed) => {
                    if let Err(err) = self.store.save(&issuer, &renewed) {
                        tracing::warn!(error = %format!("{err:#}"), "failed to persist renewed session");
                    }
                    tracing::info!(issuer = %issuer, "renewed cached session");
                    return Some(renewed);
                }
                Err(err) => {
                    tracing::info!(error = %format!("{err:#}"), "cached session could not be renewed");
                }
            }
        }

        if !cached.is_expired() {
            tracing::debug!(issuer = %issuer, "reusing cached session close to expiry");
            return Some(cached);
        }

        if let Err(err) = self.store.clear(&issuer) {
            tracing::warn!(error = %format!("{err:#}"), "failed to clear stale credentials");
        }
        None
    }

    /// Runs the browser login: loopback listener, authorization URL, code exchange.
    ///
    /// Returns `None` when no redirect arrives before the timeout or the user
    /// denies access.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind, the exchange fails, or the
    /// wait was interrupted with Ctrl+C.
    pub async fn browser_login(
        &self,
        on_redirect: RedirectNotifier<'_>,
    ) -> Result<Option<Credentials>> {
        let listener = CallbackListener::bind(self.config.redirect_port)?;
        let redirect_uri = listener.redirect_uri();
        let pkce = Pkce::generate();
        let state = pkce::new_state();
        let auth_url = self.build_auth_url(&pkce, &state, &redirect_uri);

        on_redirect(&auth_url);
        if self.config.open_browser
            && let Err(err) = open::that(&auth_url)
        {
            tracing::warn!(error = %err, "failed to open browser");
        }
        tracing::info!(redirect_uri = %redirect_uri, "waiting for login redirect");

        let expected = state.clone();
        let code = tokio::task::spawn_blocking(move || {
            listener.wait_for_code(&expected, LOGIN_TIMEOUT)
        })
        .await
        .context("Login callback task failed")?;

        if interrupt::is_interrupted() {
            return Err(InterruptedError.into());
        }
        let Some(code) = code else {
            tracing::info!("no authorization code received");
            return Ok(None);
        };

        let creds = self.exchange_code(&code, &pkce, &redirect_uri).await?;
        Ok(Some(creds))
    }
}

impl IdentityProvider for KeycloakClient {
    async fn init(&self, on_load: OnLoad, on_redirect: RedirectNotifier<'_>) -> Result<InitOutcome> {
        if let Some(creds) = self.restore().await {
            let token = creds.access.clone();
            *self.credentials.lock().await = Some(creds);
            return Ok(InitOutcome::Authenticated { token });
        }

        if on_load == OnLoad::CheckSso {
            return Ok(InitOutcome::Unauthenticated);
        }

        match self.browser_login(on_redirect).await? {
            Some(creds) => {
                let token = creds.access.clone();
                self.adopt(creds).await?;
                Ok(InitOutcome::Authenticated { token })
            }
            None => Ok(InitOutcome::Unauthenticated),
        }
    }

    async fn update_token(&self, min_validity: Duration) -> Result<Option<String>> {
        let mut guard = self.credentials.lock().await;
        let Some(creds) = guard.as_ref() else {
            bail!("Not authenticated");
        };
        if !creds.expires_within(min_validity) {
            return Ok(None);
        }
        if !creds.can_refresh() {
            bail!("Session expired and cannot be renewed");
        }
        let Some(refresh) = creds.refresh.clone() else {
            bail!("Session expired and cannot be renewed");
        };

        let renewed = self.refresh(&refresh).await?;
        if let Err(err) = self.store.save(&self.issuer(), &renewed) {
            tracing::warn!(error = %format!("{err:#}"), "failed to persist renewed session");
        }
        let token = renewed.access.clone();
        *guard = Some(renewed);
        Ok(Some(token))
    }

    async fn userinfo(&self, token: &str) -> Result<Profile> {
        let response = self
            .http
            .get(self.endpoint("userinfo"))
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send userinfo request")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("Userinfo request failed (HTTP {status})");
        }

        response
            .json()
            .await
            .context("Failed to parse userinfo response")
    }

    async fn logout(&self) -> Result<String> {
        let creds = self.credentials.lock().await.take();
        let issuer = self.issuer();

        // Also covers sessions only present on disk (CLI `logout`).
        let creds = match creds {
            Some(creds) => Some(creds),
            None => self.store.load(&issuer).ok().flatten(),
        };
        self.store.clear(&issuer)?;

        if let Some(refresh) = creds.as_ref().and_then(|c| c.refresh.as_deref()) {
            let form = [
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh),
            ];
            match self.http.post(self.endpoint("logout")).form(&form).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("provider session ended");
                }
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "provider logout rejected");
                }
                Err(err) => tracing::warn!(error = %err, "provider logout failed"),
            }
        }

        let url = self.logout_url(creds.as_ref().and_then(|c| c.id_token.as_deref()));
        if self.config.open_browser
            && let Err(err) = open::that(&url)
        {
            tracing::warn!(error = %err, "failed to open browser");
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const REALM_PATH: &str = "/realms/elearning-realm/protocol/openid-connect";

    fn config(server_url: &str) -> IdentityConfig {
        IdentityConfig {
            server_url: server_url.to_string(),
            open_browser: false,
            ..IdentityConfig::default()
        }
    }

    fn client(server_url: &str, dir: &TempDir) -> KeycloakClient {
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        KeycloakClient::new(config(server_url), store).unwrap()
    }

    fn creds_expiring_in(secs: u64) -> Credentials {
        Credentials {
            access: "old-access".to_string(),
            refresh: Some("old-refresh".to_string()),
            expires: now_millis_u64() + secs * 1000,
            refresh_expires: None,
            id_token: Some("id-token".to_string()),
        }
    }

    fn token_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "token_type": "Bearer",
            "id_token": "new-id"
        })
    }

    fn no_redirect(_: &str) {}

    #[test]
    fn test_build_auth_url() {
        let dir = TempDir::new().unwrap();
        let client = client("http://localhost:8080/", &dir);
        let pkce = Pkce {
            verifier: "v".to_string(),
            challenge: "challenge".to_string(),
        };
        let url = client.build_auth_url(&pkce, "st", "http://localhost:8765/callback");
        let parsed = url::Url::parse(&url).unwrap();

        assert_eq!(
            parsed.path(),
            "/realms/elearning-realm/protocol/openid-connect/auth"
        );
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "campus-cli");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8765/callback");
        assert_eq!(pairs["code_challenge"], "challenge");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], "st");
        assert_eq!(pairs["scope"], "openid profile email");
    }

    #[test]
    fn test_logout_url_carries_return_url() {
        let dir = TempDir::new().unwrap();
        let client = client("http://localhost:8080", &dir);
        let parsed = url::Url::parse(&client.logout_url(Some("idt"))).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(parsed.path().ends_with("/protocol/openid-connect/logout"));
        assert_eq!(pairs["client_id"], "campus-cli");
        assert_eq!(
            pairs["post_logout_redirect_uri"],
            "http://localhost:8765/callback"
        );
        assert_eq!(pairs["id_token_hint"], "idt");
    }

    #[tokio::test]
    async fn test_update_token_skips_refresh_when_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        client.adopt(creds_expiring_in(120)).await.unwrap();

        let renewed = client.update_token(Duration::from_secs(60)).await.unwrap();
        assert_eq!(renewed, None);
    }

    #[tokio::test]
    async fn test_update_token_refreshes_when_near_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .and(body_string_contains("client_id=campus-cli"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        client.adopt(creds_expiring_in(45)).await.unwrap();

        let renewed = client.update_token(Duration::from_secs(60)).await.unwrap();
        assert_eq!(renewed.as_deref(), Some("new-access"));

        let current = client.current().await.unwrap();
        assert_eq!(current.refresh.as_deref(), Some("new-refresh"));
        assert!(current.refresh_expires.is_some());

        let stored = client.store.load(&client.issuer()).unwrap().unwrap();
        assert_eq!(stored.access, "new-access");
    }

    #[tokio::test]
    async fn test_update_token_rejected_refresh_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        client.adopt(creds_expiring_in(10)).await.unwrap();

        let err = client
            .update_token(Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Token refresh failed"));
    }

    #[tokio::test]
    async fn test_update_token_without_session_is_error() {
        let dir = TempDir::new().unwrap();
        let client = client("http://127.0.0.1:9", &dir);
        assert!(client.update_token(Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn test_init_reuses_valid_cached_session() {
        let dir = TempDir::new().unwrap();
        let client = client("http://127.0.0.1:9", &dir);
        client
            .store
            .save(&client.issuer(), &creds_expiring_in(600))
            .unwrap();

        let outcome = client.init(OnLoad::CheckSso, &no_redirect).await.unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Authenticated {
                token: "old-access".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_init_renews_expired_cached_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        let mut expired = creds_expiring_in(0);
        expired.expires = 1;
        client.store.save(&client.issuer(), &expired).unwrap();

        let outcome = client.init(OnLoad::CheckSso, &no_redirect).await.unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Authenticated {
                token: "new-access".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_init_renews_cached_session_close_to_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir).with_min_validity(Duration::from_secs(60));
        client
            .store
            .save(&client.issuer(), &creds_expiring_in(10))
            .unwrap();

        let outcome = client.init(OnLoad::CheckSso, &no_redirect).await.unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Authenticated {
                token: "new-access".to_string()
            }
        );
        let stored = client.store.load(&client.issuer()).unwrap().unwrap();
        assert_eq!(stored.access, "new-access");
    }

    #[tokio::test]
    async fn test_init_keeps_valid_token_when_renewal_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        client
            .store
            .save(&client.issuer(), &creds_expiring_in(10))
            .unwrap();

        let outcome = client.init(OnLoad::CheckSso, &no_redirect).await.unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Authenticated {
                token: "old-access".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_init_check_sso_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/token")))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        let mut expired = creds_expiring_in(0);
        expired.expires = 1;
        client.store.save(&client.issuer(), &expired).unwrap();

        let outcome = client.init(OnLoad::CheckSso, &no_redirect).await.unwrap();
        assert_eq!(outcome, InitOutcome::Unauthenticated);
        // Unrenewable entries are dropped.
        assert_eq!(client.store.load(&client.issuer()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_userinfo_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/userinfo")))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "1",
                "given_name": "Ada",
                "family_name": "Lovelace",
                "preferred_username": "ada"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let profile = client(&server.uri(), &dir).userinfo("tok").await.unwrap();
        assert_eq!(profile.display_name().as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_calls_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/logout")))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client(&server.uri(), &dir);
        client.adopt(creds_expiring_in(600)).await.unwrap();

        let url = client.logout().await.unwrap();
        assert!(url.contains("id_token_hint=id-token"));
        assert!(client.current().await.is_none());
        assert_eq!(client.store.load(&client.issuer()).unwrap(), None);
    }
}
