//! Session store: authentication state, profile, roles and the token refresh loop.
//!
//! State is published as [`Session`] snapshots through a `tokio::sync::watch`
//! channel. Phases only move forward from `Loading`: a session never returns to
//! `Loading` once it has been established or rejected.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::RefreshConfig;
use crate::identity::{IdentityProvider, InitOutcome, OnLoad, Profile};
use crate::logging::mask_token;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub phase: Phase,
    pub token: Option<String>,
    pub profile: Option<Profile>,
    pub roles: BTreeSet<String>,
    /// Authorization URL while a browser login is pending.
    pub login_url: Option<String>,
    /// Why the handshake failed, if it did.
    pub failure: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    /// True iff authenticated and `role` is one of the fetched roles.
    pub fn has_role(&self, role: &str) -> bool {
        self.is_authenticated() && self.roles.contains(role)
    }

    pub fn display_name(&self) -> Option<String> {
        self.profile.as_ref().and_then(Profile::display_name)
    }

    pub fn email(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.email.as_deref())
    }

    /// What the current roles unlock.
    pub fn access(&self) -> Access {
        let holds = |role: &str| {
            self.is_authenticated() && self.roles.iter().any(|held| authority(held) == role)
        };
        let admin = holds(ROLE_ADMIN);
        Access {
            courses: admin || holds(ROLE_STUDENT),
            manage_courses: admin,
        }
    }

    fn unauthenticated(failure: Option<String>) -> Self {
        Self {
            phase: Phase::Unauthenticated,
            failure,
            ..Self::default()
        }
    }
}

/// Lowercased role name with any `ROLE_` authority prefix removed.
fn authority(role: &str) -> String {
    let role = role.to_ascii_lowercase();
    match role.strip_prefix("role_") {
        Some(name) => name.to_string(),
        None => role,
    }
}

/// Role gate for the course views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    /// Course list (student or admin).
    pub courses: bool,
    /// Course creation (admin).
    pub manage_courses: bool,
}

/// Result of one refresh tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not authenticated; nothing to do.
    Skipped,
    /// Token still valid for the minimum window.
    Fresh,
    /// A new token was obtained.
    Renewed,
    /// Renewal failed and the session was ended.
    LoggedOut,
}

/// Owner of the background refresh loop; cancels it on drop.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
}

impl RefreshHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Shared authentication state backed by an [`IdentityProvider`].
pub struct SessionStore<P> {
    provider: P,
    api: ApiClient,
    refresh: RefreshConfig,
    state: watch::Sender<Session>,
    started: AtomicBool,
}

impl<P: IdentityProvider> SessionStore<P> {
    pub fn new(provider: P, api: ApiClient, refresh: RefreshConfig) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            provider,
            api,
            refresh,
            state,
            started: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Runs the identity handshake, then loads profile and roles concurrently.
    ///
    /// Only the first call does anything; later calls return the current phase.
    /// The token is published while still `Loading` so that the phase flips to
    /// `Authenticated` together with profile and roles. Profile or role fetch
    /// failures leave those empty.
    pub async fn initialize(&self, on_load: OnLoad) -> Phase {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.snapshot().phase;
        }

        let notify = |url: &str| {
            let url = url.to_string();
            self.state.send_modify(|s| s.login_url = Some(url));
        };

        let token = match self.provider.init(on_load, &notify).await {
            Ok(InitOutcome::Authenticated { token }) => token,
            Ok(InitOutcome::Unauthenticated) => {
                tracing::info!("no session established");
                self.state.send_replace(Session::unauthenticated(None));
                return Phase::Unauthenticated;
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "identity handshake failed");
                self.state
                    .send_replace(Session::unauthenticated(Some(format!("{err:#}"))));
                return Phase::Unauthenticated;
            }
        };

        tracing::debug!(token = %mask_token(&token), "token acquired");
        self.state.send_modify(|s| {
            s.token = Some(token.clone());
            s.login_url = None;
        });

        let (profile, roles) =
            tokio::join!(self.provider.userinfo(&token), self.api.roles(&token));
        let profile = profile
            .inspect_err(|err| tracing::warn!(error = %format!("{err:#}"), "userinfo failed"))
            .ok();
        let roles: BTreeSet<String> = roles
            .inspect_err(|err| tracing::warn!(error = %err, status = ?err.status, "role fetch failed"))
            .map(|roles| roles.into_iter().collect())
            .unwrap_or_default();

        tracing::info!(roles = ?roles, "session established");
        self.state.send_modify(|s| {
            s.phase = Phase::Authenticated;
            s.profile = profile;
            s.roles = roles;
        });
        Phase::Authenticated
    }

    /// One refresh tick: renew the token if it expires within the minimum
    /// validity window. A failed renewal ends the session.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        if !self.state.borrow().is_authenticated() {
            return RefreshOutcome::Skipped;
        }

        match self.provider.update_token(self.refresh.min_validity()).await {
            Ok(Some(token)) => {
                let applied = self.state.send_if_modified(|s| {
                    if s.phase != Phase::Authenticated {
                        return false;
                    }
                    s.token = Some(token.clone());
                    true
                });
                if !applied {
                    tracing::debug!("renewed token discarded, session already ended");
                    return RefreshOutcome::Skipped;
                }
                tracing::info!(token = %mask_token(&token), "access token renewed");
                RefreshOutcome::Renewed
            }
            Ok(None) => RefreshOutcome::Fresh,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "token renewal failed, logging out");
                if let Err(err) = self.logout().await {
                    tracing::warn!(error = %format!("{err:#}"), "logout after failed renewal");
                }
                RefreshOutcome::LoggedOut
            }
        }
    }

    /// Clears the session, then ends it at the provider.
    ///
    /// Returns the provider's logout URL.
    ///
    /// # Errors
    /// Returns an error if the provider logout fails; local state is cleared
    /// regardless.
    pub async fn logout(&self) -> anyhow::Result<String> {
        self.state.send_replace(Session::unauthenticated(None));
        tracing::info!("session cleared");
        self.provider.logout().await
    }
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Starts the periodic refresh loop (first tick after one interval).
    ///
    /// The loop stops when the handle is dropped or a renewal fails.
    pub fn start_refresh_loop(self: &Arc<Self>) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let store = Arc::clone(self);
        let period = self.refresh.interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if store.refresh_once().await == RefreshOutcome::LoggedOut {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("refresh loop stopped");
        });

        RefreshHandle { cancel }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ApiConfig;
    use crate::identity::RedirectNotifier;

    #[derive(Default)]
    struct FakeProvider {
        init: Mutex<Option<Result<InitOutcome>>>,
        updates: Mutex<VecDeque<Result<Option<String>>>>,
        profile: Option<Profile>,
        init_calls: AtomicUsize,
        update_calls: AtomicUsize,
        logout_calls: AtomicUsize,
        renewal_gate: Option<Arc<Notify>>,
    }

    impl FakeProvider {
        fn authenticated(token: &str) -> Self {
            Self {
                init: Mutex::new(Some(Ok(InitOutcome::Authenticated {
                    token: token.to_string(),
                }))),
                profile: Some(Profile {
                    given_name: Some("Ada".to_string()),
                    family_name: Some("Lovelace".to_string()),
                    email: Some("ada@example.com".to_string()),
                    preferred_username: Some("ada".to_string()),
                }),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                init: Mutex::new(Some(Err(anyhow!("identity provider unreachable")))),
                ..Self::default()
            }
        }

        fn with_updates(self, updates: Vec<Result<Option<String>>>) -> Self {
            *self.updates.lock().unwrap() = updates.into();
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.renewal_gate = Some(gate);
            self
        }
    }

    impl IdentityProvider for FakeProvider {
        async fn init(&self, _on_load: OnLoad, on_redirect: RedirectNotifier<'_>) -> Result<InitOutcome> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            on_redirect("http://idp/auth?state=x");
            self.init
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(InitOutcome::Unauthenticated))
        }

        async fn update_token(&self, _min_validity: Duration) -> Result<Option<String>> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.renewal_gate {
                gate.notified().await;
            }
            self.updates.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn userinfo(&self, _token: &str) -> Result<Profile> {
            self.profile.clone().ok_or_else(|| anyhow!("userinfo failed"))
        }

        async fn logout(&self) -> Result<String> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            Ok("http://idp/logout".to_string())
        }
    }

    fn api(base: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: format!("{base}/api"),
            timeout_secs: 5,
            max_retries: 0,
            retry_backoff_ms: 1,
        })
        .unwrap()
    }

    fn refresh_config() -> RefreshConfig {
        RefreshConfig {
            interval_secs: 30,
            min_validity_secs: 60,
        }
    }

    async fn mount_me(server: &MockServer, roles: serde_json::Value, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"realm_access": {"roles": roles}})),
            )
            .expect(expected)
            .mount(server)
            .await;
    }

    fn authenticate(store: &SessionStore<FakeProvider>, token: &str) {
        store.started.store(true, Ordering::SeqCst);
        store.state.send_modify(|s| {
            s.phase = Phase::Authenticated;
            s.token = Some(token.to_string());
        });
    }

    #[test]
    fn test_has_role_false_while_loading() {
        let session = Session {
            roles: BTreeSet::from(["admin".to_string()]),
            ..Session::default()
        };
        assert_eq!(session.phase, Phase::Loading);
        assert!(!session.has_role("admin"));
        assert_eq!(session.access(), Access::default());
    }

    #[test]
    fn test_access_accepts_prefixed_roles() {
        let mut session = Session {
            phase: Phase::Authenticated,
            roles: BTreeSet::from(["ROLE_STUDENT".to_string()]),
            ..Session::default()
        };
        assert_eq!(
            session.access(),
            Access {
                courses: true,
                manage_courses: false
            }
        );
        assert!(!session.has_role("student"));

        session.roles = BTreeSet::from(["STUDENT".to_string()]);
        assert!(session.access().courses);
        assert!(!session.access().manage_courses);

        session.roles = BTreeSet::from(["Admin".to_string()]);
        assert!(session.access().manage_courses);

        session.roles = BTreeSet::from(["role_admin".to_string()]);
        assert!(session.access().manage_courses);

        session.roles = BTreeSet::from(["admin".to_string()]);
        assert_eq!(
            session.access(),
            Access {
                courses: true,
                manage_courses: true
            }
        );

        session.roles = BTreeSet::from(["offline_access".to_string()]);
        assert_eq!(session.access(), Access::default());
    }

    #[tokio::test]
    async fn test_initialize_loads_profile_and_roles() {
        let server = MockServer::start().await;
        mount_me(&server, serde_json::json!(["student", "admin"]), 1).await;

        let store = SessionStore::new(
            FakeProvider::authenticated("tok"),
            api(&server.uri()),
            refresh_config(),
        );
        assert_eq!(store.initialize(OnLoad::LoginRequired).await, Phase::Authenticated);

        let session = store.snapshot();
        assert_eq!(session.token.as_deref(), Some("tok"));
        assert!(session.has_role("student"));
        assert!(session.has_role("admin"));
        assert!(!session.has_role("instructor"));
        assert_eq!(session.display_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(session.email(), Some("ada@example.com"));
        assert_eq!(session.login_url, None);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let server = MockServer::start().await;
        mount_me(&server, serde_json::json!(["student"]), 1).await;

        let store = SessionStore::new(
            FakeProvider::authenticated("tok"),
            api(&server.uri()),
            refresh_config(),
        );
        store.initialize(OnLoad::LoginRequired).await;
        assert_eq!(store.initialize(OnLoad::LoginRequired).await, Phase::Authenticated);
        assert_eq!(store.provider().init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_unauthenticated_without_roles() {
        let server = MockServer::start().await;
        mount_me(&server, serde_json::json!(["admin"]), 0).await;

        let store = SessionStore::new(FakeProvider::failing(), api(&server.uri()), refresh_config());
        assert_eq!(
            store.initialize(OnLoad::LoginRequired).await,
            Phase::Unauthenticated
        );

        let session = store.snapshot();
        assert!(session.roles.is_empty());
        assert!(!session.has_role("admin"));
        assert!(session.failure.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_role_fetch_failure_leaves_roles_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut provider = FakeProvider::authenticated("tok");
        provider.profile = None;
        let store = SessionStore::new(provider, api(&server.uri()), refresh_config());
        assert_eq!(store.initialize(OnLoad::LoginRequired).await, Phase::Authenticated);

        let session = store.snapshot();
        assert!(session.roles.is_empty());
        assert_eq!(session.profile, None);
        assert_eq!(session.access(), Access::default());
    }

    #[tokio::test]
    async fn test_login_url_published_while_loading() {
        let store = SessionStore::new(
            FakeProvider::default(),
            api("http://127.0.0.1:9"),
            refresh_config(),
        );
        let mut rx = store.subscribe();
        assert_eq!(store.initialize(OnLoad::CheckSso).await, Phase::Unauthenticated);

        // The receiver saw the change; the final snapshot no longer carries it.
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().login_url, None);
    }

    #[tokio::test]
    async fn test_refresh_once_updates_token() {
        let store = SessionStore::new(
            FakeProvider::default().with_updates(vec![Ok(Some("tok-2".to_string())), Ok(None)]),
            api("http://127.0.0.1:9"),
            refresh_config(),
        );
        assert_eq!(store.refresh_once().await, RefreshOutcome::Skipped);

        authenticate(&store, "tok-1");
        assert_eq!(store.refresh_once().await, RefreshOutcome::Renewed);
        assert_eq!(store.snapshot().token.as_deref(), Some("tok-2"));
        assert_eq!(store.refresh_once().await, RefreshOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let store = SessionStore::new(
            FakeProvider::default().with_updates(vec![Err(anyhow!("invalid_grant"))]),
            api("http://127.0.0.1:9"),
            refresh_config(),
        );
        authenticate(&store, "tok");
        store.state.send_modify(|s| {
            s.roles.insert("admin".to_string());
        });

        assert_eq!(store.refresh_once().await, RefreshOutcome::LoggedOut);
        let session = store.snapshot();
        assert_eq!(session.phase, Phase::Unauthenticated);
        assert_eq!(session.token, None);
        assert!(session.roles.is_empty());
        assert_eq!(store.provider().logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_renewal_after_logout_is_discarded() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(SessionStore::new(
            FakeProvider::default()
                .with_updates(vec![Ok(Some("renewed".to_string()))])
                .gated(Arc::clone(&gate)),
            api("http://127.0.0.1:9"),
            refresh_config(),
        ));
        authenticate(&store, "tok");

        let renewal = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.refresh_once().await }
        });
        while store.provider().update_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        store.logout().await.unwrap();
        gate.notify_one();

        assert_eq!(renewal.await.unwrap(), RefreshOutcome::Skipped);
        let session = store.snapshot();
        assert_eq!(session.phase, Phase::Unauthenticated);
        assert_eq!(session.token, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ticks_until_dropped() {
        let store = Arc::new(SessionStore::new(
            FakeProvider::default(),
            api("http://127.0.0.1:9"),
            refresh_config(),
        ));
        authenticate(&store, "tok");
        let calls = || store.provider().update_calls.load(Ordering::SeqCst);

        let handle = store.start_refresh_loop();
        assert!(handle.is_active());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(calls(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls(), 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_stops_after_forced_logout() {
        let store = Arc::new(SessionStore::new(
            FakeProvider::default().with_updates(vec![Err(anyhow!("expired"))]),
            api("http://127.0.0.1:9"),
            refresh_config(),
        ));
        authenticate(&store, "tok");

        let _handle = store.start_refresh_loop();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.snapshot().phase, Phase::Unauthenticated);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.provider().update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.provider().logout_calls.load(Ordering::SeqCst), 1);
    }
}
