//! `Auth`: the public session surface.
//!
//! Composes the session manager, the refresh scheduler and the injected
//! navigator, and applies the redirect policy after each verb. Every verb
//! returns only once the session state has been updated.

use crate::focus::FocusSignal;
use crate::navigation::{navigate_or_warn, NavigationTarget, Navigator};
use crate::provider::{
    build_provider, AuthJsProviderInfo, ProviderKind, ProviderStrategy, SignInOutcome,
    SignInRequest, SignInResult, SignOutRequest,
};
use crate::scheduler::RefreshScheduler;
use crate::session::SessionManager;
use crate::state::{SessionData, SessionSnapshot, SessionStateStore, SessionStatus};
use crate::transport::{AuthTransport, ReqwestTransport};
use crate::AuthResult;
use auth_config::Config;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use token_storage::TokenStorage;
use tokio::sync::watch;
use tracing::{info, warn};

/// Hook run instead of the sign-in redirect for required sessions.
pub type UnauthenticatedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct GetSessionOptions {
    /// Call the endpoint even when no token is stored.
    pub force: bool,
    /// Send unauthenticated users to the sign-in page.
    pub required: bool,
    pub callback_url: Option<String>,
    pub external: bool,
    pub on_unauthenticated: Option<UnauthenticatedHook>,
}

impl std::fmt::Debug for GetSessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetSessionOptions")
            .field("force", &self.force)
            .field("required", &self.required)
            .field("callback_url", &self.callback_url)
            .field("external", &self.external)
            .field("on_unauthenticated", &self.on_unauthenticated.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SignInOptions {
    pub callback_url: Option<String>,
    pub external: bool,
    pub redirect: bool,
    /// Refetch the session after a successful sign-in.
    pub call_get_session: bool,
    /// Provider id (authjs only).
    pub provider: Option<String>,
    pub authorization_params: Vec<(String, String)>,
}

impl Default for SignInOptions {
    fn default() -> Self {
        Self {
            callback_url: None,
            external: false,
            redirect: true,
            call_get_session: true,
            provider: None,
            authorization_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignUpOptions {
    pub callback_url: Option<String>,
    pub external: bool,
    pub redirect: bool,
}

impl Default for SignUpOptions {
    fn default() -> Self {
        Self {
            callback_url: None,
            external: false,
            redirect: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUpExtra {
    /// Do not sign in with the new account.
    pub prevent_login_flow: bool,
}

#[derive(Debug, Clone)]
pub struct SignOutOptions {
    pub callback_url: Option<String>,
    pub external: bool,
    pub redirect: bool,
}

impl Default for SignOutOptions {
    fn default() -> Self {
        Self {
            callback_url: None,
            external: false,
            redirect: true,
        }
    }
}

pub struct Auth {
    config: Config,
    session: Arc<SessionManager>,
    scheduler: RefreshScheduler,
    navigator: Arc<dyn Navigator>,
    focus: FocusSignal,
}

impl Auth {
    /// Validate the configuration and wire up the configured provider.
    pub fn new(
        config: Config,
        transport: Arc<dyn AuthTransport>,
        storage: Arc<dyn TokenStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let provider = build_provider(&config, transport, storage)?;
        let session = Arc::new(SessionManager::new(
            provider,
            Arc::new(SessionStateStore::new()),
        ));
        let scheduler = RefreshScheduler::new(Arc::clone(&session), &config.session_refresh);

        info!(provider = config.provider.name(), base_url = %config.base_url, "Auth initialized");
        Ok(Self {
            config,
            session,
            scheduler,
            navigator,
            focus: FocusSignal::new(),
        })
    }

    /// Same as `new`, talking HTTP through `reqwest`.
    pub fn from_config(
        config: Config,
        storage: Arc<dyn TokenStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> AuthResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.base_url()?)?);
        Self::new(config, transport, storage, navigator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider().kind()
    }

    fn provider(&self) -> &Arc<dyn ProviderStrategy> {
        self.session.provider()
    }

    fn state(&self) -> &Arc<SessionStateStore> {
        self.session.state()
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status()
    }

    pub fn data(&self) -> SessionData {
        self.state().data()
    }

    pub fn loading(&self) -> bool {
        self.state().loading()
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_refreshed_at()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state().subscribe()
    }

    /// Decorated access token (`None` for cookie-backed providers).
    pub fn token(&self) -> AuthResult<Option<String>> {
        match self.provider().tokens() {
            Some(tokens) => tokens.token(),
            None => Ok(None),
        }
    }

    pub fn raw_token(&self) -> AuthResult<Option<String>> {
        match self.provider().tokens() {
            Some(tokens) => tokens.raw_token(),
            None => Ok(None),
        }
    }

    pub fn refresh_token(&self) -> AuthResult<Option<String>> {
        match self.provider().tokens() {
            Some(tokens) => tokens.refresh_token(),
            None => Ok(None),
        }
    }

    pub fn raw_refresh_token(&self) -> AuthResult<Option<String>> {
        match self.provider().tokens() {
            Some(tokens) => tokens.raw_refresh_token(),
            None => Ok(None),
        }
    }

    /// Subscribe to raw access token changes.
    pub fn subscribe_token(&self) -> Option<watch::Receiver<Option<String>>> {
        self.provider().tokens().map(|tokens| tokens.subscribe())
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn focus(&self) -> &FocusSignal {
        &self.focus
    }

    /// Report that the app regained focus.
    pub fn notify_focus(&self) {
        self.focus.notify();
    }

    /// Arm automatic refresh. Returns false when nothing is configured.
    pub fn start(&self) -> AuthResult<bool> {
        self.scheduler.arm(&self.focus)
    }

    /// Disarm automatic refresh.
    pub fn shutdown(&self) {
        self.scheduler.disarm();
    }

    fn navigate(&self, target: &NavigationTarget) {
        navigate_or_warn(self.navigator.as_ref(), target);
    }

    fn navigate_to_sign_in(&self, callback_url: Option<&str>) {
        match self.provider().sign_in_page(callback_url) {
            Ok(target) => self.navigate(&target),
            Err(e) => warn!(error = %e, "Skipping redirect to sign-in page"),
        }
    }

    /// Fetch the session. Resolves to `None` when signed out.
    pub async fn get_session(&self, options: GetSessionOptions) -> AuthResult<Option<Value>> {
        let data = self.session.get_session(options.force).await?;

        if options.required && !data.is_present() {
            match &options.on_unauthenticated {
                Some(hook) => hook(),
                None => self.navigate_to_sign_in(options.callback_url.as_deref()),
            }
            return Ok(None);
        }

        if let Some(callback_url) = &options.callback_url {
            self.navigate(&NavigationTarget::new(callback_url.clone(), options.external));
        }
        Ok(data.as_value().cloned())
    }

    pub async fn get_csrf_token(&self) -> AuthResult<String> {
        self.provider().get_csrf_token().await
    }

    pub async fn get_providers(&self) -> AuthResult<BTreeMap<String, AuthJsProviderInfo>> {
        self.provider().get_providers().await
    }

    pub async fn sign_in(
        &self,
        credentials: Option<Value>,
        options: SignInOptions,
    ) -> AuthResult<SignInResult> {
        let request = SignInRequest {
            provider: options.provider.clone(),
            credentials,
            callback_url: options.callback_url.clone(),
            redirect: options.redirect,
            authorization_params: options.authorization_params.clone(),
        };

        match self.session.sign_in(request, options.call_get_session).await? {
            SignInOutcome::Redirect(target) => {
                self.navigate(&target);
                Ok(SignInResult {
                    ok: true,
                    status: 200,
                    error: None,
                    url: Some(target.url),
                })
            }
            SignInOutcome::Completed(result) => {
                if result.ok && options.redirect {
                    let target = match (&result.url, &options.callback_url) {
                        (Some(url), _) => Some(NavigationTarget::external(url.clone())),
                        (None, Some(callback_url)) => Some(NavigationTarget::new(
                            callback_url.clone(),
                            options.external,
                        )),
                        (None, None) => None,
                    };
                    if let Some(target) = target {
                        self.navigate(&target);
                    }
                }
                Ok(result)
            }
        }
    }

    /// Register, then sign in with the same credentials unless
    /// `prevent_login_flow` is set. Returns the sign-up response body.
    pub async fn sign_up(
        &self,
        credentials: Value,
        options: SignUpOptions,
        extra: SignUpExtra,
    ) -> AuthResult<Value> {
        let response = self.session.sign_up(&credentials).await?;

        if extra.prevent_login_flow {
            if options.redirect {
                match &options.callback_url {
                    Some(callback_url) => self.navigate(&NavigationTarget::new(
                        callback_url.clone(),
                        options.external,
                    )),
                    None => self.navigate_to_sign_in(None),
                }
            }
            return Ok(response);
        }

        self.sign_in(
            Some(credentials),
            SignInOptions {
                callback_url: options.callback_url,
                external: options.external,
                redirect: options.redirect,
                ..Default::default()
            },
        )
        .await?;
        Ok(response)
    }

    pub async fn sign_out(&self, options: SignOutOptions) -> AuthResult<()> {
        let outcome = self
            .session
            .sign_out(SignOutRequest {
                callback_url: options.callback_url.clone(),
            })
            .await?;

        if options.redirect {
            let target = outcome.redirect.or_else(|| {
                options
                    .callback_url
                    .clone()
                    .map(|callback_url| NavigationTarget::new(callback_url, options.external))
            });
            if let Some(target) = target {
                self.navigate(&target);
            }
        }
        Ok(())
    }

    /// Rotate the access token (refresh provider only).
    pub async fn refresh(&self) -> AuthResult<()> {
        self.session.refresh().await
    }

    /// Store a raw token. Call `get_session` to revalidate.
    pub fn set_token(&self, raw: &str) -> AuthResult<()> {
        self.session.set_token(raw)
    }

    /// Drop stored tokens. Status changes on the next `get_session`.
    pub fn clear_token(&self) -> AuthResult<()> {
        self.session.clear_token()
    }
}

impl Drop for Auth {
    fn drop(&mut self) {
        self.scheduler.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, RecordingNavigator};
    use crate::AuthError;
    use auth_config::{
        AuthJsProviderConfig, LocalProviderConfig, ProviderConfig, RefreshProviderConfig,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use token_storage::MemoryStorage;

    struct Harness {
        auth: Auth,
        transport: Arc<MockTransport>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(provider: ProviderConfig) -> Harness {
        let config = Config {
            provider,
            ..Default::default()
        };
        let transport = Arc::new(MockTransport::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let auth = Auth::new(
            config,
            transport.clone(),
            Arc::new(MemoryStorage::default()),
            navigator.clone(),
        )
        .unwrap();
        Harness {
            auth,
            transport,
            navigator,
        }
    }

    fn local() -> Harness {
        harness(ProviderConfig::Local(LocalProviderConfig::default()))
    }

    fn credentials() -> Value {
        json!({ "username": "ada", "password": "hunter2" })
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut local = LocalProviderConfig::default();
        local.endpoints.get_session.path = "session".to_string();
        let config = Config {
            provider: ProviderConfig::Local(local),
            ..Default::default()
        };

        let result = Auth::new(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MemoryStorage::default()),
            Arc::new(RecordingNavigator::new()),
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_oversized_token_lifetime_is_a_config_error() {
        let mut local = LocalProviderConfig::default();
        local.token.max_age_in_seconds = Some(u64::MAX / 2);
        let config = Config {
            provider: ProviderConfig::Local(local),
            ..Default::default()
        };

        let result = Auth::new(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MemoryStorage::default()),
            Arc::new(RecordingNavigator::new()),
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn test_sign_up_prevent_login_with_redirect_navigates_only() {
        let h = local();
        h.transport.respond("/register", 200, json!({ "id": 1 }));

        let response = h
            .auth
            .sign_up(
                credentials(),
                SignUpOptions {
                    redirect: true,
                    ..Default::default()
                },
                SignUpExtra {
                    prevent_login_flow: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(response, json!({ "id": 1 }));
        assert_eq!(h.auth.status(), SessionStatus::Unauthenticated);
        assert_eq!(h.transport.calls("/login"), 0);
        assert_eq!(h.navigator.targets(), vec![NavigationTarget::internal("/login")]);
    }

    #[tokio::test]
    async fn test_sign_up_prevent_login_without_redirect_does_nothing_else() {
        let h = local();
        h.transport.respond("/register", 200, json!({ "id": 1 }));

        h.auth
            .sign_up(
                credentials(),
                SignUpOptions {
                    redirect: false,
                    callback_url: Some("/welcome".to_string()),
                    ..Default::default()
                },
                SignUpExtra {
                    prevent_login_flow: true,
                },
            )
            .await
            .unwrap();

        assert!(h.navigator.targets().is_empty());
        assert_eq!(h.auth.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_plain_sign_up_authenticates_without_navigation() {
        let h = local();
        h.transport.respond("/register", 200, json!({ "id": 1 }));
        h.transport.respond("/login", 200, json!({ "token": "abc" }));
        h.transport.respond("/session", 200, json!({ "id": 1, "name": "ada" }));

        h.auth
            .sign_up(credentials(), SignUpOptions::default(), SignUpExtra::default())
            .await
            .unwrap();

        assert_eq!(h.auth.status(), SessionStatus::Authenticated);
        assert!(h.navigator.targets().is_empty());
        assert_eq!(h.auth.token().unwrap().as_deref(), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_sign_up_with_callback_navigates_after_sign_in() {
        let h = local();
        h.transport.respond("/register", 200, json!({ "id": 1 }));
        h.transport.respond("/login", 200, json!({ "token": "abc" }));
        h.transport.respond("/session", 200, json!({ "id": 1 }));

        h.auth
            .sign_up(
                credentials(),
                SignUpOptions {
                    callback_url: Some("https://example.com/welcome".to_string()),
                    external: true,
                    ..Default::default()
                },
                SignUpExtra::default(),
            )
            .await
            .unwrap();

        assert_eq!(h.auth.status(), SessionStatus::Authenticated);
        assert_eq!(
            h.navigator.targets(),
            vec![NavigationTarget::external("https://example.com/welcome")]
        );
    }

    #[tokio::test]
    async fn test_sign_in_navigates_to_callback() {
        let h = local();
        h.transport.respond("/login", 200, json!({ "token": "abc" }));
        h.transport.respond("/session", 200, json!({ "id": 1 }));

        let result = h
            .auth
            .sign_in(
                Some(credentials()),
                SignInOptions {
                    callback_url: Some("/dashboard".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(result.ok);
        assert_eq!(h.auth.status(), SessionStatus::Authenticated);
        assert_eq!(
            h.navigator.targets(),
            vec![NavigationTarget::internal("/dashboard")]
        );
    }

    #[tokio::test]
    async fn test_sign_in_without_session_fetch() {
        let h = local();
        h.transport.respond("/login", 200, json!({ "token": "abc" }));

        h.auth
            .sign_in(
                Some(credentials()),
                SignInOptions {
                    call_get_session: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(h.transport.calls("/session"), 0);
        assert_eq!(h.auth.raw_token().unwrap().as_deref(), Some("abc"));
        assert_eq!(h.auth.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_redirect_failure_is_not_fatal() {
        let h = local();
        h.transport.respond("/login", 200, json!({ "token": "abc" }));
        h.transport.respond("/session", 200, json!({ "id": 1 }));
        h.navigator.refuse();

        let result = h
            .auth
            .sign_in(
                Some(credentials()),
                SignInOptions {
                    callback_url: Some("not a path".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(result.ok);
        assert_eq!(h.auth.status(), SessionStatus::Authenticated);
        assert!(h.navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn test_required_session_redirects_to_sign_in() {
        let h = local();

        let data = h
            .auth
            .get_session(GetSessionOptions {
                required: true,
                callback_url: Some("/private".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(data.is_none());
        assert_eq!(
            h.navigator.targets(),
            vec![NavigationTarget::internal("/login?callbackUrl=%2Fprivate")]
        );
    }

    #[tokio::test]
    async fn test_required_session_runs_hook_instead() {
        let h = local();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);

        h.auth
            .get_session(GetSessionOptions {
                required: true,
                on_unauthenticated: Some(Arc::new(move || {
                    hook_calls.fetch_add(1, Ordering::SeqCst);
                })),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn test_get_session_callback_navigates() {
        let h = local();
        h.auth.set_token("abc").unwrap();
        h.transport.respond("/session", 200, json!({ "id": 1 }));

        let data = h
            .auth
            .get_session(GetSessionOptions {
                callback_url: Some("/home".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(data, Some(json!({ "id": 1 })));
        assert_eq!(h.navigator.targets(), vec![NavigationTarget::internal("/home")]);
    }

    #[tokio::test]
    async fn test_hard_navigation_to_rooted_path() {
        let h = local();
        h.auth.set_token("abc").unwrap();
        h.transport.respond("/session", 200, json!({ "id": 1 }));

        h.auth
            .get_session(GetSessionOptions {
                callback_url: Some("/dashboard".to_string()),
                external: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            h.navigator.targets(),
            vec![NavigationTarget::external("/dashboard")]
        );
    }

    #[tokio::test]
    async fn test_sign_out_navigates_to_callback() {
        let h = local();
        h.auth.set_token("abc").unwrap();
        h.transport.respond("/session", 200, json!({ "id": 1 }));
        h.transport.respond("/logout", 200, Value::Null);
        h.auth.get_session(GetSessionOptions::default()).await.unwrap();

        h.auth
            .sign_out(SignOutOptions {
                callback_url: Some("/bye".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(h.auth.status(), SessionStatus::Unauthenticated);
        assert!(h.auth.token().unwrap().is_none());
        assert_eq!(h.navigator.targets(), vec![NavigationTarget::internal("/bye")]);
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_provider() {
        let h = local();
        assert!(matches!(
            h.auth.refresh().await,
            Err(AuthError::Unsupported { .. })
        ));

        let h = harness(ProviderConfig::Refresh(RefreshProviderConfig::default()));
        h.transport.respond(
            "/refresh",
            200,
            json!({ "token": "a2", "refreshToken": "r2" }),
        );
        h.auth.set_token("a1").unwrap();
        h.auth
            .session
            .provider()
            .tokens()
            .unwrap()
            .set_refresh_token("r1")
            .unwrap();

        h.auth.refresh().await.unwrap();

        assert_eq!(h.auth.token().unwrap().as_deref(), Some("Bearer a2"));
        assert_eq!(h.auth.refresh_token().unwrap().as_deref(), Some("r2"));
        assert!(h.auth.last_refreshed_at().is_some());
    }

    #[tokio::test]
    async fn test_authjs_sign_in_without_provider_goes_to_sign_in_page() {
        let h = harness(ProviderConfig::Authjs(AuthJsProviderConfig::default()));

        let result = h
            .auth
            .sign_in(
                None,
                SignInOptions {
                    callback_url: Some("/after".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let expected = "http://localhost:3000/api/auth/signin?callbackUrl=%2Fafter";
        assert_eq!(result.url.as_deref(), Some(expected));
        assert_eq!(h.navigator.targets(), vec![NavigationTarget::external(expected)]);
        assert!(h.auth.token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authjs_sign_out_follows_provider_url() {
        let h = harness(ProviderConfig::Authjs(AuthJsProviderConfig::default()));
        h.transport.respond("/session", 200, json!({ "user": { "name": "ada" } }));
        h.transport.respond("/csrf", 200, json!({ "csrfToken": "c1" }));
        h.transport.respond("/signout", 200, json!({ "url": "http://localhost:3000/" }));
        h.auth.get_session(GetSessionOptions::default()).await.unwrap();
        assert_eq!(h.auth.status(), SessionStatus::Authenticated);

        h.auth.sign_out(SignOutOptions::default()).await.unwrap();

        assert_eq!(h.auth.status(), SessionStatus::Unauthenticated);
        assert_eq!(
            h.navigator.targets(),
            vec![NavigationTarget::external("http://localhost:3000/")]
        );
    }
}
