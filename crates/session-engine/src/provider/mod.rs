//! Provider strategies: how each backend fetches, refreshes and clears a
//! session and how it signs users in, up and out.

mod authjs;
mod local;
mod refresh;

pub use authjs::{AuthJsProvider, AuthJsProviderInfo};
pub use local::LocalProvider;
pub use refresh::RefreshProvider;

use crate::navigation::NavigationTarget;
use crate::tokens::SessionTokens;
use crate::transport::AuthTransport;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use auth_config::{Config, ProviderConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use token_storage::TokenStorage;

/// Which provider is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AuthJs,
    Local,
    Refresh,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AuthJs => "authjs",
            ProviderKind::Local => "local",
            ProviderKind::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a session fetch that reached the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Session(Value),
    /// The endpoint confirmed there is no session.
    SignedOut,
}

/// Sign-in input as handed to a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignInRequest {
    /// Provider id (authjs only).
    pub provider: Option<String>,
    pub credentials: Option<Value>,
    pub callback_url: Option<String>,
    /// Caller wants to be redirected once signed in.
    pub redirect: bool,
    /// Extra query parameters for the authorization request (authjs only).
    pub authorization_params: Vec<(String, String)>,
}

/// Sign-in result reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResult {
    pub ok: bool,
    pub status: u16,
    pub error: Option<String>,
    /// Where the provider wants the user to go next.
    pub url: Option<String>,
}

impl SignInResult {
    pub(crate) fn success() -> Self {
        Self {
            ok: true,
            status: 200,
            error: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// The flow continues elsewhere (sign-in page, OAuth consent screen).
    Redirect(NavigationTarget),
    /// The endpoint answered; on success the session is established.
    Completed(SignInResult),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignOutRequest {
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignOutOutcome {
    /// Provider-mandated redirect, overriding the caller's callback URL.
    pub redirect: Option<NavigationTarget>,
}

/// Capability interface shared by all providers.
///
/// Optional capabilities default to `AuthError::Unsupported`, returned before
/// any network call.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether `get_session` needs the network. `force` always does.
    fn should_fetch(&self, _force: bool) -> AuthResult<bool> {
        Ok(true)
    }

    /// Call the session endpoint. Auth rejections map to `SignedOut`.
    async fn fetch_session(&self) -> AuthResult<SessionOutcome>;

    async fn get_csrf_token(&self) -> AuthResult<String> {
        Err(AuthError::unsupported("get_csrf_token", self.kind()))
    }

    async fn get_providers(&self) -> AuthResult<BTreeMap<String, AuthJsProviderInfo>> {
        Err(AuthError::unsupported("get_providers", self.kind()))
    }

    async fn sign_in(&self, request: SignInRequest) -> AuthResult<SignInOutcome>;

    /// Register an account. Returns the endpoint's response body.
    async fn sign_up(&self, _credentials: &Value) -> AuthResult<Value> {
        Err(AuthError::unsupported("sign_up", self.kind()))
    }

    async fn sign_out(&self, request: SignOutRequest) -> AuthResult<SignOutOutcome>;

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self) -> AuthResult<()> {
        Err(AuthError::unsupported("refresh", self.kind()))
    }

    fn set_token(&self, _raw: &str) -> AuthResult<()> {
        Err(AuthError::unsupported("set_token", self.kind()))
    }

    fn clear_token(&self) -> AuthResult<()> {
        Err(AuthError::unsupported("clear_token", self.kind()))
    }

    /// Token pair, for providers that carry tokens.
    fn tokens(&self) -> Option<&SessionTokens> {
        None
    }

    /// Where `required` sessions send unauthenticated users.
    fn sign_in_page(&self, callback_url: Option<&str>) -> AuthResult<NavigationTarget>;
}

/// Build the configured provider. Called once; the provider never changes.
pub fn build_provider(
    config: &Config,
    transport: Arc<dyn AuthTransport>,
    storage: Arc<dyn TokenStorage>,
) -> AuthResult<Arc<dyn ProviderStrategy>> {
    let provider: Arc<dyn ProviderStrategy> = match &config.provider {
        ProviderConfig::Authjs(authjs) => Arc::new(AuthJsProvider::new(
            authjs.clone(),
            config.base_url()?,
            transport,
        )),
        ProviderConfig::Local(local) => {
            Arc::new(LocalProvider::new(local.clone(), transport, storage)?)
        }
        ProviderConfig::Refresh(refresh) => {
            Arc::new(RefreshProvider::new(refresh.clone(), transport, storage)?)
        }
    };
    Ok(provider)
}

/// Resolve a JSON pointer. `/` selects the whole document.
pub(crate) fn extract<'a>(body: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer == "/" || pointer.is_empty() {
        Some(body)
    } else {
        body.pointer(pointer)
    }
}

/// Non-empty string at `pointer`.
pub(crate) fn extract_string(body: &Value, pointer: &str) -> Option<String> {
    match extract(body, pointer)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

/// Build the smallest document holding `value` at `pointer`:
/// `/a/b` becomes `{"a": {"b": value}}`.
pub(crate) fn nest_at_pointer(pointer: &str, value: Value) -> Value {
    pointer
        .split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .fold(value, |inner, segment| {
            let key = segment.replace("~1", "/").replace("~0", "~");
            let mut map = Map::new();
            map.insert(key, inner);
            Value::Object(map)
        })
}

/// Credentials must be a JSON object; checked before any request.
pub(crate) fn require_object<'a>(
    credentials: Option<&'a Value>,
    operation: &str,
) -> AuthResult<&'a Map<String, Value>> {
    match credentials {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(AuthError::Config(format!(
            "{} credentials must be a JSON object",
            operation
        ))),
        None => Err(AuthError::Config(format!(
            "{} requires credentials",
            operation
        ))),
    }
}

/// Best-effort text of a response body for error messages.
pub(crate) fn body_text(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        other => other.to_string(),
    }
}
