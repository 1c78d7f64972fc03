//! Credential-based provider issuing a bearer token.

use super::{
    body_text, extract, extract_string, require_object, ProviderKind, ProviderStrategy,
    SessionOutcome, SignInOutcome, SignInRequest, SignInResult, SignOutOutcome, SignOutRequest,
};
use crate::navigation::NavigationTarget;
use crate::tokens::SessionTokens;
use crate::transport::{AuthRequest, AuthResponse, AuthTransport};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use auth_config::LocalProviderConfig;
use serde_json::Value;
use std::sync::Arc;
use token_storage::TokenStorage;
use tracing::{debug, info, warn};

pub struct LocalProvider {
    config: LocalProviderConfig,
    transport: Arc<dyn AuthTransport>,
    tokens: SessionTokens,
    kind: ProviderKind,
}

impl LocalProvider {
    pub fn new(
        config: LocalProviderConfig,
        transport: Arc<dyn AuthTransport>,
        storage: Arc<dyn TokenStorage>,
    ) -> AuthResult<Self> {
        let tokens = SessionTokens::new(storage, &config.token)?;
        Ok(Self::from_parts(config, transport, tokens, ProviderKind::Local))
    }

    /// Assemble a provider around an existing token pair. The refresh
    /// provider reuses the local flows this way.
    pub(crate) fn from_parts(
        config: LocalProviderConfig,
        transport: Arc<dyn AuthTransport>,
        tokens: SessionTokens,
        kind: ProviderKind,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
            kind,
        }
    }

    pub(crate) fn session_tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    pub(crate) fn transport(&self) -> &Arc<dyn AuthTransport> {
        &self.transport
    }

    /// Attach the configured auth header when a token is stored.
    pub(crate) fn authorized(&self, request: AuthRequest) -> AuthResult<AuthRequest> {
        Ok(match self.tokens.authorization_header()? {
            Some((name, value)) => request.header(name, value),
            None => request,
        })
    }

    /// POST credentials to the sign-in endpoint and extract the access token.
    ///
    /// Nothing is stored; the caller decides once every part of the response
    /// has been validated.
    pub(crate) async fn request_sign_in(
        &self,
        request: &SignInRequest,
    ) -> AuthResult<(String, Value)> {
        let credentials = require_object(request.credentials.as_ref(), "sign_in")?;
        let response = self
            .transport
            .send(
                AuthRequest::to(&self.config.endpoints.sign_in)
                    .json(Value::Object(credentials.clone())),
            )
            .await?;

        if response.is_auth_rejection() {
            warn!(status = response.status, "Sign-in rejected");
            return Err(AuthError::InvalidCredentials(body_text(&response.body)));
        }
        if !response.is_success() {
            return Err(response.into_error());
        }

        let pointer = &self.config.token.sign_in_response_token_pointer;
        let token = extract_string(&response.body, pointer).ok_or_else(|| {
            AuthError::InvalidResponse(format!("sign-in response has no token at {}", pointer))
        })?;
        Ok((token, response.body))
    }

    fn session_from_response(&self, response: AuthResponse) -> AuthResult<SessionOutcome> {
        if response.is_auth_rejection() || response.is_no_content() {
            debug!(status = response.status, "Session endpoint reports no session");
            return Ok(SessionOutcome::SignedOut);
        }
        if !response.is_success() {
            return Err(response.into_error());
        }
        if response.body.is_null() {
            return Ok(SessionOutcome::SignedOut);
        }

        let pointer = &self.config.session.data_response_pointer;
        match extract(&response.body, pointer) {
            Some(Value::Null) => Ok(SessionOutcome::SignedOut),
            Some(data) => {
                self.check_data_type(data);
                Ok(SessionOutcome::Session(data.clone()))
            }
            None => Err(AuthError::InvalidResponse(format!(
                "session response has nothing at {}",
                pointer
            ))),
        }
    }

    fn check_data_type(&self, data: &Value) {
        for field in self.config.session.data_type.keys() {
            if data.get(field).is_none() {
                debug!(field = %field, "Session data is missing a declared field");
            }
        }
    }
}

#[async_trait]
impl ProviderStrategy for LocalProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn should_fetch(&self, force: bool) -> AuthResult<bool> {
        Ok(force || self.tokens.raw_token()?.is_some())
    }

    async fn fetch_session(&self) -> AuthResult<SessionOutcome> {
        let request = self.authorized(AuthRequest::to(&self.config.endpoints.get_session))?;
        let response = self.transport.send(request).await?;
        self.session_from_response(response)
    }

    async fn sign_in(&self, request: SignInRequest) -> AuthResult<SignInOutcome> {
        let (token, _) = self.request_sign_in(&request).await?;
        self.tokens.set_token(&token)?;
        info!(provider = %self.kind, "Signed in");
        Ok(SignInOutcome::Completed(SignInResult::success()))
    }

    async fn sign_up(&self, credentials: &Value) -> AuthResult<Value> {
        let endpoint = self
            .config
            .endpoints
            .sign_up
            .as_ref()
            .ok_or_else(|| AuthError::Config("sign-up endpoint is disabled".to_string()))?;
        let credentials = require_object(Some(credentials), "sign_up")?;

        let response = self
            .transport
            .send(AuthRequest::to(endpoint).json(Value::Object(credentials.clone())))
            .await?;

        if response.is_auth_rejection() {
            return Err(AuthError::InvalidCredentials(body_text(&response.body)));
        }
        if response.status >= 500 {
            return Err(response.into_error());
        }
        if !response.is_success() {
            return Err(AuthError::SignUp(body_text(&response.body)));
        }

        info!(provider = %self.kind, "Signed up");
        Ok(response.body)
    }

    async fn sign_out(&self, _request: SignOutRequest) -> AuthResult<SignOutOutcome> {
        if let Some(endpoint) = &self.config.endpoints.sign_out {
            let request = self.authorized(AuthRequest::to(endpoint))?;
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    warn!(
                        status = response.status,
                        "Sign-out endpoint failed, clearing tokens anyway"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Sign-out request failed, clearing tokens anyway");
                }
            }
        }

        self.tokens.clear()?;
        info!(provider = %self.kind, "Signed out");
        Ok(SignOutOutcome::default())
    }

    fn set_token(&self, raw: &str) -> AuthResult<()> {
        self.tokens.set_token(raw)
    }

    fn clear_token(&self) -> AuthResult<()> {
        self.tokens.clear()
    }

    fn tokens(&self) -> Option<&SessionTokens> {
        Some(&self.tokens)
    }

    fn sign_in_page(&self, callback_url: Option<&str>) -> AuthResult<NavigationTarget> {
        let login = &self.config.pages.login;
        let url = match callback_url {
            Some(callback) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(callback.as_bytes()).collect();
                format!("{}?callbackUrl={}", login, encoded)
            }
            None => login.clone(),
        };
        Ok(NavigationTarget::internal(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use crate::transport::RequestBody;
    use serde_json::json;
    use token_storage::MemoryStorage;

    fn provider(transport: &Arc<MockTransport>) -> LocalProvider {
        LocalProvider::new(
            LocalProviderConfig::default(),
            transport.clone(),
            Arc::new(MemoryStorage::default()),
        )
        .unwrap()
    }

    fn credentials() -> SignInRequest {
        SignInRequest {
            credentials: Some(json!({ "username": "ada", "password": "hunter2" })),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sign_in_stores_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/login", 200, json!({ "token": "abc" }));
        let provider = provider(&transport);

        let outcome = provider.sign_in(credentials()).await.unwrap();

        assert_eq!(outcome, SignInOutcome::Completed(SignInResult::success()));
        assert_eq!(
            provider.session_tokens().token().unwrap().as_deref(),
            Some("Bearer abc")
        );
        let sent = transport.requests("/login");
        assert_eq!(
            sent[0].body,
            RequestBody::Json(json!({ "username": "ada", "password": "hunter2" }))
        );
    }

    #[tokio::test]
    async fn test_rejected_sign_in_keeps_existing_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/login", 401, json!({ "message": "bad password" }));
        let provider = provider(&transport);
        provider.set_token("old").unwrap();

        let err = provider.sign_in(credentials()).await.unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials("bad password".to_string()));
        assert_eq!(
            provider.session_tokens().raw_token().unwrap().as_deref(),
            Some("old")
        );
    }

    #[tokio::test]
    async fn test_sign_in_without_credentials_fails_before_network() {
        let transport = Arc::new(MockTransport::new());
        let provider = provider(&transport);

        let err = provider.sign_in(SignInRequest::default()).await.unwrap_err();

        assert!(matches!(err, AuthError::Config(_)));
        assert_eq!(transport.calls("/login"), 0);
    }

    #[tokio::test]
    async fn test_sign_in_response_without_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/login", 200, json!({ "user": "ada" }));
        let provider = provider(&transport);

        let err = provider.sign_in(credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
        assert!(provider.session_tokens().raw_token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_session_sends_header() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/session", 200, json!({ "id": 7 }));
        let provider = provider(&transport);
        provider.set_token("abc").unwrap();

        let outcome = provider.fetch_session().await.unwrap();

        assert_eq!(outcome, SessionOutcome::Session(json!({ "id": 7 })));
        let sent = transport.requests("/session");
        assert_eq!(sent[0].header_value("Authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_fetch_session_rejection_and_server_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/session", 401, Value::Null);
        transport.respond("/session", 500, json!("boom"));
        let provider = provider(&transport);

        assert_eq!(
            provider.fetch_session().await.unwrap(),
            SessionOutcome::SignedOut
        );
        let err = provider.fetch_session().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_sign_out_clears_tokens_when_endpoint_fails() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/logout", 503, Value::Null);
        let provider = provider(&transport);
        provider.set_token("abc").unwrap();

        provider.sign_out(SignOutRequest::default()).await.unwrap();

        assert!(provider.session_tokens().raw_token().unwrap().is_none());
        assert_eq!(
            transport.requests("/logout")[0].header_value("Authorization"),
            Some("Bearer abc")
        );
    }

    #[tokio::test]
    async fn test_disabled_sign_up_endpoint() {
        let transport = Arc::new(MockTransport::new());
        let mut config = LocalProviderConfig::default();
        config.endpoints.sign_up = None;
        let provider = LocalProvider::new(
            config,
            transport.clone(),
            Arc::new(MemoryStorage::default()),
        )
        .unwrap();

        let err = provider.sign_up(&json!({ "username": "ada" })).await.unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
        assert_eq!(transport.calls("/register"), 0);
    }

    #[test]
    fn test_sign_in_page_carries_callback() {
        let transport = Arc::new(MockTransport::new());
        let provider = provider(&transport);

        assert_eq!(
            provider.sign_in_page(Some("/private/page")).unwrap(),
            NavigationTarget::internal("/login?callbackUrl=%2Fprivate%2Fpage")
        );
        assert_eq!(
            provider.sign_in_page(None).unwrap(),
            NavigationTarget::internal("/login")
        );
    }
}
