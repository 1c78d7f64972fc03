//! Credential-based provider with refresh-token rotation.
//!
//! Everything but `sign_in` and `refresh` is delegated to the local flows;
//! the shared `SessionTokens` additionally carries the refresh token, so
//! `sign_out` and `clear_token` drop both.

use super::{
    body_text, extract_string, nest_at_pointer, LocalProvider, ProviderKind, ProviderStrategy,
    SessionOutcome, SignInOutcome, SignInRequest, SignInResult, SignOutOutcome, SignOutRequest,
};
use crate::navigation::NavigationTarget;
use crate::tokens::SessionTokens;
use crate::transport::{AuthRequest, AuthTransport};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use auth_config::RefreshProviderConfig;
use serde_json::Value;
use std::sync::Arc;
use token_storage::TokenStorage;
use tracing::{debug, info, warn};

pub struct RefreshProvider {
    local: LocalProvider,
    config: RefreshProviderConfig,
}

impl RefreshProvider {
    pub fn new(
        config: RefreshProviderConfig,
        transport: Arc<dyn AuthTransport>,
        storage: Arc<dyn TokenStorage>,
    ) -> AuthResult<Self> {
        let tokens = SessionTokens::new(Arc::clone(&storage), &config.token)?.with_refresh(
            storage,
            &config.refresh_token.cookie_name,
            config.refresh_token.max_age_in_seconds,
        )?;
        let local =
            LocalProvider::from_parts(config.local(), transport, tokens, ProviderKind::Refresh);
        Ok(Self { local, config })
    }

    fn refresh_token_from(&self, body: &Value) -> AuthResult<String> {
        let pointer = &self.config.refresh_token.sign_in_response_refresh_token_pointer;
        extract_string(body, pointer).ok_or_else(|| {
            AuthError::InvalidResponse(format!("response has no refresh token at {}", pointer))
        })
    }
}

#[async_trait]
impl ProviderStrategy for RefreshProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Refresh
    }

    fn should_fetch(&self, force: bool) -> AuthResult<bool> {
        self.local.should_fetch(force)
    }

    async fn fetch_session(&self) -> AuthResult<SessionOutcome> {
        self.local.fetch_session().await
    }

    async fn sign_in(&self, request: SignInRequest) -> AuthResult<SignInOutcome> {
        let (token, body) = self.local.request_sign_in(&request).await?;
        let refresh_token = self.refresh_token_from(&body)?;

        let tokens = self.local.session_tokens();
        tokens.set_token(&token)?;
        tokens.set_refresh_token(&refresh_token)?;

        info!(provider = "refresh", "Signed in");
        Ok(SignInOutcome::Completed(SignInResult::success()))
    }

    async fn sign_up(&self, credentials: &Value) -> AuthResult<Value> {
        self.local.sign_up(credentials).await
    }

    async fn sign_out(&self, request: SignOutRequest) -> AuthResult<SignOutOutcome> {
        self.local.sign_out(request).await
    }

    async fn refresh(&self) -> AuthResult<()> {
        let tokens = self.local.session_tokens();
        let raw_refresh = tokens.raw_refresh_token()?.ok_or(AuthError::NotLoggedIn)?;

        let body = nest_at_pointer(
            &self.config.refresh_token.refresh_request_token_pointer,
            Value::String(raw_refresh),
        );
        let request = self
            .local
            .authorized(AuthRequest::to(&self.config.endpoints.refresh).json(body))?;

        debug!(path = %self.config.endpoints.refresh.path, "Refreshing token");
        let response = self.local.transport().send(request).await?;

        if response.is_auth_rejection() {
            let reason = body_text(&response.body);
            warn!(status = response.status, reason = %reason, "Token refresh rejected");
            return Err(AuthError::TokenRefresh(format!("HTTP {}: {}", response.status, reason)));
        }
        if !response.is_success() {
            return Err(response.into_error());
        }

        let pointer = self.config.refresh_response_token_pointer();
        let token = extract_string(&response.body, pointer).ok_or_else(|| {
            AuthError::InvalidResponse(format!("refresh response has no token at {}", pointer))
        })?;
        let refresh_token = if self.config.refresh_only_token {
            None
        } else {
            Some(self.refresh_token_from(&response.body)?)
        };

        tokens.set_token(&token)?;
        if let Some(refresh_token) = refresh_token {
            tokens.set_refresh_token(&refresh_token)?;
        }

        info!("Token refreshed successfully");
        Ok(())
    }

    fn set_token(&self, raw: &str) -> AuthResult<()> {
        self.local.set_token(raw)
    }

    fn clear_token(&self) -> AuthResult<()> {
        self.local.clear_token()
    }

    fn tokens(&self) -> Option<&SessionTokens> {
        Some(self.local.session_tokens())
    }

    fn sign_in_page(&self, callback_url: Option<&str>) -> AuthResult<NavigationTarget> {
        self.local.sign_in_page(callback_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use crate::transport::RequestBody;
    use serde_json::json;
    use token_storage::MemoryStorage;

    fn provider_with(
        transport: &Arc<MockTransport>,
        config: RefreshProviderConfig,
    ) -> RefreshProvider {
        RefreshProvider::new(config, transport.clone(), Arc::new(MemoryStorage::default())).unwrap()
    }

    fn provider(transport: &Arc<MockTransport>) -> RefreshProvider {
        provider_with(transport, RefreshProviderConfig::default())
    }

    fn tokens(provider: &RefreshProvider) -> (Option<String>, Option<String>) {
        let tokens = provider.tokens().unwrap();
        (
            tokens.raw_token().unwrap(),
            tokens.raw_refresh_token().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sign_in_stores_both_tokens() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/login",
            200,
            json!({ "token": "a1", "refreshToken": "r1" }),
        );
        let provider = provider(&transport);

        provider
            .sign_in(SignInRequest {
                credentials: Some(json!({ "username": "ada" })),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(tokens(&provider), (Some("a1".into()), Some("r1".into())));
    }

    #[tokio::test]
    async fn test_sign_in_without_refresh_token_stores_nothing() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/login", 200, json!({ "token": "a1" }));
        let provider = provider(&transport);

        let err = provider
            .sign_in(SignInRequest {
                credentials: Some(json!({ "username": "ada" })),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidResponse(_)));
        assert_eq!(tokens(&provider), (None, None));
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/refresh",
            200,
            json!({ "token": "a2", "refreshToken": "r2" }),
        );
        let provider = provider(&transport);
        provider.set_token("a1").unwrap();
        provider.tokens().unwrap().set_refresh_token("r1").unwrap();

        provider.refresh().await.unwrap();

        assert_eq!(tokens(&provider), (Some("a2".into()), Some("r2".into())));
        let sent = transport.requests("/refresh");
        assert_eq!(sent[0].body, RequestBody::Json(json!({ "refreshToken": "r1" })));
        assert_eq!(sent[0].header_value("Authorization"), Some("Bearer a1"));
    }

    #[tokio::test]
    async fn test_refresh_only_token_keeps_refresh_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/refresh", 200, json!({ "token": "a2" }));
        let config = RefreshProviderConfig {
            refresh_only_token: true,
            ..Default::default()
        };
        let provider = provider_with(&transport, config);
        provider.set_token("a1").unwrap();
        provider.tokens().unwrap().set_refresh_token("r1").unwrap();

        provider.refresh().await.unwrap();

        assert_eq!(tokens(&provider), (Some("a2".into()), Some("r1".into())));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_skips_network() {
        let transport = Arc::new(MockTransport::new());
        let provider = provider(&transport);

        let err = provider.refresh().await.unwrap_err();

        assert_eq!(err, AuthError::NotLoggedIn);
        assert_eq!(transport.calls("/refresh"), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_tokens() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/refresh", 401, json!({ "message": "expired" }));
        let provider = provider(&transport);
        provider.set_token("a1").unwrap();
        provider.tokens().unwrap().set_refresh_token("r1").unwrap();

        let err = provider.refresh().await.unwrap_err();

        assert!(matches!(err, AuthError::TokenRefresh(_)));
        assert_eq!(tokens(&provider), (Some("a1".into()), Some("r1".into())));
    }

    #[tokio::test]
    async fn test_clear_token_clears_both() {
        let transport = Arc::new(MockTransport::new());
        let provider = provider(&transport);
        provider.set_token("a1").unwrap();
        provider.tokens().unwrap().set_refresh_token("r1").unwrap();

        provider.clear_token().unwrap();

        assert_eq!(tokens(&provider), (None, None));
    }
}
