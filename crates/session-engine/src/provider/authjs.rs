//! Cookie-session provider speaking the Auth.js REST endpoints.
//!
//! The session lives in provider-managed cookies held by the transport, so
//! there are no tokens here. Endpoints, relative to the base URL:
//! `GET /session`, `GET /csrf`, `GET /providers`, `POST /signin/{id}`,
//! `POST /callback/{id}`, `POST /signout`.

use super::{
    body_text, ProviderKind, ProviderStrategy, SessionOutcome, SignInOutcome, SignInRequest,
    SignInResult, SignOutOutcome, SignOutRequest,
};
use crate::navigation::NavigationTarget;
use crate::transport::{endpoint_url, AuthRequest, AuthResponse, AuthTransport};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use auth_config::{AuthJsProviderConfig, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Entry of the `/providers` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthJsProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub signin_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl AuthJsProviderInfo {
    fn is_credentials(&self) -> bool {
        self.kind == "credentials"
    }

    fn is_email(&self) -> bool {
        self.kind == "email"
    }

    /// OAuth flows always leave the app to reach the consent screen.
    fn is_oauth(&self) -> bool {
        !self.is_credentials() && !self.is_email()
    }
}

pub struct AuthJsProvider {
    config: AuthJsProviderConfig,
    base_url: Url,
    transport: Arc<dyn AuthTransport>,
}

impl AuthJsProvider {
    pub fn new(
        config: AuthJsProviderConfig,
        base_url: Url,
        transport: Arc<dyn AuthTransport>,
    ) -> Self {
        Self {
            config,
            base_url,
            transport,
        }
    }

    fn callback_url(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .or_else(|| self.config.default_callback_url.clone())
            .unwrap_or_else(|| "/".to_string())
    }

    fn signin_page(&self, callback_url: &str) -> AuthResult<NavigationTarget> {
        let url = endpoint_url(
            &self.base_url,
            "/signin",
            &[("callbackUrl".to_string(), callback_url.to_string())],
        )?;
        Ok(NavigationTarget::external(url.as_str()))
    }

    /// Make a possibly relative URL absolute against the base URL.
    fn absolute(&self, url: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(url)?)
    }

    async fn get(&self, path: &str) -> AuthResult<AuthResponse> {
        let response = self
            .transport
            .send(AuthRequest::new(HttpMethod::Get, path))
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderStrategy for AuthJsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AuthJs
    }

    async fn fetch_session(&self) -> AuthResult<SessionOutcome> {
        let response = self
            .transport
            .send(AuthRequest::new(HttpMethod::Get, "/session"))
            .await?;

        if response.is_auth_rejection() || response.is_no_content() {
            return Ok(SessionOutcome::SignedOut);
        }
        if !response.is_success() {
            return Err(response.into_error());
        }

        match response.body {
            Value::Null => Ok(SessionOutcome::SignedOut),
            Value::Object(map) if map.is_empty() => Ok(SessionOutcome::SignedOut),
            body @ Value::Object(_) => Ok(SessionOutcome::Session(body)),
            other => Err(AuthError::InvalidResponse(format!(
                "session response is not an object: {}",
                body_text(&other)
            ))),
        }
    }

    async fn get_csrf_token(&self) -> AuthResult<String> {
        let response = self.get("/csrf").await?;
        response
            .body
            .get("csrfToken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidResponse("csrf response has no csrfToken".to_string()))
    }

    async fn get_providers(&self) -> AuthResult<BTreeMap<String, AuthJsProviderInfo>> {
        let response = self.get("/providers").await?;
        if response.body.is_null() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_value(response.body)?)
    }

    async fn sign_in(&self, request: SignInRequest) -> AuthResult<SignInOutcome> {
        let callback_url = self.callback_url(request.callback_url.as_deref());

        let Some(provider_id) = request
            .provider
            .clone()
            .or_else(|| self.config.default_provider.clone())
        else {
            return Ok(SignInOutcome::Redirect(self.signin_page(&callback_url)?));
        };

        let providers = self.get_providers().await?;
        let Some(provider) = providers.get(&provider_id) else {
            debug!(provider = %provider_id, "Unknown provider, sending user to the sign-in page");
            return Ok(SignInOutcome::Redirect(self.signin_page(&callback_url)?));
        };

        let mut form: Vec<(String, String)> = Vec::new();
        if let Some(credentials) = &request.credentials {
            let fields = super::require_object(Some(credentials), "sign_in")?;
            for (name, value) in fields {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                form.push((name.clone(), value));
            }
        }

        let csrf_token = self.get_csrf_token().await?;
        form.push(("csrfToken".to_string(), csrf_token));
        form.push(("callbackUrl".to_string(), callback_url.clone()));
        form.push(("json".to_string(), "true".to_string()));

        let path = if provider.is_credentials() {
            format!("/callback/{}", provider.id)
        } else {
            format!("/signin/{}", provider.id)
        };
        let mut sign_in = AuthRequest::new(HttpMethod::Post, path).form(form);
        for (name, value) in &request.authorization_params {
            sign_in = sign_in.query(name.clone(), value.clone());
        }

        let response = self.transport.send(sign_in).await?;
        if !response.is_success() && !response.is_auth_rejection() {
            return Err(response.into_error());
        }

        let url = response
            .body
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| callback_url.clone());
        let url = self.absolute(&url)?;

        if provider.is_oauth() {
            info!(provider = %provider.id, "Continuing OAuth sign-in at the provider");
            return Ok(SignInOutcome::Redirect(NavigationTarget::external(url.as_str())));
        }

        let error = url
            .query_pairs()
            .find(|(name, _)| name == "error")
            .map(|(_, value)| value.into_owned())
            .or_else(|| {
                response
                    .is_auth_rejection()
                    .then(|| "CredentialsSignin".to_string())
            });

        let ok = response.is_success() && error.is_none();
        if ok {
            info!(provider = %provider.id, "Signed in");
        }
        Ok(SignInOutcome::Completed(SignInResult {
            ok,
            status: response.status,
            url: ok.then(|| url.to_string()),
            error,
        }))
    }

    async fn sign_out(&self, request: SignOutRequest) -> AuthResult<SignOutOutcome> {
        let callback_url = self.callback_url(request.callback_url.as_deref());
        let csrf_token = self.get_csrf_token().await?;

        let response = self
            .transport
            .send(AuthRequest::new(HttpMethod::Post, "/signout").form(vec![
                ("csrfToken".to_string(), csrf_token),
                ("callbackUrl".to_string(), callback_url.clone()),
                ("json".to_string(), "true".to_string()),
            ]))
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        let url = response
            .body
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(&callback_url)
            .to_string();
        let url = self.absolute(&url)?;

        info!("Signed out");
        Ok(SignOutOutcome {
            redirect: Some(NavigationTarget::external(url.as_str())),
        })
    }

    fn sign_in_page(&self, callback_url: Option<&str>) -> AuthResult<NavigationTarget> {
        self.signin_page(&self.callback_url(callback_url))
    }
}
