//! Provider selection and per-provider endpoint contracts.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP method used for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A remote endpoint, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "endpoint `{}` path must start with '/', got {:?}",
                name, self.path
            )));
        }
        Ok(())
    }
}

/// Longest accepted token lifetime (ten years).
pub const MAX_TOKEN_MAX_AGE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Access token handling for credential-based providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenOptions {
    /// JSON pointer to the token in the sign-in response.
    pub sign_in_response_token_pointer: String,
    /// Prefix placed in front of the raw token ("Bearer"). Empty for none.
    #[serde(rename = "type")]
    pub token_type: String,
    /// Request header that carries the decorated token.
    pub header_name: String,
    /// Storage key of the raw token.
    pub cookie_name: String,
    /// Lifetime of the persisted token. `None` keeps it until cleared.
    pub max_age_in_seconds: Option<u64>,
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self {
            sign_in_response_token_pointer: "/token".to_string(),
            token_type: "Bearer".to_string(),
            header_name: "Authorization".to_string(),
            cookie_name: "auth.token".to_string(),
            max_age_in_seconds: Some(30 * 60),
        }
    }
}

/// Refresh token handling for the refresh provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshTokenOptions {
    /// JSON pointer to the refresh token in the sign-in (and refresh) response.
    pub sign_in_response_refresh_token_pointer: String,
    /// JSON pointer to the new access token in the refresh response.
    /// Empty means "same as the sign-in token pointer".
    pub refresh_response_token_pointer: String,
    /// JSON pointer under which the refresh token is sent to the refresh endpoint.
    pub refresh_request_token_pointer: String,
    /// Storage key of the raw refresh token.
    pub cookie_name: String,
    /// Lifetime of the persisted refresh token.
    pub max_age_in_seconds: Option<u64>,
}

impl Default for RefreshTokenOptions {
    fn default() -> Self {
        Self {
            sign_in_response_refresh_token_pointer: "/refreshToken".to_string(),
            refresh_response_token_pointer: String::new(),
            refresh_request_token_pointer: "/refreshToken".to_string(),
            cookie_name: "auth.refresh-token".to_string(),
            max_age_in_seconds: Some(60 * 60 * 24 * 7),
        }
    }
}

/// Session payload handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Declared shape of the session payload (field name to type name).
    /// Informational; missing fields are reported at debug level.
    pub data_type: BTreeMap<String, String>,
    /// JSON pointer to the session payload in the session response.
    /// "/" selects the whole body.
    pub data_response_pointer: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            data_type: BTreeMap::new(),
            data_response_pointer: "/".to_string(),
        }
    }
}

/// In-app pages used for redirects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pages {
    pub login: String,
}

impl Default for Pages {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
        }
    }
}

/// Endpoints of the local provider. `None` disables an optional endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEndpoints {
    pub sign_in: Endpoint,
    pub sign_out: Option<Endpoint>,
    pub sign_up: Option<Endpoint>,
    pub get_session: Endpoint,
}

impl Default for LocalEndpoints {
    fn default() -> Self {
        Self {
            sign_in: Endpoint::post("/login"),
            sign_out: Some(Endpoint::post("/logout")),
            sign_up: Some(Endpoint::post("/register")),
            get_session: Endpoint::get("/session"),
        }
    }
}

/// Credential-based provider issuing a bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProviderConfig {
    pub endpoints: LocalEndpoints,
    pub token: TokenOptions,
    pub session: SessionOptions,
    pub pages: Pages,
}

/// Endpoints of the refresh provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshEndpoints {
    pub sign_in: Endpoint,
    pub sign_out: Option<Endpoint>,
    pub sign_up: Option<Endpoint>,
    pub get_session: Endpoint,
    pub refresh: Endpoint,
}

impl Default for RefreshEndpoints {
    fn default() -> Self {
        let local = LocalEndpoints::default();
        Self {
            sign_in: local.sign_in,
            sign_out: local.sign_out,
            sign_up: local.sign_up,
            get_session: local.get_session,
            refresh: Endpoint::post("/refresh"),
        }
    }
}

/// Credential-based provider with refresh-token rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshProviderConfig {
    pub endpoints: RefreshEndpoints,
    pub token: TokenOptions,
    pub refresh_token: RefreshTokenOptions,
    /// Keep the current refresh token when the refresh endpoint only returns
    /// a new access token.
    pub refresh_only_token: bool,
    pub session: SessionOptions,
    pub pages: Pages,
}

impl RefreshProviderConfig {
    /// The local-provider view of this configuration.
    pub fn local(&self) -> LocalProviderConfig {
        LocalProviderConfig {
            endpoints: LocalEndpoints {
                sign_in: self.endpoints.sign_in.clone(),
                sign_out: self.endpoints.sign_out.clone(),
                sign_up: self.endpoints.sign_up.clone(),
                get_session: self.endpoints.get_session.clone(),
            },
            token: self.token.clone(),
            session: self.session.clone(),
            pages: self.pages.clone(),
        }
    }

    /// Pointer to the new access token in the refresh response.
    pub fn refresh_response_token_pointer(&self) -> &str {
        if self.refresh_token.refresh_response_token_pointer.is_empty() {
            &self.token.sign_in_response_token_pointer
        } else {
            &self.refresh_token.refresh_response_token_pointer
        }
    }
}

/// Cookie-session provider (Auth.js style endpoints under the base URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthJsProviderConfig {
    /// Provider used when `sign_in` is called without one.
    pub default_provider: Option<String>,
    /// Callback URL sent to the endpoints when the caller gives none.
    pub default_callback_url: Option<String>,
}

impl Default for AuthJsProviderConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            default_callback_url: Some("/".to_string()),
        }
    }
}

/// Provider selection. Chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Authjs(AuthJsProviderConfig),
    Local(LocalProviderConfig),
    Refresh(RefreshProviderConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Local(LocalProviderConfig::default())
    }
}

impl ProviderConfig {
    /// Provider tag as written in the config file.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::Authjs(_) => "authjs",
            ProviderConfig::Local(_) => "local",
            ProviderConfig::Refresh(_) => "refresh",
        }
    }

    /// Check endpoint paths, pointers and storage names.
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            ProviderConfig::Authjs(_) => Ok(()),
            ProviderConfig::Local(local) => validate_local(local),
            ProviderConfig::Refresh(refresh) => {
                validate_local(&refresh.local())?;
                refresh.endpoints.refresh.validate("refresh")?;

                let options = &refresh.refresh_token;
                validate_pointer(
                    "refresh_token.sign_in_response_refresh_token_pointer",
                    &options.sign_in_response_refresh_token_pointer,
                )?;
                validate_pointer(
                    "refresh_token.refresh_request_token_pointer",
                    &options.refresh_request_token_pointer,
                )?;
                if !options.refresh_response_token_pointer.is_empty() {
                    validate_pointer(
                        "refresh_token.refresh_response_token_pointer",
                        &options.refresh_response_token_pointer,
                    )?;
                }
                validate_max_age(
                    "refresh_token.max_age_in_seconds",
                    options.max_age_in_seconds,
                )?;
                if options.cookie_name.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "refresh_token.cookie_name must not be empty".to_string(),
                    ));
                }
                if options.cookie_name == refresh.token.cookie_name {
                    return Err(ConfigError::Invalid(format!(
                        "token and refresh token share the storage name {:?}",
                        options.cookie_name
                    )));
                }
                Ok(())
            }
        }
    }
}

fn validate_local(local: &LocalProviderConfig) -> ConfigResult<()> {
    local.endpoints.sign_in.validate("sign_in")?;
    local.endpoints.get_session.validate("get_session")?;
    if let Some(endpoint) = &local.endpoints.sign_out {
        endpoint.validate("sign_out")?;
    }
    if let Some(endpoint) = &local.endpoints.sign_up {
        endpoint.validate("sign_up")?;
    }

    validate_pointer(
        "token.sign_in_response_token_pointer",
        &local.token.sign_in_response_token_pointer,
    )?;
    validate_pointer(
        "session.data_response_pointer",
        &local.session.data_response_pointer,
    )?;

    validate_max_age("token.max_age_in_seconds", local.token.max_age_in_seconds)?;
    if local.token.cookie_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "token.cookie_name must not be empty".to_string(),
        ));
    }
    if local.token.header_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "token.header_name must not be empty".to_string(),
        ));
    }
    if !local.pages.login.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "pages.login must be an in-app path, got {:?}",
            local.pages.login
        )));
    }
    Ok(())
}

fn validate_max_age(name: &str, max_age: Option<u64>) -> ConfigResult<()> {
    match max_age {
        Some(secs) if secs > MAX_TOKEN_MAX_AGE_SECS => Err(ConfigError::Invalid(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_TOKEN_MAX_AGE_SECS, secs
        ))),
        _ => Ok(()),
    }
}

fn validate_pointer(name: &str, pointer: &str) -> ConfigResult<()> {
    if !pointer.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "{} must be a JSON pointer starting with '/', got {:?}",
            name, pointer
        )));
    }
    Ok(())
}
