//! HTTP transport seam between the providers and the remote endpoints.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use auth_config::{Endpoint, HttpMethod};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A request against an endpoint path relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl AuthRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn to(endpoint: &Endpoint) -> Self {
        Self::new(endpoint.method, endpoint.path.clone())
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    /// Value of a header, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response with the body decoded as JSON.
///
/// An empty body decodes to `Value::Null`, a non-JSON body to `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub status: u16,
    pub body: Value,
}

impl AuthResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }

    /// Convert an unexpected response into an error.
    pub fn into_error(self) -> AuthError {
        let body = match self.body {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        };
        AuthError::Http {
            status: self.status,
            body,
        }
    }
}

/// Sends requests to the auth API.
///
/// Non-2xx statuses are returned as responses; only transport failures are
/// errors.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn send(&self, request: AuthRequest) -> AuthResult<AuthResponse>;
}

/// Resolve an endpoint path against the base URL, keeping the base path.
pub fn endpoint_url(base: &Url, path: &str, query: &[(String, String)]) -> AuthResult<Url> {
    let mut url = Url::parse(&format!(
        "{}{}",
        base.as_str().trim_end_matches('/'),
        path
    ))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

/// `reqwest` transport with a cookie jar, so cookie-backed sessions persist
/// across calls.
pub struct ReqwestTransport {
    base_url: Url,
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> AuthResult<Self> {
        let http_client = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl AuthTransport for ReqwestTransport {
    async fn send(&self, request: AuthRequest) -> AuthResult<AuthResponse> {
        let url = endpoint_url(&self.base_url, &request.path, &request.query)?;
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        debug!(method = request.method.as_str(), url = %url, "Sending auth request");

        let mut builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!(status, "Auth response received");
        Ok(AuthResponse { status, body })
    }
}
