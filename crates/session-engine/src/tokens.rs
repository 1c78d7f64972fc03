//! Access and refresh tokens of the credential-based providers.

use crate::AuthResult;
use auth_config::TokenOptions;
use std::sync::Arc;
use token_storage::{TokenStorage, TokenStore};
use tokio::sync::watch;

/// Decorate a raw token for transport: `"{kind} {raw}"`, or the raw value
/// when no kind is configured.
pub fn decorate(kind: &str, raw: &str) -> String {
    if kind.is_empty() {
        raw.to_string()
    } else {
        format!("{} {}", kind, raw)
    }
}

/// Token pair owned by the local and refresh providers.
pub struct SessionTokens {
    access: TokenStore,
    refresh: Option<TokenStore>,
    token_type: String,
    header_name: String,
}

impl SessionTokens {
    /// Access token only.
    pub fn new(storage: Arc<dyn TokenStorage>, options: &TokenOptions) -> AuthResult<Self> {
        let access = TokenStore::new(
            storage,
            options.cookie_name.clone(),
            options.max_age_in_seconds,
        )?;
        Ok(Self {
            access,
            refresh: None,
            token_type: options.token_type.clone(),
            header_name: options.header_name.clone(),
        })
    }

    /// Add a refresh token stored under `key`.
    pub fn with_refresh(
        mut self,
        storage: Arc<dyn TokenStorage>,
        key: &str,
        max_age_secs: Option<u64>,
    ) -> AuthResult<Self> {
        self.refresh = Some(TokenStore::new(storage, key, max_age_secs)?);
        Ok(self)
    }

    pub fn raw_token(&self) -> AuthResult<Option<String>> {
        Ok(self.access.get()?)
    }

    /// Decorated access token.
    pub fn token(&self) -> AuthResult<Option<String>> {
        Ok(self
            .raw_token()?
            .map(|raw| decorate(&self.token_type, &raw)))
    }

    pub fn raw_refresh_token(&self) -> AuthResult<Option<String>> {
        match &self.refresh {
            Some(store) => Ok(store.get()?),
            None => Ok(None),
        }
    }

    /// Refresh tokens are sent as-is.
    pub fn refresh_token(&self) -> AuthResult<Option<String>> {
        self.raw_refresh_token()
    }

    /// `(header name, decorated token)` when a token is stored.
    pub fn authorization_header(&self) -> AuthResult<Option<(String, String)>> {
        Ok(self.token()?.map(|token| (self.header_name.clone(), token)))
    }

    pub fn set_token(&self, raw: &str) -> AuthResult<()> {
        self.access.set(raw)?;
        Ok(())
    }

    pub fn set_refresh_token(&self, raw: &str) -> AuthResult<()> {
        if let Some(store) = &self.refresh {
            store.set(raw)?;
        }
        Ok(())
    }

    /// Clear the access token and, if present, the refresh token.
    pub fn clear(&self) -> AuthResult<()> {
        self.access.clear()?;
        if let Some(store) = &self.refresh {
            store.clear()?;
        }
        Ok(())
    }

    pub fn has_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.access.subscribe()
    }

    pub fn subscribe_refresh(&self) -> Option<watch::Receiver<Option<String>>> {
        self.refresh.as_ref().map(TokenStore::subscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_storage::MemoryStorage;

    fn tokens() -> SessionTokens {
        let storage: Arc<dyn TokenStorage> = Arc::new(MemoryStorage::default());
        SessionTokens::new(Arc::clone(&storage), &TokenOptions::default())
            .unwrap()
            .with_refresh(storage, "auth.refresh-token", None)
            .unwrap()
    }

    #[test]
    fn test_decorate() {
        assert_eq!(decorate("Bearer", "abc"), "Bearer abc");
        assert_eq!(decorate("", "abc"), "abc");
    }

    #[test]
    fn test_token_pairing() {
        let tokens = tokens();
        assert!(tokens.token().unwrap().is_none());
        assert!(tokens.authorization_header().unwrap().is_none());

        tokens.set_token("abc").unwrap();
        tokens.set_refresh_token("r1").unwrap();

        assert_eq!(tokens.raw_token().unwrap().as_deref(), Some("abc"));
        assert_eq!(tokens.token().unwrap().as_deref(), Some("Bearer abc"));
        assert_eq!(tokens.refresh_token().unwrap().as_deref(), Some("r1"));
        assert_eq!(
            tokens.authorization_header().unwrap(),
            Some(("Authorization".to_string(), "Bearer abc".to_string()))
        );
    }

    #[test]
    fn test_clear_removes_both() {
        let tokens = tokens();
        tokens.set_token("abc").unwrap();
        tokens.set_refresh_token("r1").unwrap();
        let rx = tokens.subscribe();

        tokens.clear().unwrap();

        assert!(tokens.raw_token().unwrap().is_none());
        assert!(tokens.raw_refresh_token().unwrap().is_none());
        assert!(rx.borrow().is_none());
    }
}
