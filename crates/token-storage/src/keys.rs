//! Storage key constants.

/// Default storage keys for persisted tokens.
///
/// Both names are configurable per provider; these match the cookie names
/// the auth endpoints conventionally use.
pub struct StorageKeys;

impl StorageKeys {
    /// Raw access token
    pub const TOKEN: &'static str = "auth.token";

    /// Raw refresh token
    pub const REFRESH_TOKEN: &'static str = "auth.refresh-token";
}
