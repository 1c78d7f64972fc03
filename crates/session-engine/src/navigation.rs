//! Navigation seam for post-action redirects.

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// A redirect target. `external` asks for a hard (full page) navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    pub url: String,
    pub external: bool,
}

impl NavigationTarget {
    pub fn internal(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            external: false,
        }
    }

    pub fn external(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            external: true,
        }
    }

    pub fn new(url: impl Into<String>, external: bool) -> Self {
        Self {
            url: url.into(),
            external,
        }
    }

    /// Rooted paths are valid for both kinds of navigation; `external` only
    /// asks for a full page load. Absolute URLs must be http(s) and need
    /// `external`.
    pub fn validate(&self) -> Result<(), NavigationError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(NavigationError::InvalidTarget("empty URL".to_string()));
        }

        if is_rooted_path(url) {
            return Ok(());
        }
        if self.external {
            let parsed = Url::parse(url)
                .map_err(|e| NavigationError::InvalidTarget(format!("{}: {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(NavigationError::InvalidTarget(format!(
                    "unsupported scheme in {}",
                    url
                )));
            }
        } else {
            return Err(NavigationError::InvalidTarget(format!(
                "{} is not an in-app path",
                url
            )));
        }
        Ok(())
    }
}

fn is_rooted_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}

/// Navigation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Invalid navigation target: {0}")]
    InvalidTarget(String),

    #[error("Navigation rejected: {0}")]
    Rejected(String),
}

/// Performs redirects on behalf of the facade.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), NavigationError>;
}

/// Navigator that only logs the redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), NavigationError> {
        info!(url = %target.url, external = target.external, "Navigate");
        Ok(())
    }
}

/// Validate and navigate. Failures are reported and swallowed: the action
/// that triggered the redirect has already succeeded.
pub(crate) fn navigate_or_warn(navigator: &dyn Navigator, target: &NavigationTarget) -> bool {
    let result = target
        .validate()
        .and_then(|()| navigator.navigate(target));
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(url = %target.url, error = %e, "Skipping redirect");
            false
        }
    }
}
