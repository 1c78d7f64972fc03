//! Configuration, filesystem paths and logging for the session engine.

mod config;
mod error;
mod logging;
mod paths;
mod provider;

pub use config::{
    Config, Periodic, SessionRefreshConfig, DEFAULT_BASE_URL, DEFAULT_LOG_LEVEL,
    MAX_PERIODIC_INTERVAL_MS,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use provider::{
    AuthJsProviderConfig, Endpoint, HttpMethod, LocalEndpoints, LocalProviderConfig, Pages,
    ProviderConfig, RefreshEndpoints, RefreshProviderConfig, RefreshTokenOptions,
    SessionOptions, TokenOptions, MAX_TOKEN_MAX_AGE_SECS,
};
