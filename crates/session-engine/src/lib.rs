//! Client-side auth session engine.
//!
//! This crate provides:
//! - `SessionStateStore`, the observable session status/data/loading state
//! - Provider strategies for Auth.js, local (token) and refresh-token backends
//! - `SessionManager`, coalescing and ordering session fetches
//! - `RefreshScheduler`, periodic and focus-triggered revalidation
//! - `Auth`, the session facade with post-action redirect policy

mod coalesce;
mod error;
mod facade;
mod focus;
mod navigation;
mod provider;
mod scheduler;
mod session;
mod state;
mod tokens;
mod transport;

#[cfg(test)]
mod test_support;

pub use error::{AuthError, AuthResult};
pub use facade::{
    Auth, GetSessionOptions, SignInOptions, SignOutOptions, SignUpExtra, SignUpOptions,
    UnauthenticatedHook,
};
pub use focus::FocusSignal;
pub use navigation::{NavigationError, NavigationTarget, Navigator, TracingNavigator};
pub use provider::{
    build_provider, AuthJsProvider, AuthJsProviderInfo, LocalProvider, ProviderKind,
    ProviderStrategy, RefreshProvider, SessionOutcome, SignInOutcome, SignInRequest,
    SignInResult, SignOutOutcome, SignOutRequest,
};
pub use scheduler::{
    scheduler_machine, RefreshAction, RefreshScheduler, SchedulerInput, SchedulerMachine,
    SchedulerState,
};
pub use session::SessionManager;
pub use state::{SessionData, SessionSnapshot, SessionStateStore, SessionStatus};
pub use tokens::{decorate, SessionTokens};
pub use transport::{
    endpoint_url, AuthRequest, AuthResponse, AuthTransport, ReqwestTransport, RequestBody,
};
