//! Persisted token storage for the session engine.
//!
//! This crate provides:
//! - A `TokenStorage` backend trait with in-memory and JSON-file backends
//! - `TokenStore`, a single named raw token with change notification
//!   and optional cookie-style max age

mod file;
mod keys;
mod memory;
mod token_store;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use token_store::TokenStore;
pub use traits::TokenStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Token lifetime outside the representable range
    #[error("Invalid max age: {0} seconds")]
    InvalidMaxAge(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
