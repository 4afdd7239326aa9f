//! # AppError
//!
//! Centralized error handling for the Showfest widgets.
//! Every failure mode a widget can surface inline maps to one variant here;
//! none of them tears down the page.

use thiserror::Error;

/// The primary error type for all sf-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Missing or unusable startup configuration (e.g. backend credentials).
    /// Fatal to the widget that needs it, shown inline.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Principal denied access (domain mismatch or block). Forces sign-out.
    #[error("access denied: {0}")]
    AuthRejection(String),

    /// Local input rejected before any network call (empty body, reply depth).
    #[error("validation error: {0}")]
    Validation(String),

    /// A create/update/delete against the store failed. Not retried
    /// automatically; the user may retry.
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// The store refused the write outright. The vote upsert uses this to
    /// route onto its unkeyed-insert fallback.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A live subscription failed. The previous snapshot stays visible.
    #[error("subscription error: {0}")]
    Snapshot(String),

    /// Resource not found (e.g. the caller's own vote during retraction).
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),
}

/// A specialized Result type for Showfest logic.
pub type Result<T> = std::result::Result<T, AppError>;
