//! Sync pipeline error types
//!
//! Errors are classified three ways: fatal errors abort the current phase,
//! transient errors may be retried by a [`crate::RetryPolicy`], and the rest
//! are scoped to a single record, attribute or account.

use std::path::{Path, PathBuf};

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error that can occur while extracting or replaying directory records.
#[derive(Debug, Error)]
pub enum SyncError {
    // Source and collaborator connectivity
    /// Failed to establish a connection to the directory or database.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Bind or login was rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The source rejected or failed the query.
    #[error("query failed: {message}")]
    QueryFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// An operation did not complete in time.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    /// Network error while talking to a remote collaborator.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The remote service is temporarily unavailable.
    #[error("target unavailable: {message}")]
    TargetUnavailable { message: String },

    /// A remote item was not visible yet (eventual consistency).
    #[error("not found yet: {path}")]
    NotFoundYet { path: String },

    // Configuration
    /// Step configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A named credential could not be resolved.
    #[error("credential '{name}' not found")]
    CredentialNotFound { name: String },

    // Staging files
    /// Reading or writing a staged file or directory failed.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Record scoped
    /// An attribute value was present but could not be read as text.
    #[error("attribute '{attribute}' could not be read: {reason}")]
    AttributeUnreadable { attribute: String, reason: String },

    /// An attribute required for the row was absent.
    #[error("attribute '{attribute}' is missing")]
    AttributeMissing { attribute: String },

    /// A property transform rejected its input.
    #[error("transform failed for property '{property}': {message}")]
    TransformFailed { property: String, message: String },

    /// The profile store has no profile for the account.
    #[error("account '{account}' does not exist")]
    AccountNotFound { account: String },

    /// The profile store refused the update for one account.
    #[error("profile update failed for '{account}': {message}")]
    ProfileUpdateFailed { account: String, message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NotFoundYet { .. }
                | SyncError::TargetUnavailable { .. }
                | SyncError::Timeout { .. }
                | SyncError::NetworkError { .. }
        )
    }

    /// Check if this error aborts the remainder of the current phase.
    ///
    /// Record scoped errors and per-account store failures are not fatal;
    /// they are counted and logged and the run continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed { .. }
                | SyncError::AuthenticationFailed { .. }
                | SyncError::QueryFailed { .. }
                | SyncError::Timeout { .. }
                | SyncError::InvalidConfiguration { .. }
                | SyncError::CredentialNotFound { .. }
                | SyncError::Io { .. }
                | SyncError::Internal { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            SyncError::AuthenticationFailed { .. } => "AUTH_FAILED",
            SyncError::QueryFailed { .. } => "QUERY_FAILED",
            SyncError::Timeout { .. } => "TIMEOUT",
            SyncError::NetworkError { .. } => "NETWORK_ERROR",
            SyncError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            SyncError::NotFoundYet { .. } => "NOT_FOUND_YET",
            SyncError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            SyncError::CredentialNotFound { .. } => "CREDENTIAL_NOT_FOUND",
            SyncError::Io { .. } => "IO_ERROR",
            SyncError::AttributeUnreadable { .. } => "ATTRIBUTE_UNREADABLE",
            SyncError::AttributeMissing { .. } => "ATTRIBUTE_MISSING",
            SyncError::TransformFailed { .. } => "TRANSFORM_FAILED",
            SyncError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            SyncError::ProfileUpdateFailed { .. } => "PROFILE_UPDATE_FAILED",
            SyncError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        SyncError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query failed error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        SyncError::QueryFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query failed error with source.
    pub fn query_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::QueryFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        SyncError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an I/O error bound to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
