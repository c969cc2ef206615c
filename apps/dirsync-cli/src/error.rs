//! CLI error types and exit codes

use std::path::PathBuf;

use dirsync_core::SyncError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Connection error
/// - 4: Configuration error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 4,
            CliError::Io { .. } | CliError::Logging(_) => 1,
            CliError::Sync(e) => match e {
                SyncError::InvalidConfiguration { .. } | SyncError::CredentialNotFound { .. } => 4,
                SyncError::ConnectionFailed { .. }
                | SyncError::AuthenticationFailed { .. }
                | SyncError::NetworkError { .. }
                | SyncError::TargetUnavailable { .. }
                | SyncError::Timeout { .. } => 3,
                _ => 1,
            },
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Run 'dirsync validate --config <file>' to check the pipeline."),
            CliError::Sync(SyncError::CredentialNotFound { .. }) => Some(
                "Export DIRSYNC_CRED_<NAME>_USERNAME and DIRSYNC_CRED_<NAME>_PASSWORD for the service login.",
            ),
            CliError::Sync(SyncError::AuthenticationFailed { .. }) => {
                Some("Check the bind account and password.")
            }
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("bad".into()).exit_code(), 4);
        assert_eq!(
            CliError::from(SyncError::invalid_configuration("page_size")).exit_code(),
            4
        );
        assert_eq!(
            CliError::from(SyncError::connection_failed("refused")).exit_code(),
            3
        );
        assert_eq!(
            CliError::from(SyncError::AuthenticationFailed {
                message: "invalid credentials".into()
            })
            .exit_code(),
            3
        );
        assert_eq!(
            CliError::from(SyncError::query_failed("no such function")).exit_code(),
            1
        );
    }

    #[test]
    fn test_sync_error_is_transparent() {
        let err = CliError::from(SyncError::CredentialNotFound {
            name: "svc".into(),
        });
        assert_eq!(
            err.to_string(),
            SyncError::CredentialNotFound {
                name: "svc".into()
            }
            .to_string()
        );
        assert!(err.suggestion().is_some());
    }
}
