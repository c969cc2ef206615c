//! SQL Connector configuration

use serde::{Deserialize, Serialize};

use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::UserNameRule;

/// Configuration for the stored-procedure extraction connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlConfig {
    /// Name of the connection to use, resolved by the connection factory.
    #[serde(default = "default_connection_name")]
    pub connection_name: String,

    /// Stored procedure (or set-returning function) to call.
    pub stored_procedure: String,

    /// Positional text parameters passed to the procedure.
    #[serde(default)]
    pub parameters: Vec<String>,

    /// Timeout for the procedure call.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Records per staged file.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Column holding the account name.
    #[serde(default)]
    pub user_name_index: usize,

    /// Prefix of claims-encoded account names.
    #[serde(default = "default_claims_prefix")]
    pub claims_prefix: String,

    /// Tenant UPN suffix appended to account names.
    pub upn_suffix: String,

    /// Count mapped columns missing from the result set as failures.
    #[serde(default = "default_require_columns")]
    pub require_columns: bool,

    /// Prefix of staged file names.
    #[serde(default = "default_connector_name")]
    pub connector_name: String,
}

fn default_connection_name() -> String {
    "Main".to_string()
}

fn default_command_timeout() -> u64 {
    60
}

fn default_page_size() -> usize {
    100
}

fn default_claims_prefix() -> String {
    "i:0#.f|membership|".to_string()
}

fn default_require_columns() -> bool {
    true
}

fn default_connector_name() -> String {
    "SqlConnector".to_string()
}

impl SqlConfig {
    pub fn new(stored_procedure: impl Into<String>, upn_suffix: impl Into<String>) -> Self {
        Self {
            connection_name: default_connection_name(),
            stored_procedure: stored_procedure.into(),
            parameters: Vec::new(),
            command_timeout_secs: default_command_timeout(),
            page_size: default_page_size(),
            user_name_index: 0,
            claims_prefix: default_claims_prefix(),
            upn_suffix: upn_suffix.into(),
            require_columns: default_require_columns(),
            connector_name: default_connector_name(),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Account name column rule for staged rows.
    pub fn user_name_rule(&self) -> UserNameRule {
        UserNameRule {
            index: self.user_name_index,
            claims_prefix: self.claims_prefix.clone(),
            upn_suffix: self.upn_suffix.clone(),
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.connection_name.trim().is_empty() {
            return Err(SyncError::invalid_configuration("connection_name is required"));
        }
        if self.stored_procedure.trim().is_empty() {
            return Err(SyncError::invalid_configuration("stored_procedure is required"));
        }
        if self.upn_suffix.trim().is_empty() {
            return Err(SyncError::invalid_configuration("upn_suffix is required"));
        }
        if self.page_size == 0 {
            return Err(SyncError::invalid_configuration(
                "page_size must be greater than 0",
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(SyncError::invalid_configuration(
                "command_timeout_secs must be greater than 0",
            ));
        }
        if self.connector_name.is_empty()
            || self.connector_name.contains(|c| c == '/' || c == '\\')
        {
            return Err(SyncError::invalid_configuration(
                "connector_name must be a plain file name prefix",
            ));
        }
        Ok(())
    }
}
