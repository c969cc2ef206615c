//! LDAP Connector configuration

use serde::{Deserialize, Serialize};

use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::UserNameRule;

/// Configuration for the LDAP extraction connector.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Directory server hostname or IP address.
    pub host: String,

    /// Directory server port.
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use LDAPS.
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on a plain connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN the subtree search starts from.
    pub search_root: String,

    /// Named credential to bind with, resolved through the credential store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_login: Option<String>,

    /// Bind DN (or `DOMAIN\user`) when no named credential is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    /// Bind password when no named credential is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// `bulk`, `delta`, or a literal LDAP filter.
    #[serde(default = "default_batch_action")]
    pub batch_action: String,

    /// Prefix of claims-encoded account names.
    #[serde(default = "default_claims_prefix")]
    pub claims_prefix: String,

    /// Tenant UPN suffix appended to account names (e.g., "contoso.com").
    pub upn_suffix: String,

    /// Column holding the account name.
    #[serde(default)]
    pub user_name_index: usize,

    /// Entries requested per page (and records per staged file).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Connect and per-page search timeout.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// LDAP protocol version; only v3 is supported.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,

    /// Days covered by a delta query.
    #[serde(default = "default_delta_period")]
    pub delta_period_days: u32,

    /// Leave disabled accounts out of the staged files.
    #[serde(default)]
    pub skip_disabled_accounts: bool,

    /// Prefix of staged file names.
    #[serde(default = "default_connector_name")]
    pub connector_name: String,
}

fn default_ldap_port() -> u16 {
    389
}

fn default_batch_action() -> String {
    "bulk".to_string()
}

fn default_claims_prefix() -> String {
    "i:0#.f|membership|".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_query_timeout() -> u64 {
    60
}

fn default_protocol_version() -> u8 {
    3
}

fn default_delta_period() -> u32 {
    2
}

fn default_connector_name() -> String {
    "LdapConnector".to_string()
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("search_root", &self.search_root)
            .field("service_login", &self.service_login)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("batch_action", &self.batch_action)
            .field("claims_prefix", &self.claims_prefix)
            .field("upn_suffix", &self.upn_suffix)
            .field("user_name_index", &self.user_name_index)
            .field("page_size", &self.page_size)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("protocol_version", &self.protocol_version)
            .field("delta_period_days", &self.delta_period_days)
            .field("skip_disabled_accounts", &self.skip_disabled_accounts)
            .field("connector_name", &self.connector_name)
            .finish()
    }
}

impl LdapConfig {
    /// Create a configuration with the stock defaults.
    pub fn new(
        host: impl Into<String>,
        search_root: impl Into<String>,
        upn_suffix: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            search_root: search_root.into(),
            service_login: None,
            bind_dn: None,
            bind_password: None,
            batch_action: default_batch_action(),
            claims_prefix: default_claims_prefix(),
            upn_suffix: upn_suffix.into(),
            user_name_index: 0,
            page_size: default_page_size(),
            query_timeout_secs: default_query_timeout(),
            protocol_version: default_protocol_version(),
            delta_period_days: default_delta_period(),
            skip_disabled_accounts: false,
            connector_name: default_connector_name(),
        }
    }

    /// Bind with a named credential.
    #[must_use]
    pub fn with_service_login(mut self, name: impl Into<String>) -> Self {
        self.service_login = Some(name.into());
        self
    }

    /// Bind with an explicit DN and password.
    #[must_use]
    pub fn with_bind(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_batch_action(mut self, action: impl Into<String>) -> Self {
        self.batch_action = action.into();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        if self.port == 389 {
            self.port = 636;
        }
        self
    }

    /// Server URL.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
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
        if self.host.trim().is_empty() {
            return Err(SyncError::invalid_configuration("host is required"));
        }
        if self.search_root.trim().is_empty() {
            return Err(SyncError::invalid_configuration("search_root is required"));
        }
        if self.upn_suffix.trim().is_empty() {
            return Err(SyncError::invalid_configuration("upn_suffix is required"));
        }
        if self.service_login.is_none() && self.bind_dn.is_none() {
            return Err(SyncError::invalid_configuration(
                "either service_login or bind_dn is required",
            ));
        }
        if self.page_size == 0 || self.page_size > i32::MAX as u32 {
            return Err(SyncError::invalid_configuration(
                "page_size must be between 1 and 2147483647",
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(SyncError::invalid_configuration(
                "query_timeout_secs must be greater than 0",
            ));
        }
        if self.protocol_version != 3 {
            return Err(SyncError::invalid_configuration(format!(
                "unsupported LDAP protocol version {}",
                self.protocol_version
            )));
        }
        if self.use_ssl && self.use_starttls {
            return Err(SyncError::invalid_configuration(
                "use_ssl and use_starttls are mutually exclusive",
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

    /// A copy safe to log.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}
