//! # LDAP Connector
//!
//! Extracts person entries from an LDAP directory (typically Active
//! Directory) and stages them as batch files.
//!
//! ## Features
//!
//! - Paged search driven by the server's continuation cookie
//! - Bulk, delta (`whenChanged` window) or literal filters
//! - `userAccountControl` decoding with fail-safe "disabled" default
//! - Claims-encoded account names for the profile store
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_connector_ldap::{LdapConfig, LdapConnector};
//!
//! let config = LdapConfig::new("dc01.contoso.com", "DC=contoso,DC=com", "contoso.com")
//!     .with_service_login("ldap-sync");
//! let connector = LdapConnector::with_ldap3(settings, config, credentials)?;
//! let summary = connector.execute(None, chrono::Utc::now()).await?;
//! ```

pub mod config;
pub mod connector;
pub mod filter;

pub use config::LdapConfig;
pub use connector::{
    entry_to_record, DirectoryConnectionFactory, DirectorySession, Ldap3ConnectionFactory,
    LdapConnector, PagedSearch, SearchPage,
};
pub use filter::{build_query_filter, QueryMode};
