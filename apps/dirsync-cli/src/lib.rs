//! # dirsync
//!
//! Runs directory sync pipelines described in YAML: extraction steps
//! (LDAP or SQL stored procedure) stage records as batch files, and
//! replay steps push the staged rows to a profile store.
//!
//! ```yaml
//! actions:
//!   - type: ldap
//!     host: dc01.contoso.com
//!     search_root: DC=contoso,DC=com
//!     service_login: svc-sync
//!     upn_suffix: contoso.com
//!     properties:
//!       - { index: 0, name: AccountName, mapping: sAMAccountName }
//!     actions:
//!       - type: profile_replay
//! ```

pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::{ActionKind, ActionNodeConfig, PipelineConfig};
pub use credentials::EnvCredentialStore;
pub use error::{CliError, CliResult};
pub use pipeline::{ActionNode, Collaborators, Pipeline, PipelineReport};
