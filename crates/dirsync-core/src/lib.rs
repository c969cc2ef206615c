//! # Directory Sync Core
//!
//! Shared building blocks for the two-phase directory sync pipeline:
//! extraction connectors stage directory records as batch files, and the
//! replayer later pushes those rows to a remote profile store.
//!
//! This crate holds everything both phases agree on:
//!
//! - [`PropertySchema`]: the ordered attribute-to-column mapping
//! - [`Transform`] and [`PropertyChange`]: per-property replay payloads
//! - [`DirectoryRecord`] and account-control decoding
//! - [`BatchStager`]: page-to-file staging with batch naming
//! - [`SyncError`]: error classification (fatal, transient, per-record)
//! - [`Action`], [`RowHandler`], [`ProfileStore`], [`ContentStore`],
//!   [`CredentialStore`]: the seams between steps and collaborators
//! - [`RetryPolicy`]: bounded retry for transient collaborator errors

pub mod action;
pub mod batch;
pub mod error;
pub mod record;
pub mod resilience;
pub mod schema;
pub mod staging;
pub mod traits;
pub mod transform;

pub use action::{ActionSettings, ErrorEntry, ErrorLog};
pub use batch::{batch_file_path, RunCounters, RunSummary};
pub use error::{SyncError, SyncResult};
pub use record::{account_disabled, DirectoryRecord, UserAccountControl, ACCOUNT_DISABLE};
pub use resilience::{Backoff, RetryPolicy, RetryingContentStore};
pub use schema::{PropertyMapping, PropertySchema};
pub use staging::{claims_account_name, BatchStager, UserNameRule};
pub use traits::{
    Action, ContentStore, Credential, CredentialStore, ProfileStore, RowHandler, RowOutcome,
};
pub use transform::{PropertyChange, Transform, TransformContext};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::action::ActionSettings;
    pub use crate::batch::RunSummary;
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::record::DirectoryRecord;
    pub use crate::schema::{PropertyMapping, PropertySchema};
    pub use crate::staging::{BatchStager, UserNameRule};
    pub use crate::traits::{Action, CredentialStore, ProfileStore, RowHandler, RowOutcome};
    pub use crate::transform::{PropertyChange, Transform};
}
