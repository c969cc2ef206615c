//! Step and collaborator traits
//!
//! Steps (extraction connectors, the replayer) implement [`Action`]; the
//! remote services they talk to sit behind the collaborator traits so the
//! core never depends on a particular wire protocol.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dirsync_codec::CsvRow;

use crate::action::ActionSettings;
use crate::batch::RunSummary;
use crate::error::SyncResult;
use crate::schema::PropertySchema;
use crate::transform::PropertyChange;

/// One configured pipeline step.
#[async_trait]
pub trait Action: Send + Sync {
    /// Name used for staged files and log fields.
    fn name(&self) -> &str;

    /// Step settings (staging location and property schema).
    fn settings(&self) -> &ActionSettings;

    /// Run the step.
    ///
    /// `parent` carries the settings of the enclosing step when this step
    /// runs as a child; `now` is the timestamp locked for the whole run.
    async fn execute(
        &self,
        parent: Option<&ActionSettings>,
        now: DateTime<Utc>,
    ) -> SyncResult<RunSummary>;
}

/// Result of handling one staged row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// The remote update was accepted.
    Success { account: String },
    /// The remote update failed for this account only.
    Failure { account: String, reason: String },
    /// The row could not be used (for example, no account column).
    Skipped { reason: String },
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Success { .. })
    }
}

/// Step that consumes staged rows one at a time.
#[async_trait]
pub trait RowHandler: Send + Sync {
    /// Handle data row `row_number` of a staged file. Errors returned here
    /// are fatal for the run; per-account failures are reported as
    /// [`RowOutcome::Failure`].
    async fn iterate_row(
        &self,
        schema: &PropertySchema,
        row_number: usize,
        row: &CsvRow,
    ) -> SyncResult<RowOutcome>;
}

/// Remote profile store receiving property updates.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Establish (or verify) the session. A failure aborts the replay.
    async fn connect(&self) -> SyncResult<()>;

    /// Update the given properties of one account's profile.
    async fn update_properties_by_account(
        &self,
        account: &str,
        changes: &[PropertyChange],
    ) -> SyncResult<()>;
}

/// Remote content store used to publish files and folders.
///
/// Every operation is idempotent, so callers may retry transient failures.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create every missing folder along `path`.
    async fn ensure_folder(&self, path: &str) -> SyncResult<()>;

    /// Upload a file into `folder`, replacing any existing file.
    async fn add_file(&self, folder: &str, name: &str, content: &[u8]) -> SyncResult<()>;

    async fn check_out(&self, path: &str) -> SyncResult<()>;

    async fn check_in(&self, path: &str, comment: &str) -> SyncResult<()>;

    async fn publish(&self, path: &str, comment: &str) -> SyncResult<()>;

    async fn approve(&self, path: &str, comment: &str) -> SyncResult<()>;
}

/// Username and password resolved from a credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

/// Lookup of named credentials (`service_login` in step configuration).
pub trait CredentialStore: Send + Sync {
    fn read(&self, name: &str) -> SyncResult<Credential>;
}
