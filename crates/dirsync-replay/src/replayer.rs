//! Profile replayer
//!
//! Walks the staged files of a location in name order, turns every row into
//! a set of property changes and sends them to the profile store.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use dirsync_codec::{CsvReader, CsvRow};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{
    Action, ActionSettings, ProfileStore, PropertySchema, RowHandler, RowOutcome, RunCounters,
    RunSummary, TransformContext,
};

use crate::config::ReplayConfig;

const ACTION_NAME: &str = "ProfileReplay";

/// Ordering key of a staged file: `{name}-{start}-{end}.csv` sorts by name,
/// then numerically by the row range. Other names sort by file name
/// ahead of the batch files of the same prefix.
fn batch_order(path: &Path) -> (String, Option<(u64, u64)>, String) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut parts = stem.rsplitn(3, '-');
    if let (Some(end), Some(start), Some(prefix)) = (parts.next(), parts.next(), parts.next()) {
        if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
            return (prefix.to_string(), Some((start, end)), file_name);
        }
    }
    (stem, None, file_name)
}

/// Whether a store error ends the replay instead of failing one account.
fn aborts_replay(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::ConnectionFailed { .. }
            | SyncError::AuthenticationFailed { .. }
            | SyncError::InvalidConfiguration { .. }
            | SyncError::CredentialNotFound { .. }
    )
}

/// List the staged `.csv` files directly under `location` in batch order.
///
/// A missing location yields no files.
pub fn staged_files(location: &Path) -> SyncResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(location) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(location = %location.display(), "Staging location does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SyncError::io(location, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SyncError::io(location, e))?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| batch_order(path));
    Ok(files)
}

/// Replay step pushing staged rows to a [`ProfileStore`].
pub struct ProfileReplayer {
    settings: ActionSettings,
    config: ReplayConfig,
    store: Arc<dyn ProfileStore>,
}

impl ProfileReplayer {
    pub fn new(
        settings: ActionSettings,
        config: ReplayConfig,
        store: Arc<dyn ProfileStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        if settings.directory_location.as_os_str().is_empty() {
            return Err(SyncError::invalid_configuration(
                "directory_location must not be empty",
            ));
        }
        if !settings.properties.is_empty() {
            settings.properties.validate()?;
        }
        Ok(Self {
            settings,
            config,
            store,
        })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    async fn replay_file(
        &self,
        schema: &PropertySchema,
        path: &Path,
        counters: &mut RunCounters,
    ) -> SyncResult<bool> {
        let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
        let mut reader = CsvReader::new(self.config.delimiter);

        for (row_number, row) in reader.rows(BufReader::new(file)).enumerate() {
            match self.iterate_row(schema, row_number, &row).await? {
                RowOutcome::Success { .. } => counters.processed += 1,
                RowOutcome::Failure { .. } => {
                    counters.processed += 1;
                    counters.failed += 1;
                }
                RowOutcome::Skipped { reason } => {
                    counters.skipped += 1;
                    warn!(file = %path.display(), row = row_number, reason = %reason, "Skipped row");
                }
            }
        }
        Ok(!reader.interrupted())
    }
}

#[async_trait]
impl RowHandler for ProfileReplayer {
    async fn iterate_row(
        &self,
        schema: &PropertySchema,
        row_number: usize,
        row: &CsvRow,
    ) -> SyncResult<RowOutcome> {
        let account = match row.get(self.config.user_name_index) {
            Some(account) if !account.is_empty() => account,
            _ => {
                return Ok(RowOutcome::Skipped {
                    reason: format!("no account in column {}", self.config.user_name_index),
                })
            }
        };

        let context = TransformContext {
            account,
            row: row_number,
        };
        let mut changes = Vec::with_capacity(schema.len());
        for mapping in schema.iter().filter(|m| m.index < row.len()) {
            match mapping
                .transform
                .apply(&mapping.name, &row[mapping.index], &context)
            {
                Ok(change) => changes.push(change),
                Err(e) => error!(
                    account = %account,
                    property = %mapping.name,
                    error = %e,
                    "Failed to build property update"
                ),
            }
        }

        debug!(account = %account, properties = changes.len(), "Updating profile");
        match self
            .store
            .update_properties_by_account(account, &changes)
            .await
        {
            Ok(()) => {
                info!(account = %account, outcome = "SUCCESS", "Profile updated");
                Ok(RowOutcome::Success {
                    account: account.to_string(),
                })
            }
            Err(e) if aborts_replay(&e) => Err(e),
            Err(e) => {
                error!(account = %account, code = e.error_code(), error = %e, "Profile update failed");
                info!(account = %account, outcome = "FAILURE", "Profile update failed");
                Ok(RowOutcome::Failure {
                    account: account.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Action for ProfileReplayer {
    fn name(&self) -> &str {
        ACTION_NAME
    }

    fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    #[instrument(skip(self, parent, _now), fields(location = %self.settings.directory_location.display()))]
    async fn execute(
        &self,
        parent: Option<&ActionSettings>,
        _now: DateTime<Utc>,
    ) -> SyncResult<RunSummary> {
        let schema = self.settings.effective_schema(parent);
        if schema.get(self.config.user_name_index).is_none() {
            return Err(SyncError::invalid_configuration(format!(
                "user_name_index {} does not match any property",
                self.config.user_name_index
            )));
        }

        let location = &self.settings.directory_location;
        let files = staged_files(location)?;
        info!(
            location = %location.display(),
            files = files.len(),
            "Found staged files"
        );

        let mut summary = RunSummary::new(ACTION_NAME);
        if files.is_empty() {
            return Ok(summary);
        }

        self.store.connect().await?;

        for path in files {
            if self.config.sleep_period_secs > 0 {
                info!(
                    seconds = self.config.sleep_period_secs,
                    "Pausing before next file"
                );
                tokio::time::sleep(Duration::from_secs(self.config.sleep_period_secs)).await;
            }

            info!(file = %path.display(), "Replaying staged file");
            let complete = self.replay_file(schema, &path, &mut summary.counters).await?;

            if !complete {
                warn!(file = %path.display(), "File was not read to the end; keeping it");
            } else if !self.config.keep {
                if let Err(e) = std::fs::remove_file(&path) {
                    error!(file = %path.display(), error = %e, "Failed to delete staged file");
                }
            }
            summary.files.push(path);
        }

        info!(
            processed = summary.processed(),
            failed = summary.failed(),
            skipped = summary.counters.skipped,
            "Replay complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ProfileReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileReplayer")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .finish()
    }
}
