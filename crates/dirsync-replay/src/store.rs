//! Dry-run profile store.

use async_trait::async_trait;
use tracing::info;

use dirsync_core::error::SyncResult;
use dirsync_core::{ProfileStore, PropertyChange};

/// Profile store that only logs the updates it would send.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProfileStore;

#[async_trait]
impl ProfileStore for LoggingProfileStore {
    async fn connect(&self) -> SyncResult<()> {
        info!("Dry run: no profile store session opened");
        Ok(())
    }

    async fn update_properties_by_account(
        &self,
        account: &str,
        changes: &[PropertyChange],
    ) -> SyncResult<()> {
        let changed: Vec<&str> = changes
            .iter()
            .filter(|c| c.is_value_changed)
            .map(|c| c.name.as_str())
            .collect();
        info!(
            account = %account,
            properties = changes.len(),
            changed = ?changed,
            "Dry run: profile update"
        );
        Ok(())
    }
}
