//! Replay configuration

use serde::{Deserialize, Serialize};

use dirsync_core::error::{SyncError, SyncResult};

/// Configuration for the profile replayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Pause before each staged file, to avoid overloading the store.
    #[serde(default)]
    pub sleep_period_secs: u64,

    /// Keep staged files after they have been replayed.
    #[serde(default)]
    pub keep: bool,

    /// Column holding the account key.
    #[serde(default)]
    pub user_name_index: usize,

    /// Preferred delimiter of staged files; a comma header still wins.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            sleep_period_secs: 0,
            keep: false,
            user_name_index: 0,
            delimiter: default_delimiter(),
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.delimiter == '"' || self.delimiter == '\n' || self.delimiter == '\r' {
            return Err(SyncError::invalid_configuration(format!(
                "{:?} cannot be used as a delimiter",
                self.delimiter
            )));
        }
        Ok(())
    }
}
