//! Per-step settings and error accumulation.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::schema::PropertySchema;

fn default_directory_location() -> PathBuf {
    PathBuf::from("Input")
}

/// Immutable settings shared by every step kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Staging directory: output for extraction, input for replay.
    #[serde(default = "default_directory_location")]
    pub directory_location: PathBuf,

    #[serde(default)]
    pub properties: PropertySchema,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            directory_location: default_directory_location(),
            properties: PropertySchema::default(),
        }
    }
}

impl ActionSettings {
    pub fn new(directory_location: impl Into<PathBuf>, properties: PropertySchema) -> Self {
        Self {
            directory_location: directory_location.into(),
            properties,
        }
    }

    /// Schema in effect when running under `parent`.
    ///
    /// A child step reuses its parent's schema so that replay reads columns
    /// exactly as the parent extraction wrote them.
    pub fn effective_schema<'a>(&'a self, parent: Option<&'a ActionSettings>) -> &'a PropertySchema {
        match parent {
            Some(parent) if !parent.properties.is_empty() => &parent.properties,
            _ => &self.properties,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.directory_location.as_os_str().is_empty() {
            return Err(SyncError::invalid_configuration(
                "directory_location must not be empty",
            ));
        }
        self.properties.validate()
    }
}

/// One error recorded against a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Errors accumulated by a step during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    pub fn record(&mut self, error: &SyncError) {
        self.entries.push(ErrorEntry {
            code: error.error_code(),
            message: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
