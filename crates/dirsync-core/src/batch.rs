//! Batch file naming and run counters.

use std::fmt;
use std::path::{Path, PathBuf};

/// Path of the staged file for the next batch.
///
/// Files are named `{connector}-{start}-{end}.csv`, where `start` is 1 for
/// the first batch and the running total before this batch otherwise, and
/// `end` is the running total once the batch is written.
pub fn batch_file_path(
    location: &Path,
    connector_name: &str,
    running_total: usize,
    batch_size: usize,
) -> PathBuf {
    let start = if running_total == 0 { 1 } else { running_total };
    let end = running_total + batch_size;
    location.join(format!("{connector_name}-{start}-{end}.csv"))
}

/// Running totals for one execution of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Records (or accounts) handled.
    pub processed: usize,
    /// Attribute, transform or account failures.
    pub failed: usize,
    /// Records left out on purpose (disabled accounts, unusable rows).
    pub skipped: usize,
}

/// Closing summary of one step execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub action: String,
    pub counters: RunCounters,
    /// Staged files written (extraction) or consumed (replay).
    pub files: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.counters.processed
    }

    pub fn failed(&self) -> usize {
        self.counters.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} failed, {} file(s)",
            self.action,
            self.counters.processed,
            self.counters.failed,
            self.files.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_batch_starts_at_one() {
        let path = batch_file_path(Path::new("Input"), "LdapConnector", 0, 100);
        assert_eq!(path, Path::new("Input").join("LdapConnector-1-100.csv"));
    }

    #[test]
    fn test_later_batches_start_at_running_total() {
        let location = Path::new("Input");
        assert_eq!(
            batch_file_path(location, "SqlConnector", 2, 2),
            location.join("SqlConnector-2-4.csv")
        );
        assert_eq!(
            batch_file_path(location, "SqlConnector", 4, 1),
            location.join("SqlConnector-4-5.csv")
        );
    }

    #[test]
    fn test_summary_display() {
        let mut summary = RunSummary::new("ldap");
        summary.counters = RunCounters {
            processed: 250,
            failed: 3,
            skipped: 0,
        };
        summary.files.push(PathBuf::from("Input/LdapConnector-1-100.csv"));
        assert_eq!(summary.to_string(), "ldap: 250 processed, 3 failed, 1 file(s)");
    }
}
