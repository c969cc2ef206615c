//! Staging of source pages into batch files.

use std::path::{Path, PathBuf};

use dirsync_codec::{CsvRow, CsvWriter};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::batch::{batch_file_path, RunCounters, RunSummary};
use crate::error::{SyncError, SyncResult};
use crate::record::DirectoryRecord;
use crate::schema::{PropertyMapping, PropertySchema};

/// Rewrite a source account name into the claims-encoded form expected by
/// the profile store.
///
/// Any `DOMAIN\` prefix (everything up to the last backslash) is dropped:
/// `CONTOSO\jdoe` becomes `{claims_prefix}jdoe@{upn_suffix}`.
pub fn claims_account_name(raw: &str, claims_prefix: &str, upn_suffix: &str) -> String {
    let account = match raw.rfind('\\') {
        Some(position) => &raw[position + 1..],
        None => raw,
    };
    format!("{claims_prefix}{account}@{upn_suffix}")
}

/// Which column carries the account name and how to encode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNameRule {
    pub index: usize,
    pub claims_prefix: String,
    pub upn_suffix: String,
}

impl UserNameRule {
    pub fn rewrite(&self, raw: &str) -> String {
        claims_account_name(raw, &self.claims_prefix, &self.upn_suffix)
    }
}

/// Writes pages of source records as numbered batch files.
///
/// Each page becomes one file under `location`, headed by the schema's
/// property names. Cells are built column by column; a column that fails
/// is counted, logged and left empty while the row is still written.
#[derive(Debug)]
pub struct BatchStager {
    connector_name: String,
    location: PathBuf,
    schema: PropertySchema,
    user_name: Option<UserNameRule>,
    require_attributes: bool,
    skip_disabled: bool,
    counters: RunCounters,
    files: Vec<PathBuf>,
}

impl BatchStager {
    pub fn new(
        connector_name: impl Into<String>,
        location: impl AsRef<Path>,
        schema: PropertySchema,
        user_name: Option<UserNameRule>,
    ) -> Self {
        Self {
            connector_name: connector_name.into(),
            location: location.as_ref().to_path_buf(),
            schema,
            user_name,
            require_attributes: false,
            skip_disabled: false,
            counters: RunCounters::default(),
            files: Vec::new(),
        }
    }

    /// Count attributes absent from a record as failures.
    #[must_use]
    pub fn require_attributes(mut self, require: bool) -> Self {
        self.require_attributes = require;
        self
    }

    /// Leave administratively disabled accounts out of the staged files.
    #[must_use]
    pub fn skip_disabled(mut self, skip: bool) -> Self {
        self.skip_disabled = skip;
        self
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Stage one page of records.
    ///
    /// Returns the path of the written file, or `None` when nothing was
    /// left to write. Failing to create the staging directory or the file
    /// is fatal; failing to write a row is not.
    pub fn stage_page(&mut self, records: &[DirectoryRecord]) -> SyncResult<Option<PathBuf>> {
        let skip_disabled = self.skip_disabled;
        let mut skipped = 0;
        let records: Vec<&DirectoryRecord> = records
            .iter()
            .filter(|record| {
                let keep = !(skip_disabled && record.account_disabled());
                if !keep {
                    skipped += 1;
                }
                keep
            })
            .collect();
        self.counters.skipped += skipped;

        if records.is_empty() {
            debug!(connector = %self.connector_name, "Page has no records to stage");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.location).map_err(|e| SyncError::io(&self.location, e))?;
        let path = batch_file_path(
            &self.location,
            &self.connector_name,
            self.counters.processed,
            records.len(),
        );
        let mut writer = CsvWriter::create(&path).map_err(|e| SyncError::io(&path, e))?;

        writer.write_row(&self.schema.header());
        for record in &records {
            let (row, failures) = self.build_row(record);
            writer.write_row(&row);
            self.counters.processed += 1;
            self.counters.failed += failures;
        }
        if let Err(e) = writer.finish() {
            error!(file = %path.display(), error = %e, "Failed to flush batch file");
        }

        info!(
            connector = %self.connector_name,
            file = %path.display(),
            batch = records.len(),
            total = self.counters.processed,
            "Staged batch"
        );
        self.files.push(path.clone());
        Ok(Some(path))
    }

    /// Build the staged row for one record, returning it with the number
    /// of columns that failed.
    pub fn build_row(&self, record: &DirectoryRecord) -> (CsvRow, usize) {
        let mut row = CsvRow::with_capacity(self.schema.len());
        let mut failures = 0;

        for mapping in self.schema.iter() {
            match self.cell(mapping, record) {
                Ok(cell) => row.push(cell),
                Err(e) => {
                    failures += 1;
                    warn!(
                        connector = %self.connector_name,
                        property = %mapping.name,
                        code = e.error_code(),
                        error = %e,
                        "Failed to extract attribute"
                    );
                    row.push(String::new());
                }
            }
        }

        (row, failures)
    }

    fn cell(&self, mapping: &PropertyMapping, record: &DirectoryRecord) -> SyncResult<String> {
        let value = record.value(&mapping.mapping)?;

        if let Some(rule) = self.user_name.as_ref().filter(|r| r.index == mapping.index) {
            return match value.map(str::trim).filter(|v| !v.is_empty()) {
                Some(account) => Ok(rule.rewrite(account)),
                None => Err(SyncError::AttributeMissing {
                    attribute: mapping.mapping.clone(),
                }),
            };
        }

        match value {
            Some(value) => Ok(value.to_string()),
            None if self.require_attributes => Err(SyncError::AttributeMissing {
                attribute: mapping.mapping.clone(),
            }),
            None => Ok(String::new()),
        }
    }

    /// Finish the run and produce its summary.
    pub fn into_summary(self) -> RunSummary {
        RunSummary {
            action: self.connector_name,
            counters: self.counters,
            files: self.files,
        }
    }
}
