//! Property transforms applied while building replay payloads.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Transformation applied to a raw cell value before it is sent to the
/// profile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Pass the raw value through without marking it dirty.
    #[default]
    Identity,
    /// Mark the property dirty and set the raw value as its single value.
    ChangedValue,
    /// Trim whitespace.
    Trim,
    /// Convert to lowercase.
    Lowercase,
    /// Convert to uppercase.
    Uppercase,
    /// Apply a default if the value is empty.
    Default {
        /// Default value to use.
        value: String,
    },
    /// Reject empty values.
    Required,
}

/// Where a transform is being applied; used for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Account key of the row under processing.
    pub account: &'a str,
    /// Zero-based data row within the staged file.
    pub row: usize,
}

/// One property update for the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    pub name: String,
    /// Whether the store should overwrite the property.
    pub is_value_changed: bool,
    pub values: Vec<String>,
}

impl PropertyChange {
    /// A change that replaces the property with a single value.
    pub fn changed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_value_changed: true,
            values: vec![value.into()],
        }
    }

    /// The raw value, not marked dirty.
    pub fn unchanged(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_value_changed: false,
            values: vec![value.into()],
        }
    }
}

impl Transform {
    /// Apply the transform to `raw`, producing the payload for property `name`.
    pub fn apply(
        &self,
        name: &str,
        raw: &str,
        context: &TransformContext<'_>,
    ) -> SyncResult<PropertyChange> {
        let change = match self {
            Transform::Identity => PropertyChange::unchanged(name, raw),
            Transform::ChangedValue => PropertyChange::changed(name, raw),
            Transform::Trim => PropertyChange::changed(name, raw.trim()),
            Transform::Lowercase => PropertyChange::changed(name, raw.to_lowercase()),
            Transform::Uppercase => PropertyChange::changed(name, raw.to_uppercase()),
            Transform::Default { value } => {
                if raw.is_empty() {
                    PropertyChange::changed(name, value.as_str())
                } else {
                    PropertyChange::changed(name, raw)
                }
            }
            Transform::Required => {
                if raw.trim().is_empty() {
                    return Err(SyncError::TransformFailed {
                        property: name.to_string(),
                        message: format!(
                            "value is required (account '{}', row {})",
                            context.account, context.row
                        ),
                    });
                }
                PropertyChange::changed(name, raw)
            }
        };
        Ok(change)
    }
}
