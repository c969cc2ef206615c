//! Attribute-to-column property schema.

use std::collections::HashSet;

use dirsync_codec::CsvRow;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::transform::Transform;

/// Maps one source attribute to one staged column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Column position in staged files.
    pub index: usize,
    /// Column heading and profile property name.
    pub name: String,
    /// Source attribute (LDAP attribute or result set column).
    pub mapping: String,
    #[serde(default)]
    pub transform: Transform,
}

impl PropertyMapping {
    pub fn new(index: usize, name: impl Into<String>, mapping: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            mapping: mapping.into(),
            transform: Transform::Identity,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// Ordered list of property mappings, kept sorted by `index`.
///
/// Loaded once from configuration and immutable afterwards. Both the
/// extraction connectors and the replayer read columns through it, so the
/// column order of a staged file always matches the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PropertyMapping>", into = "Vec<PropertyMapping>")]
pub struct PropertySchema {
    mappings: Vec<PropertyMapping>,
}

impl From<Vec<PropertyMapping>> for PropertySchema {
    fn from(mut mappings: Vec<PropertyMapping>) -> Self {
        mappings.sort_by_key(|m| m.index);
        Self { mappings }
    }
}

impl From<PropertySchema> for Vec<PropertyMapping> {
    fn from(schema: PropertySchema) -> Self {
        schema.mappings
    }
}

impl FromIterator<PropertyMapping> for PropertySchema {
    fn from_iter<I: IntoIterator<Item = PropertyMapping>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl PropertySchema {
    pub fn new(mappings: Vec<PropertyMapping>) -> Self {
        Self::from(mappings)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mappings in column order.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyMapping> {
        self.mappings.iter()
    }

    /// Finds the mapping for a column position.
    pub fn get(&self, index: usize) -> Option<&PropertyMapping> {
        self.mappings.iter().find(|m| m.index == index)
    }

    /// Header row: property names in column order.
    pub fn header(&self) -> CsvRow {
        self.mappings.iter().map(|m| m.name.as_str()).collect()
    }

    /// Source attributes to request, in column order.
    pub fn source_keys(&self) -> Vec<&str> {
        self.mappings.iter().map(|m| m.mapping.as_str()).collect()
    }

    /// Validate the schema.
    ///
    /// Indices must be unique and dense from zero so that `index` is the
    /// column position. Names and source keys must be non-empty.
    pub fn validate(&self) -> SyncResult<()> {
        let mut seen = HashSet::new();
        for mapping in &self.mappings {
            if !seen.insert(mapping.index) {
                return Err(SyncError::invalid_configuration(format!(
                    "duplicate property index {}",
                    mapping.index
                )));
            }
            if mapping.name.trim().is_empty() {
                return Err(SyncError::invalid_configuration(format!(
                    "property at index {} has no name",
                    mapping.index
                )));
            }
            if mapping.mapping.trim().is_empty() {
                return Err(SyncError::invalid_configuration(format!(
                    "property '{}' has no source mapping",
                    mapping.name
                )));
            }
        }
        for (position, mapping) in self.mappings.iter().enumerate() {
            if mapping.index != position {
                return Err(SyncError::invalid_configuration(format!(
                    "property indices must be contiguous from 0; expected {position}, found {}",
                    mapping.index
                )));
            }
        }
        Ok(())
    }
}
