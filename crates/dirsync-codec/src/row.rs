//! Row type shared by the reader and the writer.

use std::ops::Index;

/// One logical record: an ordered sequence of text cells.
///
/// Column position carries meaning, so cells are never reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRow(Vec<String>);

impl CsvRow {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Appends a cell at the end of the row.
    pub fn push(&mut self, cell: impl Into<String>) {
        self.0.push(cell.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the cell at `index`, if the row is long enough.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_cells(self) -> Vec<String> {
        self.0
    }
}

impl Index<usize> for CsvRow {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

impl From<Vec<String>> for CsvRow {
    fn from(cells: Vec<String>) -> Self {
        Self(cells)
    }
}

impl From<Vec<&str>> for CsvRow {
    fn from(cells: Vec<&str>) -> Self {
        Self(cells.into_iter().map(str::to_string).collect())
    }
}

impl<S: Into<String>> FromIterator<S> for CsvRow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
