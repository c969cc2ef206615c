//! Row encoder for staged batch files.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::row::CsvRow;

/// Separator used for every written file.
pub const FIELD_SEPARATOR: char = ',';

/// Encodes one row as a single line of text, without the line terminator.
///
/// A cell is wrapped in quotes when it contains a quote or the separator;
/// inner quotes are doubled. Embedded line breaks (`\r\n`, or a lone `\r`
/// or `\n`) become a single space so a record always occupies one line.
pub fn encode_row(row: &CsvRow) -> String {
    let mut line = String::new();

    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            line.push(FIELD_SEPARATOR);
        }
        let cell = collapse_line_breaks(cell);
        if cell.contains(|c| c == '"' || c == FIELD_SEPARATOR) {
            line.push('"');
            line.push_str(&cell.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(&cell);
        }
    }

    line
}

fn collapse_line_breaks(cell: &str) -> String {
    let is_break = |c: char| c == '\r' || c == '\n';
    if !cell.contains(is_break) {
        return cell.to_string();
    }
    cell.replace("\r\n", " ").replace(is_break, " ")
}

/// Buffered writer for one batch file.
///
/// Write failures are logged and swallowed: a failed row is lost but the
/// caller keeps going. The underlying file is flushed and closed when the
/// writer is finished or dropped.
pub struct CsvWriter<W: Write> {
    inner: BufWriter<W>,
    target: Option<PathBuf>,
    rows_written: usize,
    rows_failed: usize,
}

impl CsvWriter<File> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let mut writer = Self::new(file);
        writer.target = Some(path.to_path_buf());
        Ok(writer)
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            target: None,
            rows_written: 0,
            rows_failed: 0,
        }
    }

    /// Writes `row` followed by a newline. Returns `false` if the write
    /// failed; the error has already been logged.
    pub fn write_row(&mut self, row: &CsvRow) -> bool {
        let line = encode_row(row);
        match writeln!(self.inner, "{line}") {
            Ok(()) => {
                self.rows_written += 1;
                true
            }
            Err(e) => {
                self.rows_failed += 1;
                error!(
                    file = ?self.target,
                    cells = row.len(),
                    error = %e,
                    "Failed to write row to batch file"
                );
                false
            }
        }
    }

    /// Rows successfully handed to the buffer, header included.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn rows_failed(&self) -> usize {
        self.rows_failed
    }

    /// Flushes buffered rows and returns the inner sink.
    pub fn finish(self) -> io::Result<W> {
        self.inner.into_inner().map_err(|e| e.into_error())
    }
}
