//! Line-oriented reader for staged batch files.
//!
//! The only state carried across lines is the active delimiter, which may be
//! switched to a comma while reading the header line.

use std::io::{BufRead, ErrorKind, Lines};

use tracing::{error, warn};

use crate::row::CsvRow;

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: char = ',';

const QUOTE: char = '"';
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Why a single line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("closing quote at column {column} is followed by '{found}' instead of the delimiter")]
    TextAfterClosingQuote { column: usize, found: char },
}

/// Reader configured with a preferred delimiter.
///
/// The delimiter actually used for a file is decided on its header line:
/// when splitting the header on a comma yields strictly more cells than
/// splitting on the configured delimiter, the comma wins for the rest of
/// the file.
#[derive(Debug, Clone)]
pub struct CsvReader {
    configured: char,
    active: char,
    header: Option<CsvRow>,
    interrupted: bool,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl CsvReader {
    pub fn new(delimiter: char) -> Self {
        Self {
            configured: delimiter,
            active: delimiter,
            header: None,
            interrupted: false,
        }
    }

    /// Delimiter in effect for the file currently being read.
    pub fn delimiter(&self) -> char {
        self.active
    }

    /// Header of the last file read, once its first line has been consumed.
    pub fn header(&self) -> Option<&CsvRow> {
        self.header.as_ref()
    }

    /// Whether the last file stopped early on a read error.
    ///
    /// Lines that are not valid UTF-8 are skipped and do not set this.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Picks the active delimiter from a header line.
    pub fn detect_delimiter(&mut self, header: &str) {
        self.active = self.configured;
        if self.configured == DEFAULT_DELIMITER {
            return;
        }
        let configured_cells = header.split(self.configured).count();
        let comma_cells = header.split(DEFAULT_DELIMITER).count();
        if comma_cells > configured_cells {
            self.active = DEFAULT_DELIMITER;
        }
    }

    /// Parses one line with the active delimiter.
    ///
    /// Leading whitespace before a cell is skipped unless the whitespace is
    /// the delimiter itself. A cell that starts with a quote is read in
    /// quoted mode, where `""` is a literal quote and the delimiter is plain
    /// text. Every cell is trimmed.
    pub fn parse_line(&self, line: &str) -> Result<CsvRow, ParseError> {
        let chars: Vec<char> = line.chars().collect();
        let mut row = CsvRow::new();
        let mut cell = String::new();
        let mut quoted = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if !quoted && cell.is_empty() {
                if c.is_whitespace() && c != self.active {
                    i += 1;
                    continue;
                }
                if c == QUOTE {
                    quoted = true;
                    i += 1;
                    continue;
                }
            }

            if quoted && c == QUOTE {
                match chars.get(i + 1) {
                    Some(&QUOTE) => {
                        cell.push(QUOTE);
                        i += 2;
                    }
                    Some(&next) if next != self.active => {
                        return Err(ParseError::TextAfterClosingQuote {
                            column: i + 1,
                            found: next,
                        });
                    }
                    _ => {
                        quoted = false;
                        i += 1;
                    }
                }
                continue;
            }

            if !quoted && c == self.active {
                row.push(cell.trim());
                cell.clear();
            } else {
                cell.push(c);
            }
            i += 1;
        }

        row.push(cell.trim());
        Ok(row)
    }

    /// Iterates the data rows of one file.
    ///
    /// The first line is treated as the header: it drives delimiter
    /// detection and is exposed through [`CsvReader::header`] but not
    /// yielded. The first data line is always parsed; later blank lines
    /// are skipped. Malformed lines, including lines that are not valid
    /// UTF-8, are logged and skipped. Any other read error ends the
    /// iteration and is reported by [`CsvReader::interrupted`].
    pub fn rows<R: BufRead>(&mut self, source: R) -> Rows<'_, R> {
        self.active = self.configured;
        self.header = None;
        self.interrupted = false;
        Rows {
            reader: self,
            lines: source.lines(),
            line_index: 0,
        }
    }
}

/// Iterator returned by [`CsvReader::rows`].
pub struct Rows<'a, R> {
    reader: &'a mut CsvReader,
    lines: Lines<R>,
    line_index: usize,
}

impl<R: BufRead> Iterator for Rows<'_, R> {
    type Item = CsvRow;

    fn next(&mut self) -> Option<CsvRow> {
        loop {
            let index = self.line_index;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    self.line_index += 1;
                    error!(line = index, error = %e, "Skipping unreadable line");
                    continue;
                }
                Err(e) => {
                    error!(line = index, error = %e, "Failed to read batch file line");
                    self.reader.interrupted = true;
                    return None;
                }
            };
            self.line_index += 1;

            if index == 0 {
                let header = line.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&line);
                self.reader.detect_delimiter(header);
                match self.reader.parse_line(header) {
                    Ok(row) => self.reader.header = Some(row),
                    Err(e) => warn!(line = index, error = %e, "Malformed header line"),
                }
                continue;
            }

            if index > 1 && line.trim().is_empty() {
                continue;
            }

            match self.reader.parse_line(&line) {
                Ok(row) => return Some(row),
                Err(e) => {
                    error!(line = index, error = %e, "Skipping malformed line");
                }
            }
        }
    }
}
