//! # Delimited Codec
//!
//! Reads and writes the staged batch files exchanged between the
//! extraction connectors and the profile replayer.
//!
//! - [`CsvWriter`] / [`encode_row`] emit comma-separated rows, quoting cells
//!   that contain a quote or a comma and collapsing embedded line breaks.
//! - [`CsvReader`] is a line-oriented, two-state scanner with per-file
//!   delimiter auto-detection on the header line.

pub mod reader;
pub mod row;
pub mod writer;

pub use reader::{CsvReader, ParseError, Rows, DEFAULT_DELIMITER};
pub use row::CsvRow;
pub use writer::{encode_row, CsvWriter, FIELD_SEPARATOR};
