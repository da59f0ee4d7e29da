//! Row sinks: the persisted output of a run.
//!
//! A sink is a workbook of named tables addressed by 1-based row and 0-based
//! column. Row 1 is the header. The pool writes records into the primary
//! table; the classification phase copies cells between tables.

pub mod csv_workbook;
pub mod grid;
pub mod layout;
pub mod memory;

use thiserror::Error;

use crate::domain::Record;

pub use csv_workbook::{CsvWorkbook, CsvWorkbookOpener};
pub use grid::{Book, Table};
pub use layout::{column_index, column_letters, RowLayout};
pub use memory::MemoryWorkbook;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("no table named '{0}'")]
    NoSuchTable(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("invalid row {0} (rows start at 1)")]
    InvalidRow(usize),

    #[error("sink is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One open handle on the output workbook. Only one writer at a time;
/// rows may be written in any order.
pub trait RowSink: Send {
    fn primary_table(&self) -> String;

    /// Write `record` into row `row` of the primary table. Only the columns
    /// of the record's fields (and the symbol column) are touched.
    fn write_row(&mut self, row: usize, record: &Record) -> Result<(), SinkError>;

    fn table_names(&self) -> Vec<String>;

    /// The first `width` cells of a row; missing cells read as empty.
    fn read_cells(&self, table: &str, row: usize, width: usize) -> Result<Vec<String>, SinkError>;

    fn write_cells(&mut self, table: &str, row: usize, cells: &[String]) -> Result<(), SinkError>;

    /// Shift rows `before..` down by one, leaving `before` empty.
    fn insert_blank_row(&mut self, table: &str, before: usize) -> Result<(), SinkError>;

    fn add_table(&mut self, name: &str) -> Result<(), SinkError>;

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush and release. Further calls fail with `Closed`.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Opens a fresh sink handle for each phase.
pub trait SinkOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn RowSink>, SinkError>;
}
