//! Directory-of-CSV workbook: one `<table>.csv` per table.
//!
//! The whole book is loaded on open and held in memory; `flush` rewrites
//! every table atomically (write to `.csv.tmp`, then rename).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::Record;

use super::grid::{Book, Table};
use super::layout::RowLayout;
use super::{RowSink, SinkError, SinkOpener};

const EXTENSION: &str = "csv";

pub struct CsvWorkbook {
    dir: PathBuf,
    book: Book,
    /// Files of tables renamed away since the last flush.
    stale: Vec<String>,
    closed: bool,
}

fn check_name(name: &str) -> Result<(), SinkError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(SinkError::Io(format!("invalid table name '{name}'")));
    }
    Ok(())
}

fn read_table(path: &Path, name: &str) -> Result<Table, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table::from_rows(name, rows))
}

fn write_table(dir: &Path, table: &Table) -> Result<(), SinkError> {
    let path = dir.join(format!("{}.{EXTENSION}", table.name()));
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&tmp_path)?;
        for row in table.rows() {
            if row.is_empty() {
                // csv skips zero-field records; keep the line
                writer.write_record([""])?;
            } else {
                writer.write_record(row)?;
            }
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SinkError::Io(format!("atomic rename failed for {}: {e}", path.display()))
    })
}

impl CsvWorkbook {
    /// Open (or create) the workbook in `dir`. A missing primary table is
    /// created with the layout header.
    pub fn open(dir: impl Into<PathBuf>, primary: &str, layout: RowLayout) -> Result<Self, SinkError> {
        let dir = dir.into();
        check_name(primary)?;
        fs::create_dir_all(&dir)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == EXTENSION))
            .collect();
        paths.sort();

        let mut tables = Vec::with_capacity(paths.len());
        for path in &paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            tables.push(read_table(path, name)?);
        }
        debug!(dir = %dir.display(), tables = tables.len(), "opened workbook");

        Ok(Self {
            dir,
            book: Book::new(primary, layout, tables),
            stale: Vec::new(),
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RowSink for CsvWorkbook {
    fn primary_table(&self) -> String {
        self.book.primary().to_string()
    }

    fn write_row(&mut self, row: usize, record: &Record) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.book.write_record(row, record)
    }

    fn table_names(&self) -> Vec<String> {
        self.book.names()
    }

    fn read_cells(&self, table: &str, row: usize, width: usize) -> Result<Vec<String>, SinkError> {
        self.ensure_open()?;
        self.book.table(table)?.row(row, width)
    }

    fn write_cells(&mut self, table: &str, row: usize, cells: &[String]) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.book.table_mut(table)?.set_row(row, cells)
    }

    fn insert_blank_row(&mut self, table: &str, before: usize) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.book.table_mut(table)?.insert_blank_row(before)
    }

    fn add_table(&mut self, name: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        check_name(name)?;
        self.book.add_table(name)?;
        self.stale.retain(|n| n != name);
        Ok(())
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        check_name(to)?;
        self.book.rename_table(from, to)?;
        if from != to {
            self.stale.push(from.to_string());
            self.stale.retain(|n| n != to);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.ensure_open()?;
        for table in self.book.tables() {
            write_table(&self.dir, table)?;
        }
        for name in self.stale.drain(..) {
            let path = self.dir.join(format!("{name}.{EXTENSION}"));
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        debug!(dir = %self.dir.display(), "workbook flushed");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }
}

/// Opens the same directory afresh for every phase.
#[derive(Debug, Clone)]
pub struct CsvWorkbookOpener {
    dir: PathBuf,
    primary: String,
    layout: RowLayout,
}

impl CsvWorkbookOpener {
    pub fn new(dir: impl Into<PathBuf>, primary: impl Into<String>, layout: RowLayout) -> Self {
        Self {
            dir: dir.into(),
            primary: primary.into(),
            layout,
        }
    }
}

impl SinkOpener for CsvWorkbookOpener {
    fn open(&self) -> Result<Box<dyn RowSink>, SinkError> {
        let wb = CsvWorkbook::open(&self.dir, &self.primary, self.layout.clone())?;
        Ok(Box::new(wb))
    }
}
