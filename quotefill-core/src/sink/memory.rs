//! Shared in-memory workbook with failure injection.
//!
//! Every clone is a handle on the same book, so a test can keep one handle
//! for inspection while the pipeline owns another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::Record;

use super::grid::{Book, Table};
use super::layout::RowLayout;
use super::{RowSink, SinkError, SinkOpener};

#[derive(Debug)]
struct State {
    book: Book,
    failing_rows: HashSet<usize>,
    failing_flushes: usize,
    writes: Vec<usize>,
    flushes: usize,
    closes: usize,
    opens: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryWorkbook {
    state: Arc<Mutex<State>>,
    closed: bool,
}

impl MemoryWorkbook {
    pub fn new(primary: &str) -> Self {
        Self::with_layout(primary, RowLayout::default())
    }

    pub fn with_layout(primary: &str, layout: RowLayout) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                book: Book::new(primary, layout, Vec::new()),
                failing_rows: HashSet::new(),
                failing_flushes: 0,
                writes: Vec::new(),
                flushes: 0,
                closes: 0,
                opens: 0,
            })),
            closed: false,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `write_row` at `row` fails with an I/O error from now on.
    pub fn fail_writes_at(&self, row: usize) {
        self.state().failing_rows.insert(row);
    }

    /// The next `n` flushes fail.
    pub fn fail_next_flushes(&self, n: usize) {
        self.state().failing_flushes = n;
    }

    /// Add a table with preset rows.
    pub fn seed_table(&self, name: &str, rows: Vec<Vec<String>>) {
        let mut state = self.state();
        if state.book.table(name).is_err() {
            let _ = state.book.add_table(name);
        }
        if let Ok(table) = state.book.table_mut(name) {
            *table = Table::from_rows(name, rows);
        }
    }

    /// Rows passed to successful `write_row` calls, in call order.
    pub fn writes(&self) -> Vec<usize> {
        self.state().writes.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state().flushes
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn snapshot(&self) -> Book {
        self.state().book.clone()
    }

    pub fn cell(&self, table: &str, row: usize, col: usize) -> String {
        self.state()
            .book
            .table(table)
            .map(|t| t.cell(row, col).to_string())
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RowSink for MemoryWorkbook {
    fn primary_table(&self) -> String {
        self.state().book.primary().to_string()
    }

    fn write_row(&mut self, row: usize, record: &Record) -> Result<(), SinkError> {
        self.ensure_open()?;
        let mut state = self.state();
        if state.failing_rows.contains(&row) {
            return Err(SinkError::Io(format!("injected write failure at row {row}")));
        }
        state.book.write_record(row, record)?;
        state.writes.push(row);
        Ok(())
    }

    fn table_names(&self) -> Vec<String> {
        self.state().book.names()
    }

    fn read_cells(&self, table: &str, row: usize, width: usize) -> Result<Vec<String>, SinkError> {
        self.ensure_open()?;
        self.state().book.table(table)?.row(row, width)
    }

    fn write_cells(&mut self, table: &str, row: usize, cells: &[String]) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.state().book.table_mut(table)?.set_row(row, cells)
    }

    fn insert_blank_row(&mut self, table: &str, before: usize) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.state().book.table_mut(table)?.insert_blank_row(before)
    }

    fn add_table(&mut self, name: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.state().book.add_table(name)
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.state().book.rename_table(from, to)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.ensure_open()?;
        let mut state = self.state();
        if state.failing_flushes > 0 {
            state.failing_flushes -= 1;
            return Err(SinkError::Io("injected flush failure".into()));
        }
        state.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.state().closes += 1;
        self.closed = true;
        Ok(())
    }
}

impl SinkOpener for MemoryWorkbook {
    fn open(&self) -> Result<Box<dyn RowSink>, SinkError> {
        self.state().opens += 1;
        let mut handle = self.clone();
        handle.closed = false;
        Ok(Box::new(handle))
    }
}
