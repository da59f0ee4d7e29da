//! In-memory workbook model shared by the sink implementations.

use crate::domain::{Record, BLANK};
use crate::fields;

use super::layout::RowLayout;
use super::SinkError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    name: String,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of the last row present (0 when empty).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn index(row: usize) -> Result<usize, SinkError> {
        row.checked_sub(1).ok_or(SinkError::InvalidRow(row))
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        row.checked_sub(1)
            .and_then(|r| self.rows.get(r))
            .and_then(|cells| cells.get(col))
            .map_or("", String::as_str)
    }

    pub fn row(&self, row: usize, width: usize) -> Result<Vec<String>, SinkError> {
        Self::index(row)?;
        Ok((0..width).map(|c| self.cell(row, c).to_string()).collect())
    }

    pub fn set(&mut self, row: usize, col: usize, value: &str) -> Result<(), SinkError> {
        let r = Self::index(row)?;
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
        Ok(())
    }

    pub fn set_row(&mut self, row: usize, cells: &[String]) -> Result<(), SinkError> {
        for (col, value) in cells.iter().enumerate() {
            self.set(row, col, value)?;
        }
        Ok(())
    }

    pub fn insert_blank_row(&mut self, before: usize) -> Result<(), SinkError> {
        let r = Self::index(before)?;
        if self.rows.len() < r {
            self.rows.resize_with(r, Vec::new);
        }
        self.rows.insert(r, Vec::new());
        Ok(())
    }
}

/// A set of uniquely named tables, one of them primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    primary: String,
    layout: RowLayout,
    tables: Vec<Table>,
}

impl Book {
    /// A book whose primary table gets the layout header if it is new.
    pub fn new(primary: impl Into<String>, layout: RowLayout, tables: Vec<Table>) -> Self {
        let primary = primary.into();
        let mut book = Self {
            primary,
            layout,
            tables,
        };
        if book.table(&book.primary.clone()).is_err() {
            let mut table = Table::new(book.primary.clone());
            // row 1 always exists
            let _ = table.set_row(1, &book.layout.header());
            book.tables.push(table);
        }
        book
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn table(&self, name: &str) -> Result<&Table, SinkError> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SinkError::NoSuchTable(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table, SinkError> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SinkError::NoSuchTable(name.to_string()))
    }

    pub fn add_table(&mut self, name: &str) -> Result<(), SinkError> {
        if self.table(name).is_ok() {
            return Err(SinkError::TableExists(name.to_string()));
        }
        self.tables.push(Table::new(name));
        Ok(())
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> Result<(), SinkError> {
        if from != to && self.table(to).is_ok() {
            return Err(SinkError::TableExists(to.to_string()));
        }
        let table = self.table_mut(from)?;
        table.name = to.to_string();
        if self.primary == from {
            self.primary = to.to_string();
        }
        Ok(())
    }

    /// Lay a record out over one row of the primary table. A blank field
    /// marked keep-previous takes the cell already stored there, and the
    /// derived fields are recomputed from it.
    pub fn write_record(&mut self, row: usize, record: &Record) -> Result<(), SinkError> {
        if row == 0 {
            return Err(SinkError::InvalidRow(row));
        }
        let carried = self.carry_forward(row, record)?;
        let record = carried.as_ref().unwrap_or(record);
        let symbol_column = self.layout.symbol_column();
        let cells: Vec<(usize, String)> = record
            .fields()
            .filter_map(|(name, value)| Some((self.layout.column(name)?, value.to_string())))
            .collect();
        let primary = self.primary.clone();
        let table = self.table_mut(&primary)?;
        table.set(row, symbol_column, record.symbol().as_str())?;
        for (col, value) in cells {
            table.set(row, col, &value)?;
        }
        Ok(())
    }

    /// `Some` when at least one kept field picked up a stored value.
    fn carry_forward(&self, row: usize, record: &Record) -> Result<Option<Record>, SinkError> {
        let table = self.table(&self.primary)?;
        let mut merged: Option<Record> = None;
        for name in record.kept_blanks() {
            let Some(col) = self.layout.column(name) else {
                continue;
            };
            let stored = table.cell(row, col).trim();
            if stored.is_empty() || stored == BLANK {
                continue;
            }
            merged.get_or_insert_with(|| record.clone()).set(name, stored);
        }
        if let Some(record) = merged.as_mut() {
            fields::rederive(record);
        }
        Ok(merged)
    }
}
