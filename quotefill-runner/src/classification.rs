//! Classification phase: copy each symbol's primary row into its tables.
//!
//! The snapshot lands on the anchor row of every table whose leading code
//! matches the symbol. A blank row is inserted at the anchor first unless
//! the anchor's first cell already equals the source's first cell, which is
//! taken to mean this snapshot was copied before.

use quotefill_core::{RowSink, SinkError, Symbol, SymbolEntry};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::tables::table_code;

/// Where rows come from and where they go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPlan {
    pub first_row: usize,
    pub anchor_row: usize,
    pub columns: usize,
}

impl CopyPlan {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            first_row: config.first_data_row,
            anchor_row: config.anchor_row,
            columns: config.copy_columns,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyReport {
    /// (symbol, target table) per copy made.
    pub copied: Vec<(Symbol, String)>,
    pub inserted: usize,
    /// No table carries the symbol's code.
    pub unmatched: Vec<Symbol>,
    /// The source row was empty; nothing copied.
    pub empty: Vec<Symbol>,
}

pub fn copy_rows_to_symbol_tables(
    sink: &mut dyn RowSink,
    symbols: &[SymbolEntry],
    plan: &CopyPlan,
) -> Result<CopyReport, SinkError> {
    let primary = sink.primary_table();
    let tables: Vec<(String, String)> = sink
        .table_names()
        .into_iter()
        .filter(|name| *name != primary)
        .filter_map(|name| table_code(&name).map(|code| (name, code)))
        .collect();

    let mut report = CopyReport::default();
    for (index, entry) in symbols.iter().enumerate() {
        let row = plan.first_row + index;
        let source = sink.read_cells(&primary, row, plan.columns)?;
        if source.iter().all(|c| c.trim().is_empty()) {
            report.empty.push(entry.symbol.clone());
            continue;
        }

        let mut matched = false;
        for (table, _) in tables.iter().filter(|(_, code)| code == entry.symbol.as_str()) {
            matched = true;
            let anchor = sink.read_cells(table, plan.anchor_row, 1)?;
            if anchor[0] != source[0] {
                sink.insert_blank_row(table, plan.anchor_row)?;
                report.inserted += 1;
            }
            sink.write_cells(table, plan.anchor_row, &source)?;
            debug!(symbol = %entry.symbol, table = %table, row, "snapshot copied");
            report.copied.push((entry.symbol.clone(), table.clone()));
        }
        if !matched {
            report.unmatched.push(entry.symbol.clone());
        }
    }

    sink.flush()?;
    info!(
        copied = report.copied.len(),
        inserted = report.inserted,
        unmatched = report.unmatched.len(),
        "classification finished"
    );
    Ok(report)
}
