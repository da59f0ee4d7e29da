//! Mapping from record keys to spreadsheet columns.

use std::collections::BTreeMap;

use crate::fields::names::*;

/// 0-based column index of a column label (`A` = 0, `AA` = 26).
pub fn column_index(label: &str) -> Option<usize> {
    if label.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// Column label of a 0-based index.
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

/// Where each record key lands in the primary table.
///
/// Column B holds the symbol code; the realtime quote occupies A and C..P,
/// the full attribute set P..AN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    symbol_column: usize,
    columns: BTreeMap<&'static str, usize>,
}

const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    (DATE, "A"),
    (NAME, "C"),
    (BEST_BID, "D"),
    (BEST_ASK, "E"),
    (LATEST_PRICE, "F"),
    (CHANGE, "G"),
    (CHANGE_PCT, "H"),
    (TRADE_VOLUME, "I"),
    (BEST_BID_VOLUME, "J"),
    (BEST_ASK_VOLUME, "K"),
    (ACCUMULATED_VOLUME, "L"),
    (HIGH, "M"),
    (LOW, "N"),
    (OPEN, "O"),
    (PRIOR_CLOSE, "P"),
    (PE_RATIO, "Q"),
    (PB_RATIO, "R"),
    (ROE, "S"),
    (ROA, "T"),
    (GROSS_MARGIN, "U"),
    (OPERATING_MARGIN, "V"),
    (NET_MARGIN, "W"),
    (NAV_PER_SHARE, "X"),
    (EPS, "Y"),
    (CURRENT_RATIO, "Z"),
    (QUICK_RATIO, "AA"),
    (DEBT_RATIO, "AB"),
    (INTEREST_COVERAGE, "AC"),
    (RECEIVABLE_DAYS, "AD"),
    (INVENTORY_DAYS, "AE"),
    (CASH_DIVIDEND, "AF"),
    (STOCK_DIVIDEND, "AG"),
    (DIVIDEND_YIELD, "AH"),
    (EX_DIVIDEND_DATE, "AI"),
    (DIVIDEND_PAY_DATE, "AJ"),
    (EX_RIGHTS_DATE, "AK"),
    (REINVESTMENT_RATIO, "AL"),
    (CASH_FLOW, "AM"),
    (MANAGEMENT_FEE, "AN"),
];

impl Default for RowLayout {
    fn default() -> Self {
        let columns = DEFAULT_COLUMNS
            .iter()
            .filter_map(|(name, col)| Some((*name, column_index(col)?)))
            .collect();
        Self {
            symbol_column: 1,
            columns,
        }
    }
}

impl RowLayout {
    pub fn symbol_column(&self) -> usize {
        self.symbol_column
    }

    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    /// One past the right-most mapped column.
    pub fn width(&self) -> usize {
        self.columns
            .values()
            .copied()
            .chain(std::iter::once(self.symbol_column))
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Header row: field names at their columns, `code` at the symbol column.
    pub fn header(&self) -> Vec<String> {
        let mut row = vec![String::new(); self.width()];
        row[self.symbol_column] = "code".to_string();
        for (name, col) in &self.columns {
            row[*col] = (*name).to_string();
        }
        row
    }
}
