//! Per-symbol table maintenance.
//!
//! A symbol table is any table whose name starts with a 4 to 6 digit code,
//! optionally followed by a letter suffix and then anything else
//! (`2317`, `2317鴻海`, `00773B元大美債`).

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use quotefill_core::domain::normalize;
use quotefill_core::{RowSink, SinkError, SymbolEntry};
use regex::Regex;
use tracing::{debug, info};

fn code_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]{4,6})([A-Za-z]*)").expect("static regex is valid"))
}

/// The normalized code a table name starts with, if any.
pub fn table_code(name: &str) -> Option<String> {
    let m = code_prefix().find(name)?;
    normalize(m.as_str()).ok()
}

/// Create a table named by its code for every symbol that has none yet.
/// Returns the names of the tables created.
pub fn ensure_symbol_tables(
    sink: &mut dyn RowSink,
    symbols: &[SymbolEntry],
) -> Result<Vec<String>, SinkError> {
    let existing: HashSet<String> = sink
        .table_names()
        .iter()
        .filter_map(|name| table_code(name))
        .collect();
    let wanted: BTreeSet<&str> = symbols.iter().map(|e| e.symbol.as_str()).collect();

    let mut created = Vec::new();
    for code in wanted {
        if existing.contains(code) {
            continue;
        }
        sink.add_table(code)?;
        debug!(table = code, "symbol table created");
        created.push(code.to_string());
    }
    if !created.is_empty() {
        info!(count = created.len(), "created missing symbol tables");
    }
    Ok(created)
}

/// Rename every table named exactly by a code to code + name, reading the
/// code/name pairs from the primary table starting at `first_row` until the
/// first row with an empty code. Renames that would collide are skipped.
pub fn rename_code_only_tables(
    sink: &mut dyn RowSink,
    code_col: usize,
    name_col: usize,
    first_row: usize,
) -> Result<Vec<(String, String)>, SinkError> {
    let primary = sink.primary_table();
    let width = code_col.max(name_col) + 1;

    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut row = first_row;
    loop {
        let cells = sink.read_cells(&primary, row, width)?;
        let code = cells[code_col].trim();
        if code.is_empty() {
            break;
        }
        if !pairs.iter().any(|(c, _)| c == code) {
            pairs.push((code.to_string(), cells[name_col].trim().to_string()));
        }
        row += 1;
    }

    let mut names: HashSet<String> = sink.table_names().into_iter().collect();
    let mut renamed = Vec::new();
    for (code, name) in pairs {
        if name.is_empty() {
            continue;
        }
        let target = format!("{code}{name}");
        if !names.contains(&code) || names.contains(&target) {
            continue;
        }
        sink.rename_table(&code, &target)?;
        names.remove(&code);
        names.insert(target.clone());
        renamed.push((code, target));
    }
    info!(count = renamed.len(), "code-only tables renamed");
    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotefill_core::{MemoryWorkbook, SinkOpener};

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_codes() {
        assert_eq!(table_code("2317").as_deref(), Some("2317"));
        assert_eq!(table_code("2317鴻海").as_deref(), Some("2317"));
        assert_eq!(table_code("00773b美債").as_deref(), Some("00773B"));
        assert_eq!(table_code("data"), None);
        assert_eq!(table_code("123"), None);
    }

    #[test]
    fn creates_only_missing_tables() {
        let wb = MemoryWorkbook::new("data");
        wb.seed_table("2317鴻海", Vec::new());
        let mut sink = wb.open().unwrap();
        let symbols = SymbolEntry::parse_all(&["2317", "50", "0050"]).unwrap();

        let created = ensure_symbol_tables(sink.as_mut(), &symbols).unwrap();

        assert_eq!(created, vec!["0050"]);
        assert!(ensure_symbol_tables(sink.as_mut(), &symbols).unwrap().is_empty());
    }

    #[test]
    fn renames_code_only_tables_and_skips_collisions() {
        let wb = MemoryWorkbook::new("data");
        wb.seed_table(
            "data",
            vec![
                cells(&["date", "code", "name"]),
                cells(&["", "2317", "鴻海"]),
                cells(&["", "0050", "元大台灣50"]),
                cells(&["", "2330", ""]),
                cells(&["", "", "ignored"]),
                cells(&["", "1232", "大統益"]),
            ],
        );
        wb.seed_table("2317", Vec::new());
        wb.seed_table("0050", Vec::new());
        wb.seed_table("0050元大台灣50", Vec::new());
        wb.seed_table("2330", Vec::new());
        wb.seed_table("1232", Vec::new());
        let mut sink = wb.open().unwrap();

        let renamed = rename_code_only_tables(sink.as_mut(), 1, 2, 2).unwrap();

        assert_eq!(renamed, vec![("2317".to_string(), "2317鴻海".to_string())]);
        let names = sink.table_names();
        assert!(names.contains(&"0050".to_string()));
        assert!(names.contains(&"2330".to_string()));
        assert!(names.contains(&"1232".to_string()));
    }
}
