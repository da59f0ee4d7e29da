//! Classification copy and table maintenance over real workbooks.

use proptest::prelude::*;
use quotefill_core::{
    CsvWorkbook, CsvWorkbookOpener, MemoryWorkbook, RowLayout, RowSink, SinkOpener, SymbolEntry,
};
use quotefill_runner::{copy_rows_to_symbol_tables, ensure_symbol_tables, rename_code_only_tables, CopyPlan};

// ── Helpers ──────────────────────────────────────────────────────────

fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn plan() -> CopyPlan {
    CopyPlan {
        first_row: 2,
        anchor_row: 5,
        columns: 16,
    }
}

fn primary_with(rows: &[(&str, &str, &str)]) -> Vec<Vec<String>> {
    let mut table = vec![row(&["date", "code", "name"])];
    table.extend(rows.iter().map(|(d, c, n)| row(&[d, c, n])));
    table
}

// ── Idempotence ──────────────────────────────────────────────────────

#[test]
fn bdd_scenario_second_copy_of_the_same_snapshot_inserts_nothing() {
    // GIVEN a symbol table holding yesterday's snapshot at the anchor
    let wb = MemoryWorkbook::new("data");
    wb.seed_table("data", primary_with(&[("2024-06-18", "2317", "鴻海")]));
    wb.seed_table(
        "2317鴻海",
        vec![
            row(&["history"]),
            vec![],
            vec![],
            vec![],
            row(&["2024-06-17", "2317", "鴻海"]),
        ],
    );
    let mut sink = wb.open().unwrap();
    let symbols = SymbolEntry::parse_all(&["2317"]).unwrap();

    // WHEN classification runs twice
    let first = copy_rows_to_symbol_tables(sink.as_mut(), &symbols, &plan()).unwrap();
    let second = copy_rows_to_symbol_tables(sink.as_mut(), &symbols, &plan()).unwrap();

    // THEN only the first run inserted a slot, and history moved down once
    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.copied.len(), 1);
    assert_eq!(wb.cell("2317鴻海", 5, 0), "2024-06-18");
    assert_eq!(wb.cell("2317鴻海", 6, 0), "2024-06-17");
    assert_eq!(wb.cell("2317鴻海", 7, 0), "");
    assert_eq!(wb.cell("2317鴻海", 1, 0), "history");
}

proptest! {
    #[test]
    fn repeated_copies_insert_at_most_once(runs in 1usize..5, date in "2024-0[1-9]-[12][0-9]") {
        let wb = MemoryWorkbook::new("data");
        wb.seed_table("data", primary_with(&[(date.as_str(), "0050", "元大台灣50")]));
        wb.seed_table("0050", Vec::new());
        let mut sink = wb.open().unwrap();
        let symbols = SymbolEntry::parse_all(&["50"]).unwrap();

        let inserted: usize = (0..runs)
            .map(|_| copy_rows_to_symbol_tables(sink.as_mut(), &symbols, &plan()).unwrap().inserted)
            .sum();

        prop_assert_eq!(inserted, 1);
        prop_assert_eq!(wb.cell("0050", 5, 0), date);
        prop_assert_eq!(wb.cell("0050", 6, 0), "");
    }
}

// ── Directory-of-CSV workbook ────────────────────────────────────────

#[test]
fn bdd_scenario_tables_created_renamed_and_filled_on_disk() {
    // GIVEN a CSV workbook whose primary table lists two symbols
    let dir = tempfile::tempdir().unwrap();
    {
        let mut wb = CsvWorkbook::open(dir.path(), "data", RowLayout::default()).unwrap();
        wb.write_cells("data", 2, &row(&["2024-06-18", "2317", "鴻海"])).unwrap();
        wb.write_cells("data", 3, &row(&["2024-06-18", "0050", "元大台灣50"])).unwrap();
        wb.close().unwrap();
    }
    let opener = CsvWorkbookOpener::new(dir.path(), "data", RowLayout::default());
    let symbols = SymbolEntry::parse_all(&["2317", "50"]).unwrap();

    // WHEN missing tables are created, renamed, and classification copies
    let mut sink = opener.open().unwrap();
    let created = ensure_symbol_tables(sink.as_mut(), &symbols).unwrap();
    let renamed = rename_code_only_tables(sink.as_mut(), 1, 2, 2).unwrap();
    let report = copy_rows_to_symbol_tables(sink.as_mut(), &symbols, &plan()).unwrap();
    sink.close().unwrap();

    // THEN each symbol has a named table carrying its snapshot
    assert_eq!(created, vec!["0050", "2317"]);
    assert_eq!(renamed.len(), 2);
    assert_eq!(report.copied.len(), 2);
    assert!(dir.path().join("2317鴻海.csv").exists());
    assert!(dir.path().join("0050元大台灣50.csv").exists());
    assert!(!dir.path().join("2317.csv").exists());

    let reopened = opener.open().unwrap();
    let snapshot = reopened.read_cells("0050元大台灣50", 5, 3).unwrap();
    assert_eq!(snapshot, row(&["2024-06-18", "0050", "元大台灣50"]));
}
