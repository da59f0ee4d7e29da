//! Bounded fan-out of per-symbol aggregation with a single sink writer.
//!
//! Aggregations run on a private rayon pool (never the global one). Each
//! finished record travels back over an `mpsc` channel to the calling
//! thread, which owns the sink and writes rows as they arrive. Row position
//! comes from the symbol's input index, so completion order never changes
//! where a record lands.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use quotefill_core::{Aggregate, Aggregated, FetchError, RecordStatus, RowSink, SinkError, Symbol, SymbolEntry};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    ZeroConcurrency,

    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// A row write that failed. The rest of the batch carries on.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub symbol: Symbol,
    pub row: usize,
    pub error: SinkError,
}

/// What one pass over the symbol list produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    pub written: usize,
    /// Partially filled, unclassified or unreachable symbols.
    pub degraded: Vec<Symbol>,
    /// Not written; their rows keep their previous content.
    pub unreachable: Vec<(Symbol, FetchError)>,
    pub unclassified: Vec<Symbol>,
    pub sink_failures: Vec<SinkFailure>,
    pub panicked: Vec<Symbol>,
    /// Not started because the pass was cancelled.
    pub skipped: Vec<Symbol>,
}

impl BatchReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// The first cause, if every symbol was unreachable for connectivity
    /// reasons.
    pub fn connectivity_outage(&self) -> Option<&FetchError> {
        if self.total == 0 || self.unreachable.len() != self.total {
            return None;
        }
        if self.unreachable.iter().all(|(_, cause)| cause.is_connectivity()) {
            self.unreachable.first().map(|(_, cause)| cause)
        } else {
            None
        }
    }

    pub fn is_clean(&self) -> bool {
        self.degraded.is_empty()
            && self.sink_failures.is_empty()
            && self.panicked.is_empty()
            && self.skipped.is_empty()
    }

    fn absorb(&mut self, aggregated: &Aggregated) {
        let symbol = aggregated.record.symbol().clone();
        if aggregated.unclassified {
            self.unclassified.push(symbol.clone());
        }
        if let RecordStatus::Unreachable { cause } = &aggregated.status {
            self.unreachable.push((symbol.clone(), cause.clone()));
        }
        if aggregated.is_degraded() {
            self.degraded.push(symbol);
        }
    }
}

enum Outcome {
    Done(Aggregated),
    Panicked,
    Skipped,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self, PoolError> {
        if concurrency == 0 {
            return Err(PoolError::ZeroConcurrency);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("quotefill-pool-{i}"))
            .build()?;
        Ok(Self { pool, concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Aggregate every symbol and write its record at `row_of(index)`.
    /// Unreachable symbols are reported but not written.
    ///
    /// Blocks until every dispatched task has finished, then flushes the
    /// sink once. A failed row write is recorded in the report; only a
    /// failed flush is returned as an error. Once `cancel` is raised,
    /// symbols not yet started are skipped while running ones complete.
    pub fn run(
        &self,
        aggregator: &dyn Aggregate,
        symbols: &[SymbolEntry],
        row_of: &dyn Fn(usize) -> usize,
        sink: &mut dyn RowSink,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchReport, SinkError> {
        let mut report = BatchReport::new(symbols.len());
        let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
        let pool = &self.pool;

        std::thread::scope(|s| {
            s.spawn(move || {
                pool.scope(|scope| {
                    for (index, entry) in symbols.iter().enumerate() {
                        let tx = tx.clone();
                        scope.spawn(move |_| {
                            let outcome = if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                                Outcome::Skipped
                            } else {
                                match catch_unwind(AssertUnwindSafe(|| {
                                    aggregator.aggregate(&entry.symbol, entry.kind)
                                })) {
                                    Ok(aggregated) => Outcome::Done(aggregated),
                                    Err(_) => Outcome::Panicked,
                                }
                            };
                            // The receiver outlives every task.
                            let _ = tx.send((index, outcome));
                        });
                    }
                });
            });

            for (index, outcome) in rx {
                let symbol = &symbols[index].symbol;
                match outcome {
                    Outcome::Skipped => report.skipped.push(symbol.clone()),
                    Outcome::Panicked => {
                        error!(symbol = %symbol, "aggregation panicked");
                        report.panicked.push(symbol.clone());
                    }
                    Outcome::Done(aggregated) => {
                        let row = row_of(index);
                        report.absorb(&aggregated);
                        if aggregated.is_unreachable() {
                            // keep whatever the row held before
                            continue;
                        }
                        match sink.write_row(row, &aggregated.record) {
                            Ok(()) => {
                                debug!(symbol = %symbol, row, "row written");
                                report.written += 1;
                            }
                            Err(e) => {
                                warn!(symbol = %symbol, row, error = %e, "row write failed");
                                report.sink_failures.push(SinkFailure {
                                    symbol: symbol.clone(),
                                    row,
                                    error: e,
                                });
                            }
                        }
                    }
                }
            }
        });

        sink.flush()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotefill_core::{InstrumentKind, MemoryWorkbook, Record, SinkOpener};

    struct Blank;

    impl Aggregate for Blank {
        fn aggregate(&self, symbol: &Symbol, _kind: Option<InstrumentKind>) -> Aggregated {
            Aggregated {
                record: Record::blank(symbol.clone(), InstrumentKind::Equity, ["eps"]),
                status: RecordStatus::Complete,
                unclassified: false,
            }
        }
    }

    fn entries(codes: &[&str]) -> Vec<SymbolEntry> {
        SymbolEntry::parse_all(codes).unwrap()
    }

    #[test]
    fn zero_threads_is_an_error() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::ZeroConcurrency)));
    }

    #[test]
    fn writes_every_symbol_then_flushes_once() {
        let pool = WorkerPool::new(3).unwrap();
        let wb = MemoryWorkbook::new("data");
        let mut sink = wb.open().unwrap();
        let symbols = entries(&["2317", "0050", "2330", "1232"]);

        let report = pool.run(&Blank, &symbols, &|i| i + 2, sink.as_mut(), None).unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.written, 4);
        assert!(report.is_clean());
        let mut rows = wb.writes();
        rows.sort_unstable();
        assert_eq!(rows, vec![2, 3, 4, 5]);
        assert_eq!(wb.cell("data", 3, 1), "0050");
        assert_eq!(wb.flushes(), 1);
    }

    #[test]
    fn raised_cancel_skips_everything_not_started() {
        let pool = WorkerPool::new(2).unwrap();
        let wb = MemoryWorkbook::new("data");
        let mut sink = wb.open().unwrap();
        let cancel = AtomicBool::new(true);

        let report = pool
            .run(&Blank, &entries(&["2317", "0050"]), &|i| i + 2, sink.as_mut(), Some(&cancel))
            .unwrap();

        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.written, 0);
        assert!(wb.writes().is_empty());
    }

    #[test]
    fn outage_needs_every_symbol_unreachable() {
        let cause = FetchError::Unreachable {
            url: "http://x".into(),
            reason: "refused".into(),
        };
        let sym = Symbol::parse("2317").unwrap();
        let mut report = BatchReport::new(2);
        report.unreachable.push((sym.clone(), cause.clone()));
        assert!(report.connectivity_outage().is_none());
        report.unreachable.push((sym, cause.clone()));
        assert_eq!(report.connectivity_outage(), Some(&cause));
    }
}
