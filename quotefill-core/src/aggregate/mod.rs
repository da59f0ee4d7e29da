//! Per-symbol attribute aggregation.
//!
//! `aggregate()` never fails: each field task degrades to the blank
//! placeholder on its own, and a symbol whose shared pages cannot be reached
//! at all comes back as an all-blank record with an `Unreachable` status.

pub mod classify;
pub mod pages;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{InstrumentKind, Record, Symbol};
use crate::fetch::{Document, Endpoints, FetchError, RetryingFetcher};
use crate::fields::{
    field_table, AggregationMode, Compute, FieldContext, FieldError, FieldSpec, FieldTask,
    PageSource,
};

pub use classify::{Classifier, YahooSearchClassifier};
pub use pages::PageCache;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordStatus {
    /// Every extract task produced a value.
    Complete,
    /// Some fields fell back to the placeholder.
    Partial { failed: Vec<&'static str> },
    /// None of the shared pages could be reached; the record is all blank.
    Unreachable { cause: FetchError },
}

/// A finished record plus how it came to be.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    pub record: Record,
    pub status: RecordStatus,
    /// No kind was supplied and remote classification failed.
    pub unclassified: bool,
}

impl Aggregated {
    pub fn is_degraded(&self) -> bool {
        self.unclassified || !matches!(self.status, RecordStatus::Complete)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.status, RecordStatus::Unreachable { .. })
    }

    /// Unreachable because of connectivity, as opposed to e.g. a 404.
    pub fn connectivity_failure(&self) -> Option<&FetchError> {
        match &self.status {
            RecordStatus::Unreachable { cause } if cause.is_connectivity() => Some(cause),
            _ => None,
        }
    }
}

/// The aggregation seam used by the worker pool.
pub trait Aggregate: Send + Sync {
    fn aggregate(&self, symbol: &Symbol, kind: Option<InstrumentKind>) -> Aggregated;
}

enum FieldLog {
    Resolved { field: &'static str, value: String },
    Failed { field: &'static str, error: FieldError },
}

impl fmt::Display for FieldLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved { field, value } => write!(f, "{field}: {value}"),
            Self::Failed { field, error } => write!(f, "{field}: failed ({error})"),
        }
    }
}

pub struct Aggregator {
    fetcher: RetryingFetcher,
    endpoints: Endpoints,
    classifier: Option<Arc<dyn Classifier>>,
    mode: AggregationMode,
}

impl Aggregator {
    /// Every attribute applicable to the kind. Symbols with no supplied
    /// kind are classified through `classifier`, if any.
    pub fn full(
        fetcher: RetryingFetcher,
        endpoints: Endpoints,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            classifier,
            mode: AggregationMode::Full,
        }
    }

    /// Realtime quote fields only; kind is irrelevant and never looked up.
    pub fn quote_only(fetcher: RetryingFetcher, endpoints: Endpoints) -> Self {
        Self {
            fetcher,
            endpoints,
            classifier: None,
            mode: AggregationMode::QuoteOnly,
        }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    fn resolve_kind(&self, symbol: &Symbol, kind: Option<InstrumentKind>) -> (InstrumentKind, bool) {
        if let Some(kind) = kind {
            return (kind, false);
        }
        if self.mode == AggregationMode::QuoteOnly {
            return (InstrumentKind::Unknown, false);
        }
        match &self.classifier {
            Some(classifier) => match classifier.classify(symbol) {
                Ok(kind) => (kind, false),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "classification failed, using common fields");
                    (InstrumentKind::Unknown, true)
                }
            },
            None => (InstrumentKind::Unknown, true),
        }
    }
}

impl Aggregate for Aggregator {
    fn aggregate(&self, symbol: &Symbol, kind: Option<InstrumentKind>) -> Aggregated {
        let (kind, unclassified) = self.resolve_kind(symbol, kind);
        let table = field_table(self.mode, kind);
        let mut record = Record::blank(symbol.clone(), kind, table.iter().map(|s| s.name));
        for spec in table.iter().filter(|s| s.keep_previous) {
            record.keep_previous_when_blank(spec.name);
        }

        let pages = PageCache::new(&self.fetcher, &self.endpoints, symbol);

        let shared: Vec<_> = self
            .mode
            .shared_pages()
            .iter()
            .map(|p| pages.page(*p))
            .collect();
        if let Some(cause) = all_unreachable(&shared) {
            warn!(symbol = %symbol, mode = %self.mode, error = %cause, "symbol unreachable");
            return Aggregated {
                record,
                status: RecordStatus::Unreachable { cause },
                unclassified,
            };
        }

        let ctx = FieldContext::new(symbol, kind, &pages);
        let outcomes = run_extract_tasks(table, &ctx);

        let mut failed = Vec::new();
        let mut log = Vec::with_capacity(table.len());
        for (field, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    record.set(field, value.as_str());
                    log.push(FieldLog::Resolved { field, value });
                }
                Err(error) => {
                    failed.push(field);
                    log.push(FieldLog::Failed { field, error });
                }
            }
        }

        for spec in table {
            if let Compute::Derived(derive) = spec.compute {
                if let Some(value) = derive(&record) {
                    record.set(spec.name, value);
                }
            }
        }

        let lines: Vec<String> = log.iter().map(ToString::to_string).collect();
        debug!(symbol = %symbol, mode = %self.mode, "fields:\n  {}", lines.join("\n  "));

        let status = if failed.is_empty() {
            RecordStatus::Complete
        } else {
            warn!(symbol = %symbol, mode = %self.mode, failed = ?failed, "partially filled");
            RecordStatus::Partial { failed }
        };

        Aggregated {
            record,
            status,
            unclassified,
        }
    }
}

/// `Some(cause)` when every shared page failed for lack of connectivity.
fn all_unreachable(shared: &[Result<Arc<Document>, FetchError>]) -> Option<FetchError> {
    if shared.is_empty() {
        return None;
    }
    let mut first = None;
    for result in shared {
        match result {
            Err(e) if e.is_connectivity() => {
                first.get_or_insert_with(|| e.clone());
            }
            _ => return None,
        }
    }
    first
}

/// Fan out every extract spec on its own scoped thread and join them all.
fn run_extract_tasks(
    table: &[FieldSpec],
    ctx: &FieldContext<'_>,
) -> Vec<(&'static str, Result<String, FieldError>)> {
    std::thread::scope(|s| {
        let handles: Vec<_> = table
            .iter()
            .filter(|spec| !spec.is_derived())
            .map(|spec| {
                let task = FieldTask::new(*spec);
                (task.name(), s.spawn(move || task.run(ctx)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| (name, Err(FieldError::Panicked)))
            })
            .collect()
    })
}
