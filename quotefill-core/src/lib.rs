//! Quotefill Core: symbols, fetch layer, field catalogue, aggregation, row sinks.
//!
//! This crate contains the per-symbol half of the ingestion pipeline:
//! - Domain types (symbols, instrument kinds, total records)
//! - Retrying fetch primitive over a pluggable transport
//! - Static field tables per instrument kind with regex extractors
//! - Attribute aggregation with concurrent, failure-isolated field tasks
//! - Row sinks: in-memory and directory-of-CSV workbooks

pub mod aggregate;
pub mod domain;
pub mod fetch;
pub mod fields;
pub mod sink;

pub use aggregate::{Aggregate, Aggregated, Aggregator, Classifier, RecordStatus, YahooSearchClassifier};
pub use domain::{InstrumentKind, Record, Symbol, SymbolEntry, SymbolError, BLANK};
pub use fetch::{
    Document, Endpoints, FetchError, Format, HttpTransport, RetryPolicy, RetryingFetcher, Transport,
};
pub use fields::{AggregationMode, FieldError, FieldSpec, FieldTask};
pub use sink::{CsvWorkbook, CsvWorkbookOpener, MemoryWorkbook, RowLayout, RowSink, SinkError, SinkOpener};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across pool threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Symbol>();
        require_sync::<Symbol>();
        require_send::<Record>();
        require_sync::<Record>();
        require_send::<Aggregated>();
        require_sync::<Aggregated>();
        require_send::<FetchError>();
        require_sync::<FetchError>();
        require_send::<RetryingFetcher>();
        require_sync::<RetryingFetcher>();
        require_send::<Aggregator>();
        require_sync::<Aggregator>();
        require_send::<FieldSpec>();
        require_sync::<FieldSpec>();
        require_send::<MemoryWorkbook>();
        require_send::<CsvWorkbook>();
    }
}
