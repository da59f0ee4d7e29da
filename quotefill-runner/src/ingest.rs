//! One ingestion pass: a mode, the symbol list and an open sink.

use std::sync::Arc;

use quotefill_core::{
    Aggregate, AggregationMode, Aggregator, Classifier, Endpoints, FetchError, RetryingFetcher,
    RowSink, SinkError, Symbol, SymbolEntry, Transport,
};
use thiserror::Error;
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::pool::{BatchReport, PoolError, WorkerPool};

/// Why a whole pass failed. Individual symbols never fail a pass on their
/// own; these are the systemic cases.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PassError {
    #[error("all {total} symbols unreachable: {cause}")]
    Connectivity { total: usize, cause: FetchError },

    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),

    #[error("aggregation of {symbol} panicked")]
    Worker { symbol: Symbol },

    #[error("{0}")]
    Other(String),
}

impl PassError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// The symbol being processed when the pass failed, if one is known.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Worker { symbol } => Some(symbol),
            _ => None,
        }
    }
}

/// Runs one pass over all symbols. The seam between the session state
/// machine and the worker pool.
pub trait PassRunner {
    fn run_pass(
        &self,
        mode: AggregationMode,
        symbols: &[SymbolEntry],
        sink: &mut dyn RowSink,
    ) -> Result<BatchReport, PassError>;
}

/// Production pass runner: the worker pool over the full and quote-only
/// aggregators. Symbol `i` always lands on row `first_row + i`.
pub struct Ingestor {
    pool: WorkerPool,
    full: Arc<dyn Aggregate>,
    quote: Arc<dyn Aggregate>,
    first_row: usize,
    cancel: Option<CancelToken>,
}

impl Ingestor {
    pub fn new(
        pool: WorkerPool,
        full: Arc<dyn Aggregate>,
        quote: Arc<dyn Aggregate>,
        first_row: usize,
    ) -> Self {
        Self {
            pool,
            full,
            quote,
            first_row,
            cancel: None,
        }
    }

    /// Wire aggregators over `transport` using the session's retry policy
    /// and concurrency bound.
    pub fn from_config(
        config: &SessionConfig,
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Result<Self, PoolError> {
        let fetcher = RetryingFetcher::new(transport, config.retry);
        let full = Aggregator::full(fetcher.clone(), endpoints.clone(), classifier);
        let quote = Aggregator::quote_only(fetcher, endpoints);
        Ok(Self::new(
            WorkerPool::new(config.concurrency)?,
            Arc::new(full),
            Arc::new(quote),
            config.first_data_row,
        ))
    }

    /// Quote-only passes stop starting new symbols once `token` is raised.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn first_row(&self) -> usize {
        self.first_row
    }
}

impl PassRunner for Ingestor {
    fn run_pass(
        &self,
        mode: AggregationMode,
        symbols: &[SymbolEntry],
        sink: &mut dyn RowSink,
    ) -> Result<BatchReport, PassError> {
        let aggregator = match mode {
            AggregationMode::Full => self.full.as_ref(),
            AggregationMode::QuoteOnly => self.quote.as_ref(),
        };
        let cancel = match mode {
            AggregationMode::QuoteOnly => self.cancel.as_ref().map(CancelToken::flag),
            AggregationMode::Full => None,
        };
        let first_row = self.first_row;

        let report = self.pool.run(aggregator, symbols, &|i| first_row + i, sink, cancel)?;

        if let Some(symbol) = report.panicked.first() {
            return Err(PassError::Worker {
                symbol: symbol.clone(),
            });
        }
        if let Some(cause) = report.connectivity_outage() {
            return Err(PassError::Connectivity {
                total: report.total,
                cause: cause.clone(),
            });
        }
        if report.written == 0 {
            if let Some(failure) = report.sink_failures.first() {
                return Err(PassError::Sink(failure.error.clone()));
            }
        }

        info!(
            mode = %mode,
            total = report.total,
            written = report.written,
            degraded = report.degraded.len(),
            "pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_outages_count_as_connectivity() {
        let outage = PassError::Connectivity {
            total: 2,
            cause: FetchError::Unreachable {
                url: "http://x".into(),
                reason: "refused".into(),
            },
        };
        assert!(outage.is_connectivity());
        assert!(!PassError::Sink(SinkError::Closed).is_connectivity());
        assert!(!PassError::Other("boom".into()).is_connectivity());
    }

    #[test]
    fn worker_failures_name_their_symbol() {
        let symbol = Symbol::parse("2317").unwrap();
        let err = PassError::Worker {
            symbol: symbol.clone(),
        };
        assert_eq!(err.symbol(), Some(&symbol));
        assert_eq!(err.to_string(), "aggregation of 2317 panicked");
    }
}
