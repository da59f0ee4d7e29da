//! Field descriptors and the per-field unit of work.
//!
//! A [`FieldSpec`] is a static descriptor: a record key plus either an
//! extraction function over fetched pages or a derivation over the merged
//! record. Which specs apply to a symbol is decided by table membership
//! ([`field_table`]), never by inspecting the symbol at runtime.

pub mod catalogue;
pub mod extract;
pub mod names;
pub mod page;
pub mod quote;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::{InstrumentKind, Record, Symbol};
use crate::fetch::{Document, FetchError};

pub use page::{HiStockPage, Page};

pub type ExtractFn = fn(&FieldContext<'_>) -> Result<String, FieldError>;
pub type DeriveFn = fn(&Record) -> Option<String>;

#[derive(Clone, Copy)]
pub enum Compute {
    /// Fetch-backed: runs concurrently with the other extract tasks.
    Extract(ExtractFn),
    /// Computed from the merged record once every extract task is done.
    Derived(DeriveFn),
}

#[derive(Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub compute: Compute,
    /// A blank result leaves the stored cell as it was.
    pub keep_previous: bool,
}

impl FieldSpec {
    pub const fn extract(name: &'static str, f: ExtractFn) -> Self {
        Self {
            name,
            compute: Compute::Extract(f),
            keep_previous: false,
        }
    }

    /// Like [`FieldSpec::extract`], but a blank value does not overwrite
    /// what an earlier pass stored.
    pub const fn extract_or_keep(name: &'static str, f: ExtractFn) -> Self {
        Self {
            name,
            compute: Compute::Extract(f),
            keep_previous: true,
        }
    }

    pub const fn derived(name: &'static str, f: DeriveFn) -> Self {
        Self {
            name,
            compute: Compute::Derived(f),
            keep_previous: false,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.compute, Compute::Derived(_))
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_derived() { "derived" } else { "extract" };
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("compute", &kind)
            .field("keep_previous", &self.keep_previous)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("expected markup not found: {0}")]
    MissingMarkup(String),

    #[error("cannot read '{value}' as {expected}")]
    Coercion {
        value: String,
        expected: &'static str,
    },

    #[error("field task panicked")]
    Panicked,
}

impl FieldError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingMarkup(what.into())
    }
}

/// Where field tasks obtain pages. Implementations memoize so that a page
/// shared by several fields is fetched once per aggregation.
pub trait PageSource: Sync {
    fn page(&self, page: Page) -> Result<Arc<Document>, FetchError>;
}

/// Read-only view handed to every extract task of one symbol.
pub struct FieldContext<'a> {
    pub symbol: &'a Symbol,
    pub kind: InstrumentKind,
    pub pages: &'a dyn PageSource,
}

impl<'a> FieldContext<'a> {
    pub fn new(symbol: &'a Symbol, kind: InstrumentKind, pages: &'a dyn PageSource) -> Self {
        Self {
            symbol,
            kind,
            pages,
        }
    }

    pub fn document(&self, page: Page) -> Result<Arc<Document>, FieldError> {
        Ok(self.pages.page(page)?)
    }
}

/// One attribute for one symbol. Never panics across the aggregation
/// boundary on its own account; every failure comes back as a `FieldError`.
#[derive(Debug, Clone, Copy)]
pub struct FieldTask {
    spec: FieldSpec,
}

impl FieldTask {
    pub fn new(spec: FieldSpec) -> Self {
        Self { spec }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Run an extract spec. Derived specs have nothing to fetch and report
    /// an empty value; they are resolved after the merge.
    pub fn run(&self, ctx: &FieldContext<'_>) -> (&'static str, Result<String, FieldError>) {
        let result = match self.spec.compute {
            Compute::Extract(f) => f(ctx),
            Compute::Derived(_) => Ok(String::new()),
        };
        (self.spec.name, result)
    }
}

/// Which family of passes an aggregation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMode {
    /// Every attribute applicable to the instrument kind.
    Full,
    /// Realtime quote fields only, used while the market is open.
    QuoteOnly,
}

impl AggregationMode {
    /// Documents resolved before fan-out.
    pub fn shared_pages(&self) -> &'static [Page] {
        match self {
            Self::Full => &[Page::Quote, Page::Profile],
            Self::QuoteOnly => &[Page::Realtime],
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::QuoteOnly => "quote-only",
        })
    }
}

/// Recompute every derived field of `record` from its current values.
/// Derivations that cannot be computed leave the field untouched.
pub fn rederive(record: &mut Record) {
    let tables = [
        quote::QUOTE_FIELDS,
        catalogue::EQUITY_FIELDS,
        catalogue::FUND_FIELDS,
        catalogue::COMMON_FIELDS,
    ];
    for spec in tables.iter().flat_map(|t| t.iter()) {
        if let Compute::Derived(derive) = spec.compute {
            if record.contains(spec.name) {
                if let Some(value) = derive(record) {
                    record.set(spec.name, value);
                }
            }
        }
    }
}

/// The static spec table for a mode and kind.
pub fn field_table(mode: AggregationMode, kind: InstrumentKind) -> &'static [FieldSpec] {
    match (mode, kind) {
        (AggregationMode::QuoteOnly, _) => quote::QUOTE_FIELDS,
        (AggregationMode::Full, InstrumentKind::Equity) => catalogue::EQUITY_FIELDS,
        (AggregationMode::Full, InstrumentKind::Fund) => catalogue::FUND_FIELDS,
        (AggregationMode::Full, InstrumentKind::Unknown) => catalogue::COMMON_FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(table: &[FieldSpec]) -> HashSet<&'static str> {
        table.iter().map(|s| s.name).collect()
    }

    #[test]
    fn tables_have_unique_names() {
        for table in [
            catalogue::EQUITY_FIELDS,
            catalogue::FUND_FIELDS,
            catalogue::COMMON_FIELDS,
            quote::QUOTE_FIELDS,
        ] {
            assert_eq!(names(table).len(), table.len());
        }
    }

    #[test]
    fn management_fee_is_fund_only() {
        let fund = field_table(AggregationMode::Full, InstrumentKind::Fund);
        let equity = field_table(AggregationMode::Full, InstrumentKind::Equity);
        assert!(names(fund).contains(names::MANAGEMENT_FEE));
        assert!(!names(equity).contains(names::MANAGEMENT_FEE));
    }

    #[test]
    fn unknown_kind_gets_fields_common_to_both() {
        let fund = names(catalogue::FUND_FIELDS);
        let equity = names(catalogue::EQUITY_FIELDS);
        let common = names(field_table(AggregationMode::Full, InstrumentKind::Unknown));
        assert!(common.is_subset(&fund));
        assert!(common.is_subset(&equity));
        assert!(common.contains(names::PRIOR_CLOSE));
    }

    #[test]
    fn quote_mode_ignores_kind() {
        for kind in [InstrumentKind::Equity, InstrumentKind::Fund, InstrumentKind::Unknown] {
            assert_eq!(field_table(AggregationMode::QuoteOnly, kind).len(), 15);
        }
    }

    #[test]
    fn only_traded_price_and_volume_keep_previous() {
        let kept: HashSet<_> = quote::QUOTE_FIELDS
            .iter()
            .filter(|s| s.keep_previous)
            .map(|s| s.name)
            .collect();
        assert_eq!(kept, HashSet::from([names::LATEST_PRICE, names::TRADE_VOLUME]));
    }

    #[test]
    fn rederive_recomputes_change_from_current_values() {
        let mut record = Record::blank(
            Symbol::parse("2317").unwrap(),
            InstrumentKind::Unknown,
            names(quote::QUOTE_FIELDS),
        );
        record.set(names::LATEST_PRICE, "101");
        record.set(names::PRIOR_CLOSE, "100");
        rederive(&mut record);
        assert_eq!(record.value(names::CHANGE), Some("1.00"));
        assert_eq!(record.value(names::CHANGE_PCT), Some("1.00"));
    }
}
