use serde_json::Value;
use tracing::debug;

use crate::domain::{InstrumentKind, Symbol};
use crate::fetch::{Endpoints, FetchError, Format, RetryingFetcher};

/// Remote instrument classification, consulted when no kind was supplied.
pub trait Classifier: Send + Sync {
    fn classify(&self, symbol: &Symbol) -> Result<InstrumentKind, FetchError>;
}

/// Classifies through the Yahoo finance search API.
///
/// The first quote whose display type is `ETF` decides: fund if its quote
/// type is also `ETF`. No such quote means equity.
#[derive(Clone)]
pub struct YahooSearchClassifier {
    fetcher: RetryingFetcher,
    endpoints: Endpoints,
}

impl YahooSearchClassifier {
    pub fn new(fetcher: RetryingFetcher, endpoints: Endpoints) -> Self {
        Self { fetcher, endpoints }
    }

    fn url(&self, symbol: &Symbol) -> String {
        format!("{}?q={}.tw", self.endpoints.yahoo_search, symbol.as_str())
    }
}

impl Classifier for YahooSearchClassifier {
    fn classify(&self, symbol: &Symbol) -> Result<InstrumentKind, FetchError> {
        let url = self.url(symbol);
        let doc = self.fetcher.fetch(&url, Format::Json)?;
        let kind = doc.json().map_or(InstrumentKind::Equity, kind_from_search);
        debug!(symbol = %symbol, kind = %kind, "classified");
        Ok(kind)
    }
}

fn kind_from_search(json: &Value) -> InstrumentKind {
    let quotes = json.get("quotes").and_then(Value::as_array);
    let etf_quote = quotes.into_iter().flatten().find(|q| {
        q.get("typeDisp")
            .and_then(Value::as_str)
            .and_then(|t| t.split('.').next())
            == Some("ETF")
    });
    match etf_quote {
        Some(q) if q.get("quoteType").and_then(Value::as_str) == Some("ETF") => InstrumentKind::Fund,
        _ => InstrumentKind::Equity,
    }
}
