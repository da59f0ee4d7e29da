use serde::{Deserialize, Serialize};

/// Base URLs of every remote source. Overridable from the app config so
/// tests and mirrors can point elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Yahoo TW quote pages; `/{code}`, `/{code}/profile`, `/{code}/cash-flow-statement`.
    pub yahoo_quote: String,
    /// HiStock ratio pages; `/{code}/{page}`.
    pub histock: String,
    /// TWSE realtime quote JSON.
    pub twse_realtime: String,
    /// Yahoo finance search JSON, used for instrument classification.
    pub yahoo_search: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            yahoo_quote: "https://tw.stock.yahoo.com/quote".into(),
            histock: "https://histock.tw/stock".into(),
            twse_realtime: "https://mis.twse.com.tw/stock/api/getStockInfo.jsp".into(),
            yahoo_search: "https://query2.finance.yahoo.com/v1/finance/search".into(),
        }
    }
}

impl Endpoints {
    /// Every endpoint rooted at `base`, e.g. a local fixture host.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            yahoo_quote: format!("{base}/quote"),
            histock: format!("{base}/histock"),
            twse_realtime: format!("{base}/realtime"),
            yahoo_search: format!("{base}/search"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let e: Endpoints = from_json(r#"{"histock":"http://mirror/h"}"#);
        assert_eq!(e.histock, "http://mirror/h");
        assert_eq!(e.yahoo_quote, Endpoints::default().yahoo_quote);
    }

    fn from_json(json: &str) -> Endpoints {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn rooted_at_strips_trailing_slash() {
        let e = Endpoints::rooted_at("http://fx/");
        assert_eq!(e.twse_realtime, "http://fx/realtime");
    }
}
