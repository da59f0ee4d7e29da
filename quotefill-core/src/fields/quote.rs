//! Realtime quote fields, read from the TWSE realtime JSON document.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::extract::parse_number;
use super::names::*;
use super::{FieldContext, FieldError, FieldSpec, Page};
use crate::domain::Record;

fn with_entry<T>(
    ctx: &FieldContext<'_>,
    f: impl FnOnce(&Map<String, Value>) -> Result<T, FieldError>,
) -> Result<T, FieldError> {
    let doc = ctx.document(Page::Realtime)?;
    let json = doc
        .json()
        .ok_or_else(|| FieldError::missing("realtime document is not JSON"))?;
    let entries = json
        .get("msgArray")
        .and_then(Value::as_array)
        .ok_or_else(|| FieldError::missing("msgArray"))?;
    let code = ctx.symbol.as_str();
    let entry = entries
        .iter()
        .filter_map(Value::as_object)
        .find(|e| e.get("c").and_then(Value::as_str) == Some(code))
        .ok_or_else(|| FieldError::missing(format!("msgArray entry for {code}")))?;
    f(entry)
}

fn key(ctx: &FieldContext<'_>, name: &str) -> Result<String, FieldError> {
    with_entry(ctx, |entry| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FieldError::missing(format!("realtime key '{name}'")))
    })
}

/// Order-book keys hold `_`-separated levels; the first is the best.
fn best_level(ctx: &FieldContext<'_>, name: &str) -> Result<String, FieldError> {
    let levels = key(ctx, name)?;
    Ok(levels.split('_').next().unwrap_or_default().to_string())
}

fn date(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    let raw = key(ctx, "d")?;
    let day = NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").map_err(|_| FieldError::Coercion {
        value: raw.clone(),
        expected: "YYYYMMDD date",
    })?;
    Ok(day.format("%Y-%m-%d").to_string())
}

fn name(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "n")
}

fn best_bid(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    best_level(ctx, "b")
}

fn best_ask(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    best_level(ctx, "a")
}

fn latest_price(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "z")
}

fn trade_volume(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "tv")
}

fn best_bid_volume(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    best_level(ctx, "g")
}

fn best_ask_volume(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    best_level(ctx, "f")
}

fn accumulated_volume(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "v")
}

fn high(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "h")
}

fn low(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "l")
}

fn open(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "o")
}

fn prior_close(ctx: &FieldContext<'_>) -> Result<String, FieldError> {
    key(ctx, "y")
}

fn round2(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    // no "-0.00"
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// Percentage change rounded to two decimals; `None` for a zero or
/// non-finite denominator.
pub fn pct_change(latest: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 || !prior.is_finite() || !latest.is_finite() {
        return None;
    }
    let pct = (latest - prior) / prior * 100.0;
    pct.is_finite().then(|| round2(pct))
}

fn inputs(record: &Record) -> Option<(f64, f64)> {
    let latest = parse_number(record.value(LATEST_PRICE)?)?;
    let prior = parse_number(record.value(PRIOR_CLOSE)?)?;
    Some((latest, prior))
}

pub fn change(record: &Record) -> Option<String> {
    let (latest, prior) = inputs(record)?;
    Some(format!("{:.2}", round2(latest - prior)))
}

pub fn change_pct(record: &Record) -> Option<String> {
    let (latest, prior) = inputs(record)?;
    pct_change(latest, prior).map(|p| format!("{p:.2}"))
}

pub const QUOTE_FIELDS: &[FieldSpec] = &[
    FieldSpec::extract(DATE, date),
    FieldSpec::extract(NAME, name),
    FieldSpec::extract(BEST_BID, best_bid),
    FieldSpec::extract(BEST_ASK, best_ask),
    FieldSpec::extract_or_keep(LATEST_PRICE, latest_price),
    FieldSpec::derived(CHANGE, change),
    FieldSpec::derived(CHANGE_PCT, change_pct),
    FieldSpec::extract_or_keep(TRADE_VOLUME, trade_volume),
    FieldSpec::extract(BEST_BID_VOLUME, best_bid_volume),
    FieldSpec::extract(BEST_ASK_VOLUME, best_ask_volume),
    FieldSpec::extract(ACCUMULATED_VOLUME, accumulated_volume),
    FieldSpec::extract(HIGH, high),
    FieldSpec::extract(LOW, low),
    FieldSpec::extract(OPEN, open),
    FieldSpec::extract(PRIOR_CLOSE, prior_close),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentKind, Symbol};
    use crate::fetch::{Document, FetchError};
    use crate::fields::PageSource;
    use std::sync::Arc;

    struct Realtime(Arc<Document>);

    impl PageSource for Realtime {
        fn page(&self, _page: Page) -> Result<Arc<Document>, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn realtime(body: &str) -> Realtime {
        Realtime(Arc::new(
            Document::parse("rt", crate::fetch::Format::Json, body.as_bytes().to_vec()).unwrap(),
        ))
    }

    const BODY: &str = r#"{"msgArray":[
        {"c":"0050","n":"元大台灣50","d":"20240618","z":"182.35","y":"180.00",
         "b":"182.30_182.25_","a":"182.35_182.40_","g":"12_30_","f":"8_4_",
         "tv":"15","v":"20311","h":"182.90","l":"180.60","o":"181.00"}]}"#;

    fn ctx_run(f: fn(&FieldContext<'_>) -> Result<String, FieldError>, code: &str) -> Result<String, FieldError> {
        let src = realtime(BODY);
        let sym = Symbol::parse(code).unwrap();
        f(&FieldContext::new(&sym, InstrumentKind::Fund, &src))
    }

    #[test]
    fn reads_keys_of_matching_entry() {
        assert_eq!(ctx_run(name, "50").unwrap(), "元大台灣50");
        assert_eq!(ctx_run(latest_price, "0050").unwrap(), "182.35");
        assert_eq!(ctx_run(best_bid, "0050").unwrap(), "182.30");
        assert_eq!(ctx_run(best_ask_volume, "0050").unwrap(), "8");
    }

    #[test]
    fn date_is_reformatted() {
        assert_eq!(ctx_run(date, "0050").unwrap(), "2024-06-18");
    }

    #[test]
    fn other_symbol_is_missing() {
        assert!(matches!(ctx_run(name, "2317"), Err(FieldError::MissingMarkup(_))));
    }

    fn record(latest: &str, prior: &str) -> Record {
        let mut r = Record::blank(
            Symbol::parse("2317").unwrap(),
            InstrumentKind::Equity,
            [LATEST_PRICE, PRIOR_CLOSE, CHANGE, CHANGE_PCT],
        );
        r.set(LATEST_PRICE, latest);
        r.set(PRIOR_CLOSE, prior);
        r
    }

    #[test]
    fn derived_change_fields() {
        let r = record("182.35", "180.00");
        assert_eq!(change(&r).as_deref(), Some("2.35"));
        assert_eq!(change_pct(&r).as_deref(), Some("1.31"));
    }

    #[test]
    fn derived_fields_blank_on_missing_or_zero_inputs() {
        assert_eq!(change_pct(&record("-", "180")), None);
        assert_eq!(change_pct(&record("10", "")), None);
        assert_eq!(change_pct(&record("10", "0")), None);
        assert_eq!(change(&record("10", "0")).as_deref(), Some("10.00"));
    }

    #[test]
    fn unchanged_price_is_zero_not_negative_zero() {
        assert_eq!(change_pct(&record("100", "100")).as_deref(), Some("0.00"));
    }
}
