//! Classification cache: cached kinds first, remote lookup for the rest.

use std::collections::BTreeMap;

use quotefill_core::{Classifier, InstrumentKind, Symbol, SymbolEntry};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct KindResolution {
    pub entries: Vec<SymbolEntry>,
    /// Exactly the current symbols that have a resolved kind.
    pub cache: BTreeMap<String, InstrumentKind>,
    pub changed: bool,
    pub fetched: usize,
    pub failed: Vec<Symbol>,
}

/// Resolve a kind for every symbol. Cached kinds are reused unless
/// `refresh` is set; failed lookups leave the kind unset and uncached.
/// Codes no longer in the symbol list drop out of the cache.
pub fn resolve_kinds(
    symbols: &[Symbol],
    cached: &BTreeMap<String, InstrumentKind>,
    classifier: &dyn Classifier,
    refresh: bool,
) -> KindResolution {
    let mut cache = BTreeMap::new();
    let mut entries = Vec::with_capacity(symbols.len());
    let mut fetched = 0;
    let mut failed = Vec::new();

    for symbol in symbols {
        let code = symbol.as_str();
        let hit = if refresh { None } else { cached.get(code).copied() };
        let kind = match hit {
            Some(kind) => Some(kind),
            None => match classifier.classify(symbol) {
                Ok(kind) => {
                    fetched += 1;
                    info!(symbol = %symbol, kind = %kind, "kind fetched");
                    Some(kind)
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "kind lookup failed");
                    failed.push(symbol.clone());
                    None
                }
            },
        };
        if let Some(kind) = kind {
            cache.insert(code.to_string(), kind);
        }
        entries.push(SymbolEntry::new(symbol.clone(), kind));
    }

    let changed = cache != *cached;
    KindResolution {
        entries,
        cache,
        changed,
        fetched,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotefill_core::FetchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl Classifier for Counting {
        fn classify(&self, symbol: &Symbol) -> Result<InstrumentKind, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match symbol.as_str() {
                "9999" => Err(FetchError::Unreachable {
                    url: "http://search".into(),
                    reason: "refused".into(),
                }),
                code if code.starts_with("00") => Ok(InstrumentKind::Fund),
                _ => Ok(InstrumentKind::Equity),
            }
        }
    }

    fn symbols(codes: &[&str]) -> Vec<Symbol> {
        codes.iter().map(|c| Symbol::parse(c).unwrap()).collect()
    }

    #[test]
    fn cache_hits_skip_the_lookup() {
        let classifier = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut cached = BTreeMap::new();
        cached.insert("2317".to_string(), InstrumentKind::Equity);

        let r = resolve_kinds(&symbols(&["2317", "50"]), &cached, &classifier, false);

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.fetched, 1);
        assert_eq!(r.entries[1].kind, Some(InstrumentKind::Fund));
        assert!(r.changed);
    }

    #[test]
    fn stale_codes_drop_out_and_failures_stay_unset() {
        let classifier = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut cached = BTreeMap::new();
        cached.insert("2330".to_string(), InstrumentKind::Equity);

        let r = resolve_kinds(&symbols(&["9999"]), &cached, &classifier, false);

        assert!(r.cache.is_empty());
        assert_eq!(r.entries[0].kind, None);
        assert_eq!(r.failed.len(), 1);
        assert!(r.changed);
    }

    #[test]
    fn unchanged_cache_is_not_flagged() {
        let classifier = Counting {
            calls: AtomicUsize::new(0),
        };
        let mut cached = BTreeMap::new();
        cached.insert("2317".to_string(), InstrumentKind::Equity);

        let r = resolve_kinds(&symbols(&["2317"]), &cached, &classifier, false);
        assert!(!r.changed);

        let refreshed = resolve_kinds(&symbols(&["2317"]), &cached, &classifier, true);
        assert!(!refreshed.changed);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }
}
