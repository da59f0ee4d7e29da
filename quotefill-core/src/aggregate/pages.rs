use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::domain::Symbol;
use crate::fetch::{Document, Endpoints, FetchError, RetryingFetcher};
use crate::fields::{Page, PageSource};

type Slot = Arc<OnceLock<Result<Arc<Document>, FetchError>>>;

/// Per-aggregation memo of fetched pages.
///
/// Concurrent requests for the same page block on one fetch instead of
/// issuing their own; failures are memoized too, so a dead page costs one
/// retry cycle per aggregation.
pub struct PageCache<'a> {
    fetcher: &'a RetryingFetcher,
    endpoints: &'a Endpoints,
    symbol: &'a Symbol,
    slots: Mutex<HashMap<Page, Slot>>,
}

impl<'a> PageCache<'a> {
    pub fn new(fetcher: &'a RetryingFetcher, endpoints: &'a Endpoints, symbol: &'a Symbol) -> Self {
        Self {
            fetcher,
            endpoints,
            symbol,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Pages requested so far.
    pub fn requested(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl PageSource for PageCache<'_> {
    fn page(&self, page: Page) -> Result<Arc<Document>, FetchError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(page).or_default().clone()
        };
        slot.get_or_init(|| {
            let url = page.url(self.endpoints, self.symbol);
            self.fetcher.fetch(&url, page.format()).map(Arc::new)
        })
        .clone()
    }
}
