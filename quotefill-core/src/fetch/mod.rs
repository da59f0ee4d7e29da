//! Fetch layer: transport seam, retrying fetcher, parsed documents.

pub mod document;
pub mod endpoints;
pub mod fixture;
pub mod retry;
pub mod transport;

pub use document::{Document, Format};
pub use endpoints::Endpoints;
pub use fixture::FixtureTransport;
pub use retry::{AttemptOutcome, FetchError, RetryPolicy, RetryingFetcher};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError, DEFAULT_TIMEOUT};
