//! Source adapters for JobCompass.
//!
//! Every adapter turns one external job board or API into
//! [`CanonicalRecord`](jobcompass_shared::CanonicalRecord)s. Adapters own
//! their rate limiter and retry policy ([`throttle`]), share the HTTP
//! client wrapper ([`http`]) and the normalization helpers ([`normalize`]).

pub mod adapters;
pub mod http;
pub mod normalize;
pub mod throttle;

pub use adapters::{
    AdzunaAdapter, Harvest, JSearchAdapter, JobBankAdapter, RemoteOkAdapter, RssAdapter, RssFeed,
    SearchQuery, SourceAdapter, build_adapters,
};
pub use http::HttpClient;
pub use throttle::{CallState, RateLimiter, RetryPolicy, Throttle};
