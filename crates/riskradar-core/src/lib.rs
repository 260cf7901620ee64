//! # Riskradar Core
//!
//! Acquisition layer for the riskradar toolkit: turns a canonical instrument
//! identifier and a date range into a normalized [`TimeSeries`], falling back
//! across providers when one is down, rate limited or returns junk.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Canonical symbols, dates, observations and series |
//! | [`source`] | Provider identifiers |
//! | [`symbols`] | Canonical → provider symbol translation |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Retry policy and sleeper |
//! | [`data_source`] | Adapter contract and tagged source result |
//! | [`normalize`] | Raw rows → canonical series |
//! | [`adapters`] | FRED, FRED graph, Yahoo, Alpha Vantage, Twelve Data |
//! | [`routing`] | Fallback orchestrator |
//! | [`cache`] | TTL cache decorator |
//! | [`envelope`] | Response envelope with metadata |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────────┐
//! │ CachedResolver   │────▶│ FallbackOrchestr. │──── SymbolTranslator
//! └──────────────────┘     └─────────┬─────────┘
//!                                    │ sequential, priority order
//!                                    ▼
//!                          ┌───────────────────┐     ┌──────────────┐
//!                          │ SourceAdapter<P>  │────▶│ HttpClient   │
//!                          │ (RetryPolicy)     │     └──────────────┘
//!                          └─────────┬─────────┘
//!                                    ▼
//!                          ┌───────────────────┐
//!                          │ normalize         │──▶ TimeSeries
//!                          └───────────────────┘
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only
//! - Logged URLs have key parameters masked

pub mod adapters;
pub mod cache;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod normalize;
pub mod provider_policy;
pub mod retry;
pub mod routing;
pub mod source;
pub mod symbols;
pub mod throttling;

pub use adapters::{
    AlphaVantageProtocol, FredGraphProtocol, FredProtocol, ProviderProtocol, SourceAdapter,
    TwelveDataProtocol, YahooProtocol,
};
pub use cache::{CachedResolver, DEFAULT_CACHE_TTL};
pub use data_source::{
    FailureReason, FetchRequest, SeriesSource, SourceFailure, SourceResult, SourceSuccess,
};
pub use domain::{
    format_date, parse_date, CanonicalSymbol, DateRange, GapPolicy, LookbackPeriod, Observation,
    TimeSeries, Unit,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use error::ValidationError;
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use normalize::{normalize, DateFormat, ProviderSchema, RawRecord, RawValue};
pub use provider_policy::ProviderPolicy;
pub use retry::{Backoff, RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use routing::{
    AcquisitionError, FallbackOrchestrator, FetchOutcome, OrchestratorBuilder, ProviderFailure,
    SeriesResolver, TotalFailure, DEFAULT_REQUEST_BUDGET,
};
pub use source::ProviderId;
pub use symbols::{NotSupported, SymbolTranslator};
pub use throttling::ThrottlingQueue;
