//! Source adapter contract and the tagged result it produces.
//!
//! Every provider adapter implements [`SeriesSource`]. A fetch either yields a
//! normalized [`TimeSeries`] tagged with the provider that produced it, or a
//! [`SourceFailure`] carrying one of a closed set of reasons. Failures are
//! values: the orchestrator accumulates them, it never propagates them.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{CanonicalSymbol, DateRange, ProviderId, TimeSeries, Unit};

/// Why a source could not produce a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoData,
    RateLimited,
    NetworkError,
    ParseError,
    Unauthorized,
    /// The caller's request budget expired while this source was in flight.
    Cancelled,
}

impl FailureReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
            Self::Unauthorized => "unauthorized",
            Self::Cancelled => "cancelled",
        }
    }

    /// Stable machine-readable code used in output envelopes.
    pub const fn code(self) -> &'static str {
        match self {
            Self::NoData => "source.no_data",
            Self::RateLimited => "source.rate_limited",
            Self::NetworkError => "source.network_error",
            Self::ParseError => "source.parse_error",
            Self::Unauthorized => "source.unauthorized",
            Self::Cancelled => "source.cancelled",
        }
    }

    /// Transient reasons are worth another attempt against the same symbol.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkError)
    }
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed fetch with its classified reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl SourceFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(FailureReason::NoData, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureReason::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureReason::NetworkError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureReason::ParseError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Unauthorized, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Cancelled, message)
    }
}

impl Display for SourceFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.reason.code())
    }
}

impl std::error::Error for SourceFailure {}

/// Successful fetch: the series and the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSuccess {
    pub series: TimeSeries,
    pub source: ProviderId,
}

pub type SourceResult = Result<SourceSuccess, SourceFailure>;

/// One adapter invocation: ordered provider-side candidates for a canonical symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub canonical: CanonicalSymbol,
    pub candidates: Vec<String>,
    pub range: DateRange,
    pub unit: Unit,
}

impl FetchRequest {
    pub fn new(canonical: CanonicalSymbol, candidates: Vec<String>, range: DateRange) -> Self {
        Self {
            canonical,
            candidates,
            range,
            unit: Unit::Other,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }
}

/// Source adapter contract.
///
/// Implementations own request construction, authentication, retries and
/// parsing for one provider. Callers only see the [`SourceResult`].
pub trait SeriesSource: Send + Sync {
    /// Returns the provider identifier.
    fn id(&self) -> ProviderId;

    /// Fetches the first candidate that yields a usable series.
    fn fetch<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>>;
}
