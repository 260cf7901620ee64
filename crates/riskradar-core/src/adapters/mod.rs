//! Provider adapters.
//!
//! Each provider contributes a [`ProviderProtocol`]: how to build the request
//! for one provider-side symbol and how to read the response. The generic
//! [`SourceAdapter`] drives a protocol through the candidate list under a
//! [`RetryPolicy`] and hands the rows to the normalizer.

mod alphavantage;
mod fred;
mod fredgraph;
mod twelvedata;
mod yahoo;

pub use alphavantage::AlphaVantageProtocol;
pub use fred::FredProtocol;
pub use fredgraph::FredGraphProtocol;
pub use twelvedata::TwelveDataProtocol;
pub use yahoo::YahooProtocol;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::data_source::{FailureReason, FetchRequest, SeriesSource, SourceFailure, SourceResult, SourceSuccess};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::normalize::{normalize, ProviderSchema, RawRecord};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::throttling::ThrottlingQueue;
use crate::{DateRange, ProviderId, TimeSeries};

/// Request construction and response interpretation for one provider.
pub trait ProviderProtocol: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn schema(&self) -> ProviderSchema;

    /// Build the HTTP request for one provider-side symbol.
    fn build_request(&self, symbol: &str, range: &DateRange) -> Result<HttpRequest, SourceFailure>;

    /// Classify the response and extract raw rows.
    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure>;
}

/// Map a non-success HTTP status to a failure reason.
pub fn check_status(provider: ProviderId, response: &HttpResponse) -> Result<(), SourceFailure> {
    if response.is_success() {
        return Ok(());
    }

    let message = format!("{provider} returned status {}", response.status);
    Err(match response.status {
        429 => SourceFailure::rate_limited(message),
        401 | 403 => SourceFailure::unauthorized(message),
        400 | 404 | 410 => SourceFailure::no_data(message),
        _ => SourceFailure::network(message),
    })
}

/// Retrying [`SeriesSource`] over a [`ProviderProtocol`].
pub struct SourceAdapter<P> {
    protocol: P,
    http_client: Arc<dyn HttpClient>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    throttle: Option<ThrottlingQueue>,
}

impl<P: ProviderProtocol> SourceAdapter<P> {
    pub fn new(protocol: P, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            protocol,
            http_client,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            throttle: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottlingQueue) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn fetch_candidates(&self, request: FetchRequest) -> SourceResult {
        let provider = self.protocol.provider();
        let mut last_failure = None;

        for candidate in &request.candidates {
            for attempt in 0..self.retry.max_attempts() {
                match self.attempt(candidate, &request).await {
                    Ok(series) => {
                        info!(
                            provider = provider.as_str(),
                            symbol = %candidate,
                            attempt = attempt + 1,
                            rows = series.len(),
                            "fetch succeeded"
                        );
                        return Ok(SourceSuccess {
                            series,
                            source: provider,
                        });
                    }
                    Err(failure) => {
                        warn!(
                            provider = provider.as_str(),
                            symbol = %candidate,
                            attempt = attempt + 1,
                            reason = failure.reason.as_str(),
                            message = %failure.message,
                            "fetch attempt failed"
                        );

                        if failure.reason == FailureReason::Unauthorized {
                            return Err(failure);
                        }

                        let transient = failure.reason.is_transient();
                        last_failure = Some(failure);
                        if !transient {
                            break;
                        }

                        if attempt + 1 < self.retry.max_attempts() {
                            self.sleeper
                                .sleep(self.retry.delay_for_attempt(attempt))
                                .await;
                        }
                    }
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            SourceFailure::no_data(format!(
                "{provider} has no candidate symbols for '{}'",
                request.canonical
            ))
        }))
    }

    async fn attempt(&self, candidate: &str, request: &FetchRequest) -> Result<TimeSeries, SourceFailure> {
        if let Some(throttle) = &self.throttle {
            if let Err(retry_after) = throttle.acquire() {
                return Err(SourceFailure::rate_limited(format!(
                    "local quota exhausted, next slot in {}ms",
                    retry_after.as_millis()
                )));
            }
        }

        let timeout = self.retry.attempt_timeout();
        let http_request = self
            .protocol
            .build_request(candidate, &request.range)?
            .with_timeout_ms(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        debug!(
            provider = self.protocol.provider().as_str(),
            url = %http_request.redacted_url(),
            "requesting series"
        );

        let response = match tokio::time::timeout(timeout, self.http_client.execute(http_request)).await {
            Err(_) => {
                return Err(SourceFailure::network(format!(
                    "attempt timed out after {}ms",
                    timeout.as_millis()
                )))
            }
            Ok(Err(error)) => return Err(SourceFailure::network(error.message())),
            Ok(Ok(response)) => response,
        };

        let records = self.protocol.interpret(&response)?;
        let series = normalize(&request.canonical, request.unit, records, &self.protocol.schema())?
            .within(&request.range);

        if series.present_count() == 0 {
            return Err(SourceFailure::no_data(format!(
                "no observations for '{candidate}' in {}",
                request.range
            )));
        }

        Ok(series)
    }
}

impl<P: ProviderProtocol> SeriesSource for SourceAdapter<P> {
    fn id(&self) -> ProviderId {
        self.protocol.provider()
    }

    fn fetch<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>> {
        Box::pin(self.fetch_candidates(request))
    }
}
