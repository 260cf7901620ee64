//! Behavior-driven tests for the fallback chain.
//!
//! These tests verify HOW the orchestrator picks a provider, accumulates
//! failures and honors the caller's budget.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use riskradar_core::{
    AcquisitionError, CachedResolver, CanonicalSymbol, DateRange, FailureReason,
    FallbackOrchestrator, FetchRequest, Observation, ProviderId, SeriesResolver, SeriesSource,
    SourceFailure, SourceResult, SourceSuccess, SymbolTranslator, TimeSeries, Unit,
};
use time::macros::date;

// =============================================================================
// Test doubles
// =============================================================================

enum Behavior {
    Succeed(f64),
    Fail(SourceFailure),
    Hang,
}

struct FakeSource {
    id: ProviderId,
    behavior: Behavior,
    calls: Mutex<usize>,
}

impl FakeSource {
    fn new(id: ProviderId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            behavior,
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl SeriesSource for FakeSource {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch<'a>(
        &'a self,
        request: FetchRequest,
    ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>> {
        *self.calls.lock().expect("calls lock") += 1;
        Box::pin(async move {
            match &self.behavior {
                Behavior::Succeed(value) => {
                    let series = TimeSeries::new(
                        request.canonical,
                        request.unit,
                        vec![Observation::present(date!(2024 - 01 - 02), *value)],
                    )
                    .expect("valid series");
                    Ok(SourceSuccess {
                        series,
                        source: self.id,
                    })
                }
                Behavior::Fail(failure) => Err(failure.clone()),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(SourceFailure::network("unreachable"))
                }
            }
        })
    }
}

fn symbol(raw: &str) -> CanonicalSymbol {
    CanonicalSymbol::parse(raw).expect("valid symbol")
}

fn january() -> DateRange {
    DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).expect("valid range")
}

fn orchestrator(sources: Vec<Arc<dyn SeriesSource>>) -> FallbackOrchestrator {
    FallbackOrchestrator::new(SymbolTranslator::builtin(), sources)
}

// =============================================================================
// Priority order
// =============================================================================

#[tokio::test]
async fn when_several_providers_would_succeed_the_first_in_priority_wins() {
    // Given: every provider able to serve EURUSD
    let fred = FakeSource::new(ProviderId::Fred, Behavior::Succeed(1.10));
    let yahoo = FakeSource::new(ProviderId::Yahoo, Behavior::Succeed(1.11));
    let twelvedata = FakeSource::new(ProviderId::TwelveData, Behavior::Succeed(1.12));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![twelvedata.clone(), yahoo.clone(), fred.clone()];
    let orchestrator = orchestrator(sources);

    // When: the symbol is resolved with the default priority
    let outcome = orchestrator
        .resolve(&symbol("EURUSD"), january())
        .await
        .expect("resolves");

    // Then: the primary source answers and nobody later is called
    assert_eq!(outcome.source, ProviderId::Fred);
    assert_eq!(outcome.series.latest().map(|(_, v)| v), Some(1.10));
    assert_eq!(yahoo.calls(), 0);
    assert_eq!(twelvedata.calls(), 0);
}

#[tokio::test]
async fn when_earlier_providers_fail_the_next_one_is_tried_in_order() {
    // Given: FRED rate limited, the CSV variant empty, Yahoo healthy
    let fred = FakeSource::new(
        ProviderId::Fred,
        Behavior::Fail(SourceFailure::rate_limited("429")),
    );
    let graph = FakeSource::new(
        ProviderId::FredGraph,
        Behavior::Fail(SourceFailure::no_data("empty csv")),
    );
    let yahoo = FakeSource::new(ProviderId::Yahoo, Behavior::Succeed(13.5));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![fred, graph, yahoo];
    let orchestrator = orchestrator(sources);

    // When
    let outcome = orchestrator
        .resolve(&symbol("VIX"), january())
        .await
        .expect("resolves");

    // Then: the failure trail is kept in order for diagnostics
    assert_eq!(outcome.source, ProviderId::Yahoo);
    let reasons = outcome
        .failed
        .iter()
        .map(|failure| (failure.provider, failure.reason))
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![
            (ProviderId::Fred, FailureReason::RateLimited),
            (ProviderId::FredGraph, FailureReason::NoData),
        ]
    );
    assert_eq!(outcome.source_chain(), vec![ProviderId::Fred, ProviderId::FredGraph, ProviderId::Yahoo]);
}

#[tokio::test]
async fn when_provider_has_no_mapping_it_is_skipped_without_counting_as_failure() {
    // Given: DXY is only mapped for Yahoo
    let fred = FakeSource::new(ProviderId::Fred, Behavior::Succeed(1.0));
    let yahoo = FakeSource::new(ProviderId::Yahoo, Behavior::Succeed(104.2));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![fred.clone(), yahoo];
    let orchestrator = orchestrator(sources);

    // When
    let outcome = orchestrator
        .resolve(&symbol("DXY"), january())
        .await
        .expect("resolves");

    // Then
    assert_eq!(outcome.source, ProviderId::Yahoo);
    assert!(outcome.failed.is_empty());
    assert!(outcome.skipped.contains(&ProviderId::Fred));
    assert_eq!(fred.calls(), 0);
}

// =============================================================================
// Total failure
// =============================================================================

#[tokio::test]
async fn when_both_configured_providers_have_no_data_total_failure_lists_both() {
    // Given: two providers, both empty
    let fred = FakeSource::new(ProviderId::Fred, Behavior::Fail(SourceFailure::no_data("empty")));
    let yahoo = FakeSource::new(ProviderId::Yahoo, Behavior::Fail(SourceFailure::no_data("empty")));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![fred, yahoo];
    let orchestrator = orchestrator(sources);

    // When
    let error = orchestrator
        .resolve_with_priority(&symbol("VIX"), &[ProviderId::Fred, ProviderId::Yahoo], january())
        .await
        .expect_err("must fail");

    // Then
    let AcquisitionError::TotalFailure(failure) = error else {
        panic!("expected a total failure, got {error:?}");
    };
    assert!(!failure.deadline_exceeded);
    let trail = failure
        .attempts
        .iter()
        .map(|attempt| (attempt.provider, attempt.reason))
        .collect::<Vec<_>>();
    assert_eq!(
        trail,
        vec![
            (ProviderId::Fred, FailureReason::NoData),
            (ProviderId::Yahoo, FailureReason::NoData),
        ]
    );
}

#[tokio::test]
async fn when_budget_expires_partial_trail_is_returned_with_cancelled_entry() {
    // Given: FRED fails fast, the CSV variant hangs, budget 50ms
    let fred = FakeSource::new(ProviderId::Fred, Behavior::Fail(SourceFailure::network("reset")));
    let graph = FakeSource::new(ProviderId::FredGraph, Behavior::Hang);
    let yahoo = FakeSource::new(ProviderId::Yahoo, Behavior::Succeed(13.0));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![fred, graph, yahoo.clone()];
    let orchestrator = orchestrator(sources).with_budget(Duration::from_millis(50));

    // When
    let error = orchestrator
        .resolve(&symbol("VIX"), january())
        .await
        .expect_err("budget must expire");

    // Then: no series is returned and the chain stops
    let AcquisitionError::TotalFailure(failure) = error else {
        panic!("expected a total failure");
    };
    assert!(failure.deadline_exceeded);
    assert_eq!(failure.attempts.len(), 2);
    assert_eq!(failure.attempts[0].reason, FailureReason::NetworkError);
    assert_eq!(failure.attempts[1].provider, ProviderId::FredGraph);
    assert_eq!(failure.attempts[1].reason, FailureReason::Cancelled);
    assert_eq!(yahoo.calls(), 0);
}

// =============================================================================
// Cache decorator
// =============================================================================

#[tokio::test]
async fn when_cached_resolver_wraps_orchestrator_repeat_calls_hit_cache() {
    // Given
    let fred = FakeSource::new(ProviderId::Fred, Behavior::Succeed(4.2));
    let sources: Vec<Arc<dyn SeriesSource>> = vec![fred.clone()];
    let cached = CachedResolver::new(orchestrator(sources));

    // When
    let first = cached.resolve(&symbol("US_10Y"), january()).await.expect("resolves");
    let second = cached.resolve(&symbol("US_10Y"), january()).await.expect("resolves");

    // Then
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.source, ProviderId::Fred);
    assert_eq!(fred.calls(), 1);
    assert_eq!(first.series.unit(), Unit::Percent);
}
