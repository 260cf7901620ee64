//! Fallback orchestration across providers.
//!
//! [`FallbackOrchestrator`] walks an ordered provider list for one canonical
//! symbol and stops at the first success. Providers are tried sequentially so
//! metered quota is never spent on an answer that would be discarded.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{
    AlphaVantageProtocol, FredGraphProtocol, FredProtocol, SourceAdapter, TwelveDataProtocol,
    YahooProtocol,
};
use crate::data_source::{FailureReason, FetchRequest, SeriesSource, SourceFailure, SourceSuccess};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::symbols::SymbolTranslator;
use crate::throttling::ThrottlingQueue;
use crate::{CanonicalSymbol, DateRange, ProviderId, TimeSeries};

/// Caller-level budget for one fallback chain.
pub const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(150);

/// One provider that was tried and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub reason: FailureReason,
    pub message: String,
}

impl ProviderFailure {
    fn new(provider: ProviderId, failure: SourceFailure) -> Self {
        Self {
            provider,
            reason: failure.reason,
            message: failure.message,
        }
    }
}

impl Display for ProviderFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.reason, self.message)
    }
}

/// Result of a successful fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub series: TimeSeries,
    pub source: ProviderId,
    /// Providers tried before `source`, in order.
    pub failed: Vec<ProviderFailure>,
    /// Providers passed over without an attempt (unmapped or unregistered).
    pub skipped: Vec<ProviderId>,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

impl FetchOutcome {
    /// Providers that were actually called, ending with the winner.
    pub fn source_chain(&self) -> Vec<ProviderId> {
        self.failed
            .iter()
            .map(|failure| failure.provider)
            .chain(std::iter::once(self.source))
            .collect()
    }
}

/// Every eligible provider failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalFailure {
    pub symbol: CanonicalSymbol,
    pub attempts: Vec<ProviderFailure>,
    pub skipped: Vec<ProviderId>,
    pub deadline_exceeded: bool,
}

impl Display for TotalFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no registered provider could be tried for '{}'", self.symbol);
        }

        write!(f, "all providers failed for '{}'", self.symbol)?;
        if self.deadline_exceeded {
            f.write_str(" before the request budget expired")?;
        }
        f.write_str(": ")?;
        for (index, attempt) in self.attempts.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{attempt}")?;
        }
        Ok(())
    }
}

/// Acquisition errors that reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("{0}")]
    TotalFailure(TotalFailure),
    #[error("no provider maps symbol '{symbol}'")]
    Unmapped { symbol: CanonicalSymbol },
}

impl AcquisitionError {
    pub fn symbol(&self) -> &CanonicalSymbol {
        match self {
            Self::TotalFailure(failure) => &failure.symbol,
            Self::Unmapped { symbol } => symbol,
        }
    }

    pub fn attempts(&self) -> &[ProviderFailure] {
        match self {
            Self::TotalFailure(failure) => &failure.attempts,
            Self::Unmapped { .. } => &[],
        }
    }
}

/// Anything that can turn a canonical symbol into a series.
pub trait SeriesResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        canonical: &'a CanonicalSymbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<FetchOutcome, AcquisitionError>> + Send + 'a>>;
}

/// Diagnostics collected while a chain runs; survives cancellation.
#[derive(Debug, Default)]
struct Trail {
    failed: Vec<ProviderFailure>,
    skipped: Vec<ProviderId>,
    in_flight: Option<ProviderId>,
}

/// Ordered provider fallback for one canonical symbol at a time.
pub struct FallbackOrchestrator {
    translator: SymbolTranslator,
    sources: HashMap<ProviderId, Arc<dyn SeriesSource>>,
    priority: Vec<ProviderId>,
    budget: Duration,
}

impl FallbackOrchestrator {
    pub fn new(translator: SymbolTranslator, sources: Vec<Arc<dyn SeriesSource>>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.id(), source))
            .collect();
        Self {
            translator,
            sources,
            priority: ProviderId::DEFAULT_PRIORITY.to_vec(),
            budget: DEFAULT_REQUEST_BUDGET,
        }
    }

    pub fn with_priority(mut self, priority: &[ProviderId]) -> Self {
        self.priority = dedupe_chain(priority);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn translator(&self) -> &SymbolTranslator {
        &self.translator
    }

    pub fn priority(&self) -> &[ProviderId] {
        &self.priority
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_registered(&self, provider: ProviderId) -> bool {
        self.sources.contains_key(&provider)
    }

    /// Resolve using the configured priority.
    pub async fn resolve(
        &self,
        canonical: &CanonicalSymbol,
        range: DateRange,
    ) -> Result<FetchOutcome, AcquisitionError> {
        self.resolve_with_priority(canonical, &self.priority, range)
            .await
    }

    /// Resolve using an explicit provider order.
    pub async fn resolve_with_priority(
        &self,
        canonical: &CanonicalSymbol,
        priority: &[ProviderId],
        range: DateRange,
    ) -> Result<FetchOutcome, AcquisitionError> {
        let chain = dedupe_chain(priority);
        if chain
            .iter()
            .all(|provider| self.translator.translate(canonical, *provider).is_err())
        {
            return Err(AcquisitionError::Unmapped {
                symbol: canonical.clone(),
            });
        }

        let started = Instant::now();
        let mut trail = Trail::default();
        let deadline = tokio::time::Instant::now() + self.budget;
        let run = tokio::time::timeout_at(
            deadline,
            self.run_chain(canonical, &chain, range, &mut trail),
        )
        .await;

        match run {
            Ok(Some(success)) => Ok(FetchOutcome {
                series: success.series,
                source: success.source,
                failed: trail.failed,
                skipped: trail.skipped,
                latency_ms: elapsed_ms(started),
                cache_hit: false,
            }),
            Ok(None) => Err(AcquisitionError::TotalFailure(TotalFailure {
                symbol: canonical.clone(),
                attempts: trail.failed,
                skipped: trail.skipped,
                deadline_exceeded: false,
            })),
            Err(_) => {
                let mut attempts = trail.failed;
                if let Some(provider) = trail.in_flight {
                    attempts.push(ProviderFailure::new(
                        provider,
                        SourceFailure::cancelled(format!(
                            "request budget of {}ms expired",
                            self.budget.as_millis()
                        )),
                    ));
                }
                warn!(symbol = %canonical, budget_ms = self.budget.as_millis() as u64, "request budget expired");
                Err(AcquisitionError::TotalFailure(TotalFailure {
                    symbol: canonical.clone(),
                    attempts,
                    skipped: trail.skipped,
                    deadline_exceeded: true,
                }))
            }
        }
    }

    async fn run_chain(
        &self,
        canonical: &CanonicalSymbol,
        chain: &[ProviderId],
        range: DateRange,
        trail: &mut Trail,
    ) -> Option<SourceSuccess> {
        for provider in chain {
            let candidates = match self.translator.translate(canonical, *provider) {
                Ok(candidates) => candidates.to_vec(),
                Err(_) => {
                    debug!(provider = provider.as_str(), symbol = %canonical, "no mapping, skipping");
                    trail.skipped.push(*provider);
                    continue;
                }
            };
            let Some(source) = self.sources.get(provider) else {
                debug!(provider = provider.as_str(), symbol = %canonical, "provider not registered, skipping");
                trail.skipped.push(*provider);
                continue;
            };

            let request = FetchRequest::new(canonical.clone(), candidates, range)
                .with_unit(self.translator.unit_for(canonical));

            trail.in_flight = Some(*provider);
            let result = source.fetch(request).await;
            trail.in_flight = None;

            match result {
                Ok(success) => {
                    info!(
                        symbol = %canonical,
                        source = success.source.as_str(),
                        failed = trail.failed.len(),
                        rows = success.series.len(),
                        "resolved series"
                    );
                    return Some(success);
                }
                Err(failure) => {
                    warn!(
                        symbol = %canonical,
                        provider = provider.as_str(),
                        reason = failure.reason.as_str(),
                        "provider failed, falling back"
                    );
                    trail.failed.push(ProviderFailure::new(*provider, failure));
                }
            }
        }

        None
    }
}

impl SeriesResolver for FallbackOrchestrator {
    fn resolve<'a>(
        &'a self,
        canonical: &'a CanonicalSymbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<FetchOutcome, AcquisitionError>> + Send + 'a>> {
        Box::pin(FallbackOrchestrator::resolve(self, canonical, range))
    }
}

/// Builds a [`FallbackOrchestrator`] wired to the real providers.
///
/// # Environment Variables
///
/// | Provider | Primary Env Var | Fallback Env Var |
/// |----------|----------------|------------------|
/// | FRED | `RISKRADAR_FRED_API_KEY` | `FRED_API_KEY` |
/// | Alpha Vantage | `RISKRADAR_ALPHAVANTAGE_API_KEY` | `ALPHAVANTAGE_API_KEY` |
/// | Twelve Data | `RISKRADAR_TWELVEDATA_API_KEY` | `TWELVEDATA_API_KEY` |
/// | FRED graph, Yahoo | (no key required) | - |
///
/// Providers that need a key are left unregistered when it is missing.
pub struct OrchestratorBuilder {
    translator: SymbolTranslator,
    priority: Vec<ProviderId>,
    retry: RetryPolicy,
    budget: Duration,
    fred_api_key: Option<String>,
    alphavantage_api_key: Option<String>,
    twelvedata_api_key: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            translator: SymbolTranslator::builtin(),
            priority: ProviderId::DEFAULT_PRIORITY.to_vec(),
            retry: RetryPolicy::default(),
            budget: DEFAULT_REQUEST_BUDGET,
            fred_api_key: None,
            alphavantage_api_key: None,
            twelvedata_api_key: None,
            http_client: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Read API keys from the environment.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        builder.fred_api_key = read_key("RISKRADAR_FRED_API_KEY", "FRED_API_KEY");
        builder.alphavantage_api_key =
            read_key("RISKRADAR_ALPHAVANTAGE_API_KEY", "ALPHAVANTAGE_API_KEY");
        builder.twelvedata_api_key = read_key("RISKRADAR_TWELVEDATA_API_KEY", "TWELVEDATA_API_KEY");
        builder
    }

    pub fn with_translator(mut self, translator: SymbolTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_priority(mut self, priority: &[ProviderId]) -> Self {
        self.priority = dedupe_chain(priority);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_fred_key(mut self, key: impl Into<String>) -> Self {
        self.fred_api_key = Some(key.into());
        self
    }

    pub fn with_alphavantage_key(mut self, key: impl Into<String>) -> Self {
        self.alphavantage_api_key = Some(key.into());
        self
    }

    pub fn with_twelvedata_key(mut self, key: impl Into<String>) -> Self {
        self.twelvedata_api_key = Some(key.into());
        self
    }

    /// Share one transport across adapters (tests pass a scripted client).
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Providers that would be registered by [`build`](Self::build).
    pub fn registered_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|provider| match provider {
                ProviderId::Fred => self.fred_api_key.is_some(),
                ProviderId::AlphaVantage => self.alphavantage_api_key.is_some(),
                ProviderId::TwelveData => self.twelvedata_api_key.is_some(),
                ProviderId::FredGraph | ProviderId::Yahoo => true,
            })
            .collect()
    }

    pub fn build(self) -> FallbackOrchestrator {
        let http_client = self
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let mut sources: Vec<Arc<dyn SeriesSource>> = Vec::new();

        if let Some(key) = &self.fred_api_key {
            sources.push(Arc::new(self.adapter(FredProtocol::new(key.clone()), &http_client)));
        }
        sources.push(Arc::new(self.adapter(FredGraphProtocol::default(), &http_client)));
        sources.push(Arc::new(self.adapter(YahooProtocol::default(), &http_client)));
        if let Some(key) = &self.alphavantage_api_key {
            sources.push(Arc::new(self.metered(AlphaVantageProtocol::new(key.clone()), &http_client)));
        }
        if let Some(key) = &self.twelvedata_api_key {
            sources.push(Arc::new(self.metered(TwelveDataProtocol::new(key.clone()), &http_client)));
        }

        FallbackOrchestrator::new(self.translator, sources)
            .with_priority(&self.priority)
            .with_budget(self.budget)
    }

    fn adapter<P: crate::adapters::ProviderProtocol>(
        &self,
        protocol: P,
        http_client: &Arc<dyn HttpClient>,
    ) -> SourceAdapter<P> {
        SourceAdapter::new(protocol, Arc::clone(http_client))
            .with_retry_policy(self.retry)
            .with_sleeper(Arc::clone(&self.sleeper))
    }

    fn metered<P: crate::adapters::ProviderProtocol>(
        &self,
        protocol: P,
        http_client: &Arc<dyn HttpClient>,
    ) -> SourceAdapter<P> {
        let provider = protocol.provider();
        let adapter = self.adapter(protocol, http_client);
        match ProviderPolicy::default_for(provider) {
            Some(policy) => adapter.with_throttle(ThrottlingQueue::from_policy(&policy)),
            None => adapter,
        }
    }
}

fn read_key(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(chain.len());

    for provider in chain {
        if seen.insert(*provider) {
            output.push(*provider);
        }
    }

    output
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceResult;
    use crate::domain::Observation;
    use std::sync::Mutex;
    use time::macros::date;

    struct StubSource {
        id: ProviderId,
        result: SourceResult,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl StubSource {
        fn ok(id: ProviderId, value: f64) -> Arc<Self> {
            let series = TimeSeries::new(
                symbol(),
                crate::Unit::Percent,
                vec![Observation::present(date!(2024 - 01 - 02), value)],
            )
            .expect("valid series");
            Arc::new(Self {
                id,
                result: Ok(SourceSuccess { series, source: id }),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(id: ProviderId, failure: SourceFailure) -> Arc<Self> {
            Arc::new(Self {
                id,
                result: Err(failure),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl SeriesSource for StubSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn fetch<'a>(
            &'a self,
            request: FetchRequest,
        ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>> {
            self.calls.lock().expect("calls lock").push(request.candidates);
            let result = self.result.clone();
            Box::pin(async move { result })
        }
    }

    fn symbol() -> CanonicalSymbol {
        CanonicalSymbol::parse("US_10Y").expect("valid symbol")
    }

    fn range() -> DateRange {
        DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).expect("valid range")
    }

    #[tokio::test]
    async fn stops_at_first_success_in_priority_order() {
        let fred = StubSource::failing(ProviderId::Fred, SourceFailure::network("down"));
        let graph = StubSource::ok(ProviderId::FredGraph, 4.0);
        let yahoo = StubSource::ok(ProviderId::Yahoo, 40.0);
        let sources: Vec<Arc<dyn SeriesSource>> = vec![fred, graph, yahoo.clone()];
        let orchestrator = FallbackOrchestrator::new(SymbolTranslator::builtin(), sources);

        let outcome = orchestrator.resolve(&symbol(), range()).await.expect("resolves");

        assert_eq!(outcome.source, ProviderId::FredGraph);
        assert_eq!(outcome.source_chain(), vec![ProviderId::Fred, ProviderId::FredGraph]);
        assert_eq!(outcome.failed[0].reason, FailureReason::NetworkError);
        assert!(yahoo.calls().is_empty());
        assert!(!outcome.cache_hit);
    }

    #[tokio::test]
    async fn unmapped_and_unregistered_providers_are_skipped_not_failed() {
        let yahoo = StubSource::failing(ProviderId::Yahoo, SourceFailure::no_data("empty"));
        let sources: Vec<Arc<dyn SeriesSource>> = vec![yahoo];
        let orchestrator = FallbackOrchestrator::new(SymbolTranslator::builtin(), sources);
        let hy = CanonicalSymbol::parse("HY_OAS").expect("valid symbol");

        let err = orchestrator.resolve(&hy, range()).await.expect_err("must fail");

        let AcquisitionError::TotalFailure(failure) = err else {
            panic!("expected total failure");
        };
        assert!(failure.attempts.is_empty());
        assert_eq!(failure.skipped.len(), ProviderId::ALL.len());
    }

    #[tokio::test]
    async fn symbol_without_any_mapping_is_unmapped() {
        let orchestrator = FallbackOrchestrator::new(SymbolTranslator::builtin(), Vec::new());
        let unknown = CanonicalSymbol::parse("NOPE").expect("valid symbol");

        let err = orchestrator.resolve(&unknown, range()).await.expect_err("must fail");
        assert!(matches!(err, AcquisitionError::Unmapped { .. }));
    }

    #[tokio::test]
    async fn explicit_priority_is_deduplicated() {
        let yahoo = StubSource::failing(ProviderId::Yahoo, SourceFailure::no_data("empty"));
        let fred = StubSource::ok(ProviderId::Fred, 4.0);
        let sources: Vec<Arc<dyn SeriesSource>> = vec![yahoo.clone(), fred];
        let orchestrator = FallbackOrchestrator::new(SymbolTranslator::builtin(), sources);

        let outcome = orchestrator
            .resolve_with_priority(
                &symbol(),
                &[ProviderId::Yahoo, ProviderId::Yahoo, ProviderId::Fred],
                range(),
            )
            .await
            .expect("resolves");

        assert_eq!(outcome.source, ProviderId::Fred);
        assert_eq!(yahoo.calls(), vec![vec![String::from("^TNX")]]);
    }

    #[test]
    fn builder_registers_keyless_providers_only_without_keys() {
        let builder = OrchestratorBuilder::new();
        assert_eq!(
            builder.registered_providers(),
            vec![ProviderId::FredGraph, ProviderId::Yahoo]
        );

        let builder = builder.with_fred_key("k").with_twelvedata_key("t");
        assert_eq!(
            builder.registered_providers(),
            vec![ProviderId::Fred, ProviderId::FredGraph, ProviderId::Yahoo, ProviderId::TwelveData]
        );
    }

    #[test]
    fn total_failure_display_lists_each_provider() {
        let failure = TotalFailure {
            symbol: symbol(),
            attempts: vec![
                ProviderFailure::new(ProviderId::Fred, SourceFailure::no_data("empty")),
                ProviderFailure::new(ProviderId::Yahoo, SourceFailure::rate_limited("429")),
            ],
            skipped: Vec::new(),
            deadline_exceeded: false,
        };

        assert_eq!(
            failure.to_string(),
            "all providers failed for 'US_10Y': fred: no_data (empty); yahoo: rate_limited (429)"
        );
    }
}
