//! Analysis service.
//!
//! Each call fetches what it needs through a [`SeriesResolver`], computes from
//! scratch and returns plain values. Nothing is retained between calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use riskradar_core::domain::iso_date;
use riskradar_core::{
    AcquisitionError, CanonicalSymbol, DateRange, FetchOutcome, LookbackPeriod, Observation,
    ProviderId, SeriesResolver, TimeSeries, Unit, ValidationError,
};

use crate::alerts::{
    component_flags, curve_inversion, extreme_zscores, high_correlations, regime_changes,
    sort_most_recent_first, Alert,
};
use crate::config::{AnalysisConfig, ConfigError};
use crate::regime::{regime_distribution, CompositeState, Regime, RegimeClassifier, RegimeThresholds};
use crate::stats::{
    align, align_as_of, deltas, latest_correlations, lead_lag, pct_changes, rolling_zscore, summary,
    LeadLag, SummaryStats, ZScoreParams, ZScorePoint, ZScoreSeries,
};

#[derive(Debug, Error)]
pub enum RadarError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("instrument set must list exactly the weighted components {expected:?}, got {actual:?}")]
    InstrumentMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("not enough history to compute statistics for '{symbol}'")]
    InsufficientHistory { symbol: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Components of the composite score requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSet {
    components: Vec<CanonicalSymbol>,
}

impl InstrumentSet {
    pub fn new(components: Vec<CanonicalSymbol>) -> Self {
        let mut seen = BTreeSet::new();
        let components = components
            .into_iter()
            .filter(|symbol| seen.insert(symbol.clone()))
            .collect();
        Self { components }
    }

    /// `HY_OAS`, `IG_OAS`, `STLFSI`, `VIX`.
    pub fn stress_components() -> Self {
        Self::new(
            ["HY_OAS", "IG_OAS", "STLFSI", "VIX"]
                .into_iter()
                .filter_map(|name| CanonicalSymbol::parse(name).ok())
                .collect(),
        )
    }

    pub fn components(&self) -> &[CanonicalSymbol] {
        &self.components
    }
}

/// A spread `long − short` reported under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadLeg {
    pub name: CanonicalSymbol,
    pub long: CanonicalSymbol,
    pub short: CanonicalSymbol,
}

/// Yield spreads crossed against FX pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadPairSpec {
    pub spreads: Vec<SpreadLeg>,
    pub fx: Vec<CanonicalSymbol>,
    /// Spread watched for curve inversion.
    pub inversion_spread: Option<CanonicalSymbol>,
}

impl Default for SpreadPairSpec {
    fn default() -> Self {
        let symbol = |name: &str| CanonicalSymbol::parse(name).ok();
        let leg = |name: &str, long: &str, short: &str| {
            Some(SpreadLeg {
                name: symbol(name)?,
                long: symbol(long)?,
                short: symbol(short)?,
            })
        };

        Self {
            spreads: [
                leg("US_10Y_2Y", "US_10Y", "US_2Y"),
                leg("US_EU_10Y", "US_10Y", "EU_10Y"),
                leg("US_UK_10Y", "US_10Y", "UK_10Y"),
                leg("US_JP_10Y", "US_10Y", "JP_10Y"),
            ]
            .into_iter()
            .flatten()
            .collect(),
            fx: ["DXY", "EURUSD", "USDJPY", "GBPUSD"]
                .into_iter()
                .filter_map(symbol)
                .collect(),
            inversion_spread: symbol("US_10Y_2Y"),
        }
    }
}

impl SpreadPairSpec {
    fn yield_symbols(&self) -> Vec<CanonicalSymbol> {
        let mut seen = BTreeSet::new();
        self.spreads
            .iter()
            .flat_map(|leg| [leg.long.clone(), leg.short.clone()])
            .filter(|symbol| seen.insert(symbol.clone()))
            .collect()
    }
}

/// Where the data behind a result came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Provenance {
    /// Winning provider per fetched symbol.
    pub sources: BTreeMap<String, ProviderId>,
    /// Providers called across all fetches, first use order.
    pub source_chain: Vec<ProviderId>,
    /// Every fetch was served from cache.
    pub cache_hit: bool,
    pub warnings: Vec<String>,
}

impl Provenance {
    fn record(&mut self, symbol: &CanonicalSymbol, outcome: &FetchOutcome) {
        let first = self.sources.is_empty();
        self.sources.insert(symbol.to_string(), outcome.source);
        for provider in outcome.source_chain() {
            if !self.source_chain.contains(&provider) {
                self.source_chain.push(provider);
            }
        }
        self.cache_hit = outcome.cache_hit && (first || self.cache_hit);
    }
}

/// Result plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis<T> {
    pub data: T,
    #[serde(skip)]
    pub provenance: Provenance,
}

impl<T> Analysis<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Analysis<U> {
        Analysis {
            data: f(self.data),
            provenance: self.provenance,
        }
    }
}

/// Composite score statistics over a lookback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarStatistics {
    pub composite: SummaryStats,
    pub regime_distribution: BTreeMap<Regime, usize>,
    pub total_days: usize,
    pub current_regime: Regime,
    pub thresholds: RegimeThresholds,
}

/// Latest readings of a spread analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpreadSnapshot {
    pub yields: BTreeMap<String, f64>,
    pub fx: BTreeMap<String, f64>,
    pub spreads: BTreeMap<String, f64>,
    pub spread_zscores: BTreeMap<String, f64>,
    pub fx_zscores: BTreeMap<String, f64>,
}

/// Chart tails of a spread analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpreadHistory {
    pub spreads: BTreeMap<String, Vec<Observation>>,
    pub spread_zscores: BTreeMap<String, Vec<ZScorePoint>>,
    pub fx: BTreeMap<String, Vec<Observation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadAnalysis {
    #[serde(with = "iso_date")]
    pub as_of: Date,
    pub period: LookbackPeriod,
    pub current: SpreadSnapshot,
    /// spread → fx → window → correlation of spread deltas with FX returns.
    pub correlations: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
    pub lead_lag: BTreeMap<String, BTreeMap<String, LeadLag>>,
    pub historical: SpreadHistory,
    pub alerts: Vec<Alert>,
    pub sources: BTreeMap<String, ProviderId>,
    pub warnings: Vec<String>,
}

/// Calendar days fetched ahead of a lookback so its first date already has a full window.
pub fn warmup_days(window: usize) -> u32 {
    let days = (window as u64 * 365).div_ceil(252) + 30;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Stress radar and spread analysis over a [`SeriesResolver`].
pub struct RiskRadar {
    resolver: Arc<dyn SeriesResolver>,
    config: AnalysisConfig,
    classifier: RegimeClassifier,
    params: ZScoreParams,
    as_of: Option<Date>,
}

impl RiskRadar {
    pub fn new(resolver: Arc<dyn SeriesResolver>, config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            resolver,
            classifier: config.classifier()?,
            params: config.zscore_params()?,
            config,
            as_of: None,
        })
    }

    /// Pin the reference date instead of using today (UTC).
    pub fn with_as_of(mut self, as_of: Date) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn as_of(&self) -> Date {
        self.as_of
            .unwrap_or_else(|| OffsetDateTime::now_utc().date())
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RegimeClassifier {
        &self.classifier
    }

    /// Composite state for the latest date with a defined score.
    pub async fn current_state(&self, set: &InstrumentSet) -> Result<Analysis<CompositeState>, RadarError> {
        let (mut history, scores, provenance) = self.composite_history(set, LookbackPeriod::OneMonth).await?;
        let state = history
            .pop()
            .ok_or_else(|| insufficient(&scores))?;
        info!(date = %state.date, composite = state.composite_z, regime = %state.regime, "current state");
        Ok(Analysis {
            data: state,
            provenance,
        })
    }

    /// One state per date in the lookback, ascending.
    pub async fn history(
        &self,
        set: &InstrumentSet,
        period: LookbackPeriod,
    ) -> Result<Analysis<Vec<CompositeState>>, RadarError> {
        let (history, _, provenance) = self.composite_history(set, period).await?;
        Ok(Analysis {
            data: history,
            provenance,
        })
    }

    pub async fn statistics(
        &self,
        set: &InstrumentSet,
        period: LookbackPeriod,
    ) -> Result<Analysis<RadarStatistics>, RadarError> {
        let (history, scores, provenance) = self.composite_history(set, period).await?;
        let values = history.iter().map(|state| state.composite_z).collect::<Vec<_>>();
        let composite = summary(&values).ok_or_else(|| insufficient(&scores))?;
        let current_regime = history
            .last()
            .map(|state| state.regime)
            .ok_or_else(|| insufficient(&scores))?;

        Ok(Analysis {
            data: RadarStatistics {
                composite,
                regime_distribution: regime_distribution(&history),
                total_days: history.len(),
                current_regime,
                thresholds: *self.classifier.thresholds(),
            },
            provenance,
        })
    }

    /// Regime changes, extreme component scores and current component flags, most recent first.
    pub async fn alerts(
        &self,
        set: &InstrumentSet,
        period: LookbackPeriod,
    ) -> Result<Analysis<Vec<Alert>>, RadarError> {
        let (history, scores, provenance) = self.composite_history(set, period).await?;

        let mut alerts = regime_changes(&history);
        alerts.extend(
            scores
                .iter()
                .filter_map(|(symbol, series)| extreme_zscores(symbol.as_str(), series)),
        );
        if let Some(current) = history.last() {
            alerts.extend(component_flags(current));
        }
        sort_most_recent_first(&mut alerts);

        Ok(Analysis {
            data: alerts,
            provenance,
        })
    }

    pub async fn spread_analysis(
        &self,
        spec: &SpreadPairSpec,
        period: LookbackPeriod,
    ) -> Result<Analysis<SpreadAnalysis>, RadarError> {
        let as_of = self.as_of();
        let report = period.range_ending(as_of);
        let fetch_range = report.extend_back(warmup_days(self.params.window));

        let yield_symbols = spec.yield_symbols();
        let symbols = yield_symbols
            .iter()
            .chain(spec.fx.iter())
            .cloned()
            .collect::<Vec<_>>();

        let mut provenance = Provenance::default();
        let mut fetched = BTreeMap::new();
        let mut first_failure = None;
        for (symbol, result) in self.fetch_all(&symbols, fetch_range).await? {
            match result {
                Ok(outcome) => {
                    provenance.record(&symbol, &outcome);
                    fetched.insert(symbol, outcome.series);
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "optional series unavailable");
                    provenance.warnings.push(format!("{symbol}: {err}"));
                    first_failure.get_or_insert(err);
                }
            }
        }

        let mut spreads = BTreeMap::new();
        for leg in &spec.spreads {
            match (fetched.get(&leg.long), fetched.get(&leg.short)) {
                (Some(long), Some(short)) => {
                    let spread = spread_series(&leg.name, long, short, self.config.spread_staleness_days)?;
                    spreads.insert(leg.name.clone(), spread);
                }
                _ => provenance
                    .warnings
                    .push(format!("spread {} skipped: missing leg", leg.name)),
            }
        }

        if spreads.values().all(|spread| spread.within(&report).present_count() == 0) {
            return Err(match first_failure {
                Some(err) => RadarError::Acquisition(err),
                None => RadarError::InsufficientHistory {
                    symbol: spec
                        .spreads
                        .first()
                        .map(|leg| leg.name.to_string())
                        .unwrap_or_default(),
                },
            });
        }

        let mut current = SpreadSnapshot::default();
        let mut historical = SpreadHistory::default();
        let mut alerts = Vec::new();
        let mut correlations = BTreeMap::new();
        let mut lead_lags = BTreeMap::new();
        let history_days = self.config.history_days;

        for symbol in &yield_symbols {
            if let Some((_, value)) = fetched.get(symbol).and_then(|series| series.within(&report).latest()) {
                current.yields.insert(symbol.to_string(), value);
            }
        }

        let mut fx_returns = BTreeMap::new();
        for symbol in &spec.fx {
            let Some(series) = fetched.get(symbol) else {
                continue;
            };
            let reported = series.within(&report);
            if let Some((_, value)) = reported.latest() {
                current.fx.insert(symbol.to_string(), value);
            }
            if let Some(z) = rolling_zscore(series, self.params).latest().and_then(|point| point.z) {
                current.fx_zscores.insert(symbol.to_string(), z);
            }
            historical
                .fx
                .insert(symbol.to_string(), reported.tail(history_days).observations().to_vec());
            fx_returns.insert(symbol.clone(), pct_changes(&reported));
        }

        for (name, spread) in &spreads {
            let reported = spread.within(&report);
            let mut scores = rolling_zscore(spread, self.params);
            scores.points.retain(|point| report.contains(point.date));

            if let Some((_, value)) = reported.latest() {
                current.spreads.insert(name.to_string(), value);
            }
            if let Some(z) = scores.latest().and_then(|point| point.z) {
                current.spread_zscores.insert(name.to_string(), z);
            }
            if spec.inversion_spread.as_ref() == Some(name) {
                alerts.extend(curve_inversion(name.as_str(), &reported));
            }
            alerts.extend(extreme_zscores(name.as_str(), &scores));

            let spread_deltas = deltas(&reported);
            let mut by_fx = BTreeMap::new();
            let mut lags = BTreeMap::new();
            for (fx, returns) in &fx_returns {
                let windows = latest_correlations(&spread_deltas, returns, &self.config.correlation_windows);
                if let Some((date, _, _)) = align(&spread_deltas, returns).last() {
                    alerts.extend(high_correlations(&format!("{name} vs {fx}"), &windows, *date));
                }
                if !windows.is_empty() {
                    by_fx.insert(fx.to_string(), windows);
                }
                if let Some(result) = lead_lag(&spread_deltas, returns, self.config.max_lag) {
                    lags.insert(fx.to_string(), result);
                }
            }
            correlations.insert(name.to_string(), by_fx);
            lead_lags.insert(name.to_string(), lags);

            historical
                .spreads
                .insert(name.to_string(), reported.tail(history_days).observations().to_vec());
            let start = scores.points.len().saturating_sub(history_days);
            historical
                .spread_zscores
                .insert(name.to_string(), scores.points[start..].to_vec());
        }

        sort_most_recent_first(&mut alerts);
        info!(
            period = %period,
            spreads = spreads.len(),
            alerts = alerts.len(),
            "spread analysis complete"
        );

        Ok(Analysis {
            data: SpreadAnalysis {
                as_of,
                period,
                current,
                correlations,
                lead_lag: lead_lags,
                historical,
                alerts,
                sources: provenance.sources.clone(),
                warnings: provenance.warnings.clone(),
            },
            provenance,
        })
    }

    /// Fetch every component, score it and classify each date of the lookback.
    async fn composite_history(
        &self,
        set: &InstrumentSet,
        period: LookbackPeriod,
    ) -> Result<(Vec<CompositeState>, BTreeMap<CanonicalSymbol, ZScoreSeries>, Provenance), RadarError> {
        self.check_instruments(set)?;

        let report = period.range_ending(self.as_of());
        let fetch_range = report.extend_back(warmup_days(self.params.window));

        let mut provenance = Provenance::default();
        let mut scores = BTreeMap::new();
        for (symbol, result) in self.fetch_all(set.components(), fetch_range).await? {
            let outcome = result?;
            provenance.record(&symbol, &outcome);
            scores.insert(symbol, rolling_zscore(&outcome.series, self.params));
        }

        let mut history = self.classifier.history(&scores);
        history.retain(|state| report.contains(state.date));
        for series in scores.values_mut() {
            series.points.retain(|point| report.contains(point.date));
        }

        debug!(period = %period, states = history.len(), "composite history");
        Ok((history, scores, provenance))
    }

    fn check_instruments(&self, set: &InstrumentSet) -> Result<(), RadarError> {
        let expected = self.classifier.weights().components().collect::<BTreeSet<_>>();
        let actual = set.components().iter().collect::<BTreeSet<_>>();
        if expected != actual {
            return Err(RadarError::InstrumentMismatch {
                expected: expected.iter().map(|symbol| symbol.to_string()).collect(),
                actual: actual.iter().map(|symbol| symbol.to_string()).collect(),
            });
        }
        Ok(())
    }

    /// Independent symbols resolve concurrently; results come back in input order.
    async fn fetch_all(
        &self,
        symbols: &[CanonicalSymbol],
        range: DateRange,
    ) -> Result<Vec<(CanonicalSymbol, Result<FetchOutcome, AcquisitionError>)>, RadarError> {
        let mut tasks = JoinSet::new();
        for (index, symbol) in symbols.iter().cloned().enumerate() {
            let resolver = Arc::clone(&self.resolver);
            tasks.spawn(async move {
                let result = resolver.resolve(&symbol, range).await;
                (index, symbol, result)
            });
        }

        let mut results = Vec::with_capacity(symbols.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.map_err(|err| RadarError::Task(err.to_string()))?);
        }
        results.sort_by_key(|(index, _, _)| *index);

        Ok(results
            .into_iter()
            .map(|(_, symbol, result)| (symbol, result))
            .collect())
    }
}

/// `long − short`, each leg carried forward onto the other's dates.
fn spread_series(
    name: &CanonicalSymbol,
    long: &TimeSeries,
    short: &TimeSeries,
    max_staleness_days: i64,
) -> Result<TimeSeries, ValidationError> {
    let observations = align_as_of(long, short, max_staleness_days)
        .into_iter()
        .map(|(date, long, short)| Observation::present(date, long - short))
        .collect();
    TimeSeries::new(name.clone(), Unit::Percent, observations)
}

/// Component with the fewest defined scores.
fn insufficient(scores: &BTreeMap<CanonicalSymbol, ZScoreSeries>) -> RadarError {
    let symbol = scores
        .iter()
        .min_by_key(|(_, series)| series.defined_count())
        .map(|(symbol, _)| symbol.to_string())
        .unwrap_or_default();
    RadarError::InsufficientHistory { symbol }
}
