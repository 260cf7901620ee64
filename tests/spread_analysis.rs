//! Behavior-driven tests for the yield spread / FX cross analysis.
//!
//! These tests verify HOW spreads, correlations, lead/lag and alerts are
//! derived from resolved series, including degraded inputs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use riskradar_analytics::alerts::curve_inversion;
use riskradar_analytics::stats::{latest_correlations, lead_lag};
use riskradar_analytics::{
    AlertKind, Leader, RadarConfig, RadarError, RiskRadar, Severity, SpreadPairSpec,
};
use riskradar_core::{
    AcquisitionError, CanonicalSymbol, DateRange, FetchOutcome, LookbackPeriod, Observation,
    ProviderId, SeriesResolver, TimeSeries, TotalFailure, Unit,
};
use time::macros::date;
use time::{Date, Duration};

// =============================================================================
// Test doubles
// =============================================================================

const AS_OF: Date = date!(2024 - 06 - 28);

#[derive(Default)]
struct MarketResolver {
    failing: Vec<&'static str>,
    /// Symbols published once a month, dated the 1st.
    monthly: Vec<&'static str>,
}

fn value(symbol: &str, index: i64) -> f64 {
    let t = index as f64;
    match symbol {
        "US_10Y" => 4.2 + 0.4 * (t / 23.0).sin(),
        "US_2Y" => 4.5 + 0.3 * (t / 17.0).sin(),
        "EU_10Y" => 2.4 + 0.2 * (t / 29.0).cos(),
        "UK_10Y" => 4.0 + 0.25 * (t / 19.0).sin(),
        "JP_10Y" => 0.9 + 0.1 * (t / 37.0).cos(),
        "EURUSD" => 1.08 + 0.03 * (t / 13.0).sin(),
        "USDJPY" => 150.0 + 4.0 * (t / 11.0).cos(),
        "GBPUSD" => 1.26 + 0.02 * (t / 7.0).sin(),
        _ => 104.0 + 2.0 * (t / 5.0).sin(),
    }
}

impl SeriesResolver for MarketResolver {
    fn resolve<'a>(
        &'a self,
        canonical: &'a CanonicalSymbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<FetchOutcome, AcquisitionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.contains(&canonical.as_str()) {
                return Err(AcquisitionError::TotalFailure(TotalFailure {
                    symbol: canonical.clone(),
                    attempts: Vec::new(),
                    skipped: vec![ProviderId::Fred],
                    deadline_exceeded: false,
                }));
            }

            let monthly = self.monthly.contains(&canonical.as_str());
            let observations = (0..=range.len_days())
                .map(|offset| range.start() + Duration::days(offset))
                .filter(|day| !monthly || day.day() == 1)
                .map(|day| {
                    Observation::present(day, value(canonical.as_str(), index(day)))
                })
                .collect();
            Ok(FetchOutcome {
                series: TimeSeries::new(canonical.clone(), Unit::Percent, observations)
                    .expect("valid series"),
                source: ProviderId::Yahoo,
                failed: Vec::new(),
                skipped: Vec::new(),
                latency_ms: 2,
                cache_hit: false,
            })
        })
    }
}

fn radar(failing: Vec<&'static str>) -> RiskRadar {
    radar_over(MarketResolver {
        failing,
        ..MarketResolver::default()
    })
}

fn radar_over(resolver: MarketResolver) -> RiskRadar {
    RiskRadar::new(Arc::new(resolver), RadarConfig::default().analysis)
        .expect("valid config")
        .with_as_of(AS_OF)
}

fn index(day: Date) -> i64 {
    (day - date!(2020 - 01 - 01)).whole_days()
}

fn daily(name: &str, values: &[f64]) -> TimeSeries {
    let observations = values
        .iter()
        .enumerate()
        .map(|(index, value)| Observation::present(date!(2024 - 01 - 01) + Duration::days(index as i64), *value))
        .collect();
    TimeSeries::new(CanonicalSymbol::parse(name).expect("valid symbol"), Unit::Percent, observations)
        .expect("valid series")
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn inverted_curve_emits_one_high_alert() {
    // Given: a 10Y-2Y spread whose latest value is -0.2
    let spread = daily("US_10Y_2Y", &[0.35, 0.1, -0.05, -0.2]);

    // When
    let alerts = curve_inversion("US_10Y_2Y", &spread).into_iter().collect::<Vec<_>>();

    // Then
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::CurveInversion);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].value, -0.2);
    assert_eq!(alerts[0].date, date!(2024 - 01 - 04));
}

#[test]
fn equal_magnitude_lags_resolve_to_negative() {
    // Given: a period-6 pattern and its copy shifted by 3, so lags -3 and +3 match equally
    let pattern = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let a = pattern.iter().cycle().take(60).copied().collect::<Vec<_>>();
    let b = pattern.iter().cycle().skip(3).take(60).copied().collect::<Vec<_>>();

    // When
    let result = lead_lag(&daily("A", &a), &daily("B", &b), 5).expect("enough history");

    // Then
    assert_eq!(result.lag, -3);
    assert_eq!(result.leader, Leader::A);
    assert!((result.correlation - 1.0).abs() < 1e-9);
}

#[test]
fn correlations_need_a_full_window() {
    let a = daily("A", &(0..50).map(|i| f64::from(i % 9)).collect::<Vec<_>>());
    let b = daily("B", &(0..50).map(|i| f64::from((i * 7) % 11)).collect::<Vec<_>>());

    let windows = latest_correlations(&a, &b, &[30, 90, 180]);

    assert_eq!(windows.keys().cloned().collect::<Vec<_>>(), vec![String::from("30d")]);
}

// =============================================================================
// RiskRadar::spread_analysis
// =============================================================================

#[tokio::test]
async fn full_analysis_covers_every_spread_and_fx_pair() {
    // Given
    let radar = radar(Vec::new());

    // When
    let analysis = radar
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::OneYear)
        .await
        .expect("analysis")
        .data;

    // Then
    assert_eq!(analysis.current.spreads.len(), 4);
    assert_eq!(analysis.current.fx.len(), 4);
    assert!(analysis.warnings.is_empty());
    assert_eq!(analysis.sources.len(), 9);

    let us_eu = &analysis.correlations["US_EU_10Y"]["EURUSD"];
    assert_eq!(us_eu.keys().map(String::as_str).collect::<Vec<_>>(), vec!["180d", "30d", "90d"]);
    assert!(us_eu.values().all(|c| (-1.0..=1.0).contains(c)));
    assert!(analysis.lead_lag["US_10Y_2Y"].contains_key("DXY"));
    assert!(analysis.lead_lag["US_10Y_2Y"]["DXY"].lag.abs() <= 20);

    assert!(analysis.historical.spreads["US_10Y_2Y"].len() <= 180);
    assert!(analysis.alerts.windows(2).all(|pair| pair[0].date >= pair[1].date));
}

#[tokio::test]
async fn inversion_alert_tracks_current_spread_sign() {
    let analysis = radar(Vec::new())
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::SixMonths)
        .await
        .expect("analysis")
        .data;

    let current = analysis.current.spreads["US_10Y_2Y"];
    let inversions = analysis
        .alerts
        .iter()
        .filter(|alert| alert.kind == AlertKind::CurveInversion)
        .collect::<Vec<_>>();

    if current < 0.0 {
        assert_eq!(inversions.len(), 1);
        assert!((inversions[0].value - current).abs() < 1e-12);
    } else {
        assert!(inversions.is_empty());
    }
}

#[tokio::test]
async fn missing_fx_pair_degrades_to_warning() {
    // Given: DXY cannot be fetched from any provider
    let analysis = radar(vec!["DXY"])
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::OneYear)
        .await
        .expect("analysis")
        .data;

    // Then: the rest is still computed and the gap is reported
    assert!(!analysis.current.fx.contains_key("DXY"));
    assert_eq!(analysis.current.fx.len(), 3);
    assert!(analysis.warnings.iter().any(|warning| warning.starts_with("DXY")));
    assert!(analysis.correlations["US_10Y_2Y"].get("DXY").is_none());
}

#[tokio::test]
async fn missing_short_leg_drops_only_that_spread() {
    let analysis = radar(vec!["JP_10Y"])
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::OneYear)
        .await
        .expect("analysis")
        .data;

    let spreads = analysis.current.spreads.keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(spreads, vec!["US_10Y_2Y", "US_EU_10Y", "US_UK_10Y"]);
    assert!(analysis
        .warnings
        .iter()
        .any(|warning| warning == "spread US_JP_10Y skipped: missing leg"));
}

#[tokio::test]
async fn no_computable_spread_returns_acquisition_error() {
    let err = radar(vec!["US_10Y"])
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::OneYear)
        .await
        .expect_err("must fail");

    assert!(matches!(err, RadarError::Acquisition(_)), "{err}");
    assert!(err.to_string().contains("'US_10Y'"), "{err}");
}

#[tokio::test]
async fn monthly_foreign_yields_pair_with_every_daily_us_reading() {
    // Given: international 10Y yields only print on the 1st of each month
    let radar = radar_over(MarketResolver {
        monthly: vec!["EU_10Y", "UK_10Y", "JP_10Y"],
        ..MarketResolver::default()
    });

    // When
    let analysis = radar
        .spread_analysis(&SpreadPairSpec::default(), LookbackPeriod::OneYear)
        .await
        .expect("analysis")
        .data;

    // Then: every spread is scored and correlated on the daily calendar
    for spread in ["US_10Y_2Y", "US_EU_10Y", "US_UK_10Y", "US_JP_10Y"] {
        assert!(analysis.current.spread_zscores.contains_key(spread), "{spread} not scored");
        assert_eq!(analysis.historical.spreads[spread].len(), 180, "{spread}");
    }
    let windows = &analysis.correlations["US_EU_10Y"]["EURUSD"];
    assert_eq!(windows.keys().map(String::as_str).collect::<Vec<_>>(), vec!["180d", "30d", "90d"]);
    assert!(analysis.lead_lag["US_EU_10Y"].contains_key("EURUSD"));

    // And: mid-month the spread uses the latest monthly print
    let mid_june = date!(2024 - 06 - 15);
    let point = analysis.historical.spreads["US_EU_10Y"]
        .iter()
        .find(|observation| observation.date == mid_june)
        .expect("mid-month spread");
    let expected = value("US_10Y", index(mid_june)) - value("EU_10Y", index(date!(2024 - 06 - 01)));
    assert_eq!(point.value.map(|v| (v - expected).abs() < 1e-12), Some(true));
}
