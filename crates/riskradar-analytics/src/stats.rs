//! Statistics engine.
//!
//! Rolling Z-scores, first differences, Pearson correlation and lead/lag
//! cross-correlation over normalized [`TimeSeries`]. Undefined results are
//! `None`, never zero.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use riskradar_core::domain::iso_date;
use riskradar_core::{CanonicalSymbol, TimeSeries, Unit};

/// Bound applied to every reported Z-score.
pub const Z_CLIP: f64 = 3.0;

const TIE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("z-score window must be at least 2 observations, got {window}")]
    WindowTooSmall { window: usize },
    #[error("min_periods_fraction must be in (0, 1], got {value}")]
    InvalidFraction { value: f64 },
}

/// Lookback parameters; part of every Z-score result for reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreParams {
    pub window: usize,
    pub min_periods_fraction: f64,
}

impl Default for ZScoreParams {
    fn default() -> Self {
        Self {
            window: 252,
            min_periods_fraction: 0.8,
        }
    }
}

impl ZScoreParams {
    pub fn new(window: usize, min_periods_fraction: f64) -> Result<Self, StatsError> {
        let params = Self {
            window,
            min_periods_fraction,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        if self.window < 2 {
            return Err(StatsError::WindowTooSmall {
                window: self.window,
            });
        }
        if !(self.min_periods_fraction > 0.0 && self.min_periods_fraction <= 1.0) {
            return Err(StatsError::InvalidFraction {
                value: self.min_periods_fraction,
            });
        }
        Ok(())
    }

    /// `ceil(fraction × window)`, at least 2.
    pub fn min_periods(&self) -> usize {
        let raw = (self.window as f64 * self.min_periods_fraction).ceil() as usize;
        raw.clamp(2, self.window.max(2))
    }
}

/// Z-score for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScorePoint {
    #[serde(with = "iso_date")]
    pub date: Date,
    /// Observation the score was computed for.
    pub value: Option<f64>,
    /// Unclipped score.
    pub raw: Option<f64>,
    /// Score clipped to `[-Z_CLIP, Z_CLIP]`.
    pub z: Option<f64>,
}

/// Z-scores aligned one to one with the source series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreSeries {
    pub symbol: CanonicalSymbol,
    pub params: ZScoreParams,
    pub points: Vec<ZScorePoint>,
}

impl ZScoreSeries {
    /// Last point with a defined score.
    pub fn latest(&self) -> Option<&ZScorePoint> {
        self.points.iter().rev().find(|point| point.z.is_some())
    }

    pub fn point_on(&self, date: Date) -> Option<&ZScorePoint> {
        self.points
            .binary_search_by_key(&date, |point| point.date)
            .ok()
            .map(|index| &self.points[index])
    }

    /// Most recent defined point at or before `date`, no older than `max_staleness_days`.
    pub fn point_as_of(&self, date: Date, max_staleness_days: i64) -> Option<&ZScorePoint> {
        let upper = self.points.partition_point(|point| point.date <= date);
        self.points[..upper]
            .iter()
            .rev()
            .take_while(|point| (date - point.date).whole_days() <= max_staleness_days)
            .find(|point| point.z.is_some())
    }

    pub fn defined_count(&self) -> usize {
        self.points.iter().filter(|point| point.z.is_some()).count()
    }
}

/// Rolling Z-score over the trailing `window` observations, current one included.
///
/// Undefined when the current value is a gap, fewer than `min_periods` values
/// are present in the window, or the window has zero variance.
pub fn rolling_zscore(series: &TimeSeries, params: ZScoreParams) -> ZScoreSeries {
    let observations = series.observations();
    let min_periods = params.min_periods();

    let points = observations
        .iter()
        .enumerate()
        .map(|(index, observation)| {
            let start = (index + 1).saturating_sub(params.window);
            let raw = observation.value.and_then(|value| {
                let window = observations[start..=index]
                    .iter()
                    .filter_map(|observation| observation.value)
                    .collect::<Vec<_>>();
                if window.len() < min_periods {
                    return None;
                }
                let (mean, std) = mean_and_std(&window)?;
                if std <= 0.0 || !std.is_finite() {
                    return None;
                }
                Some((value - mean) / std).filter(|z| z.is_finite())
            });

            ZScorePoint {
                date: observation.date,
                value: observation.value,
                raw,
                z: raw.map(|z| z.clamp(-Z_CLIP, Z_CLIP)),
            }
        })
        .collect();

    ZScoreSeries {
        symbol: series.symbol().clone(),
        params,
        points,
    }
}

/// Day-over-day difference; the first date and any date next to a gap are gaps.
pub fn deltas(series: &TimeSeries) -> TimeSeries {
    series.map_values(|index, observations| {
        let previous = observations.get(index.checked_sub(1)?)?.value?;
        Some(observations[index].value? - previous)
    })
}

/// Day-over-day fractional change, for FX-like series.
pub fn pct_changes(series: &TimeSeries) -> TimeSeries {
    series
        .map_values(|index, observations| {
            let previous = observations.get(index.checked_sub(1)?)?.value?;
            if previous == 0.0 {
                return None;
            }
            Some(observations[index].value? / previous - 1.0)
        })
        .with_unit(Unit::Ratio)
}

/// Sample mean and standard deviation (n − 1).
fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Pearson correlation; `None` for mismatched lengths, fewer than 2 points or zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x > 0.0 && var_y > 0.0 {
        let r = cov / (var_x.sqrt() * var_y.sqrt());
        r.is_finite().then(|| r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Inner join on dates where both series have a value.
pub fn align(a: &TimeSeries, b: &TimeSeries) -> Vec<(Date, f64, f64)> {
    let mut left = a.observations().iter().peekable();
    let mut right = b.observations().iter().peekable();
    let mut output = Vec::new();

    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        match l.date.cmp(&r.date) {
            Ordering::Less => {
                left.next();
            }
            Ordering::Greater => {
                right.next();
            }
            Ordering::Equal => {
                if let (Some(x), Some(y)) = (l.value, r.value) {
                    output.push((l.date, x, y));
                }
                left.next();
                right.next();
            }
        }
    }

    output
}

/// As-of join over the dates on which either series has a value.
///
/// Each side contributes its latest value at or before the date, provided it
/// is no older than `max_staleness_days`. A monthly series therefore pairs with
/// every daily reading until its next print.
pub fn align_as_of(a: &TimeSeries, b: &TimeSeries, max_staleness_days: i64) -> Vec<(Date, f64, f64)> {
    let dates = a
        .observations()
        .iter()
        .chain(b.observations())
        .filter(|observation| observation.value.is_some())
        .map(|observation| observation.date)
        .collect::<BTreeSet<_>>();

    dates
        .into_iter()
        .filter_map(|date| {
            let (_, x) = a.value_as_of(date, max_staleness_days)?;
            let (_, y) = b.value_as_of(date, max_staleness_days)?;
            Some((date, x, y))
        })
        .collect()
}

/// Correlation over a trailing window ending on `date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPoint {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub correlation: f64,
}

/// Rolling Pearson correlation over `window` aligned points.
pub fn rolling_correlation(a: &TimeSeries, b: &TimeSeries, window: usize) -> Vec<CorrelationPoint> {
    let aligned = align(a, b);
    if window < 2 || aligned.len() < window {
        return Vec::new();
    }

    aligned
        .windows(window)
        .filter_map(|slice| {
            let x = slice.iter().map(|(_, x, _)| *x).collect::<Vec<_>>();
            let y = slice.iter().map(|(_, _, y)| *y).collect::<Vec<_>>();
            let date = slice.last()?.0;
            pearson(&x, &y).map(|correlation| CorrelationPoint { date, correlation })
        })
        .collect()
}

/// Correlation over the last `w` aligned points for each window, keyed `"{w}d"`.
///
/// Callers pass already-differenced series. Windows longer than the aligned
/// history are left out.
pub fn latest_correlations(a: &TimeSeries, b: &TimeSeries, windows: &[usize]) -> BTreeMap<String, f64> {
    let aligned = align(a, b);
    windows
        .iter()
        .filter(|window| **window >= 2 && aligned.len() >= **window)
        .filter_map(|window| {
            let slice = &aligned[aligned.len() - window..];
            let x = slice.iter().map(|(_, x, _)| *x).collect::<Vec<_>>();
            let y = slice.iter().map(|(_, _, y)| *y).collect::<Vec<_>>();
            pearson(&x, &y).map(|correlation| (format!("{window}d"), correlation))
        })
        .collect()
}

/// Which series moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leader {
    A,
    B,
    Simultaneous,
}

/// Best lag of a cross-correlation scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeadLag {
    pub lag: i32,
    pub correlation: f64,
    pub leader: Leader,
}

/// Scan `k ∈ [-max_lag, max_lag]`, correlating `A[t]` with `B[t-k]`.
///
/// Negative `k` pairs each A value with a later B value, so A leads; positive
/// `k` means B leads. Reports the `k` with the largest absolute correlation; on
/// equal magnitude the smallest `|k|` wins, then the negative `k`. Needs at
/// least `2 × max_lag` aligned points.
pub fn lead_lag(a: &TimeSeries, b: &TimeSeries, max_lag: usize) -> Option<LeadLag> {
    let aligned = align(a, b);
    let n = aligned.len();
    if n < (2 * max_lag).max(3) {
        return None;
    }
    let x = aligned.iter().map(|(_, x, _)| *x).collect::<Vec<_>>();
    let y = aligned.iter().map(|(_, _, y)| *y).collect::<Vec<_>>();

    let max_lag = max_lag as i32;
    let scan_order = std::iter::once(0).chain((1..=max_lag).flat_map(|k| [-k, k]));

    let mut best: Option<(i32, f64)> = None;
    for k in scan_order {
        let Some(correlation) = lagged_correlation(&x, &y, k) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, current)) => correlation.abs() > current.abs() + TIE_EPSILON,
        };
        if better {
            best = Some((k, correlation));
        }
    }

    best.map(|(lag, correlation)| LeadLag {
        lag,
        correlation,
        leader: match lag.cmp(&0) {
            Ordering::Less => Leader::A,
            Ordering::Greater => Leader::B,
            Ordering::Equal => Leader::Simultaneous,
        },
    })
}

fn lagged_correlation(x: &[f64], y: &[f64], k: i32) -> Option<f64> {
    let n = x.len();
    let shift = k.unsigned_abs() as usize;
    if shift >= n {
        return None;
    }
    let (xs, ys) = if k < 0 {
        (&x[..n - shift], &y[shift..])
    } else {
        (&x[shift..], &y[..n - shift])
    };
    pearson(xs, ys)
}

/// Descriptive statistics of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    /// Sample standard deviation; 0 for a single value.
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
}

pub fn summary(values: &[f64]) -> Option<SummaryStats> {
    let finite = values.iter().copied().filter(|value| value.is_finite()).collect::<Vec<_>>();
    let first = *finite.first()?;
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let std = mean_and_std(&finite).map(|(_, std)| std).unwrap_or(0.0);
    let (min, max) = finite
        .iter()
        .fold((first, first), |(min, max), value| (min.min(*value), max.max(*value)));

    Some(SummaryStats {
        mean,
        std,
        max,
        min,
        count: finite.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskradar_core::Observation;
    use time::Duration;
    use time::macros::date;

    fn series(values: &[Option<f64>]) -> TimeSeries {
        let start = date!(2020 - 01 - 01);
        let observations = values
            .iter()
            .enumerate()
            .map(|(index, value)| Observation::new(start + Duration::days(index as i64), *value))
            .collect();
        TimeSeries::new(CanonicalSymbol::parse("TEST").expect("valid symbol"), Unit::Index, observations)
            .expect("valid series")
    }

    fn present(values: &[f64]) -> TimeSeries {
        series(&values.iter().copied().map(Some).collect::<Vec<_>>())
    }

    #[test]
    fn default_min_periods_is_202() {
        assert_eq!(ZScoreParams::default().min_periods(), 202);
    }

    #[test]
    fn rejects_bad_params() {
        assert!(matches!(ZScoreParams::new(1, 0.8), Err(StatsError::WindowTooSmall { .. })));
        assert!(matches!(ZScoreParams::new(20, 0.0), Err(StatsError::InvalidFraction { .. })));
        assert!(matches!(ZScoreParams::new(20, 1.5), Err(StatsError::InvalidFraction { .. })));
    }

    #[test]
    fn short_prefix_is_undefined_not_zero() {
        let params = ZScoreParams::new(10, 0.8).expect("valid params");
        let values = (0..12).map(|i| f64::from(i % 4)).collect::<Vec<_>>();

        let scores = rolling_zscore(&present(&values), params);

        assert_eq!(params.min_periods(), 8);
        assert!(scores.points[..7].iter().all(|point| point.z.is_none()));
        assert!(scores.points[7..].iter().all(|point| point.z.is_some()));
    }

    #[test]
    fn gap_on_current_date_is_undefined() {
        let params = ZScoreParams::new(4, 0.5).expect("valid params");
        let scores = rolling_zscore(&series(&[Some(1.0), Some(2.0), Some(3.0), None]), params);

        assert!(scores.points[2].z.is_some());
        assert_eq!(scores.points[3].z, None);
    }

    #[test]
    fn zero_variance_window_is_undefined() {
        let params = ZScoreParams::new(5, 0.6).expect("valid params");
        let scores = rolling_zscore(&present(&[2.0; 6]), params);

        assert!(scores.points.iter().all(|point| point.z.is_none()));
    }

    #[test]
    fn outlier_is_clipped_but_raw_is_kept() {
        let params = ZScoreParams::new(50, 0.8).expect("valid params");
        let mut values = (0..49).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect::<Vec<_>>();
        values.push(1000.0);

        let scores = rolling_zscore(&present(&values), params);
        let last = scores.points.last().expect("has points");

        assert_eq!(last.z, Some(3.0));
        assert!(last.raw.expect("defined") > 3.0);
    }

    #[test]
    fn deltas_are_first_differences_with_gaps() {
        let d = deltas(&series(&[Some(1.0), Some(1.5), None, Some(2.0), Some(1.0)]));
        let values = d.observations().iter().map(|o| o.value).collect::<Vec<_>>();

        assert_eq!(values, vec![None, Some(0.5), None, None, Some(-1.0)]);
    }

    #[test]
    fn pct_changes_skip_zero_base() {
        let r = pct_changes(&present(&[0.0, 2.0, 3.0]));
        let values = r.observations().iter().map(|o| o.value).collect::<Vec<_>>();

        assert_eq!(values, vec![None, None, Some(0.5)]);
        assert_eq!(r.unit(), Unit::Ratio);
    }

    #[test]
    fn pearson_handles_perfect_and_degenerate_inputs() {
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).expect("defined");
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(pearson(&[1.0], &[1.0]), None);
    }

    #[test]
    fn align_is_an_inner_join_on_present_values() {
        let a = series(&[Some(1.0), Some(2.0), None, Some(4.0)]);
        let b = series(&[Some(10.0), None, Some(30.0), Some(40.0), Some(50.0)]);

        let aligned = align(&a, &b);
        let pairs = aligned.iter().map(|(_, x, y)| (*x, *y)).collect::<Vec<_>>();
        assert_eq!(pairs, vec![(1.0, 10.0), (4.0, 40.0)]);
    }

    #[test]
    fn as_of_alignment_carries_a_monthly_leg_across_daily_dates() {
        let daily = TimeSeries::new(
            CanonicalSymbol::parse("US_10Y").expect("valid symbol"),
            Unit::Percent,
            (0..70)
                .map(|offset| Observation::present(date!(2024 - 01 - 01) + Duration::days(offset), 4.0))
                .collect(),
        )
        .expect("valid series");
        let monthly = TimeSeries::new(
            CanonicalSymbol::parse("EU_10Y").expect("valid symbol"),
            Unit::Percent,
            vec![
                Observation::present(date!(2024 - 01 - 01), 2.5),
                Observation::present(date!(2024 - 02 - 01), 2.0),
            ],
        )
        .expect("valid series");

        let aligned = align_as_of(&daily, &monthly, 45);

        assert_eq!(aligned.len(), 70);
        assert_eq!(aligned[30], (date!(2024 - 01 - 31), 4.0, 2.5));
        assert_eq!(aligned[31], (date!(2024 - 02 - 01), 4.0, 2.0));
        assert_eq!(align(&daily, &monthly).len(), 2);
    }

    #[test]
    fn as_of_alignment_stops_at_the_staleness_limit() {
        let daily = present(&[1.0; 20]);
        let sparse = TimeSeries::new(
            daily.symbol().clone(),
            Unit::Index,
            vec![Observation::present(daily.observations()[0].date, 9.0)],
        )
        .expect("valid series");

        assert_eq!(align_as_of(&daily, &sparse, 5).len(), 6);
        assert_eq!(align_as_of(&daily, &sparse, 0).len(), 1);
    }

    #[test]
    fn latest_correlations_skip_windows_longer_than_history() {
        let a = present(&(0..40).map(|i| f64::from(i * i % 7)).collect::<Vec<_>>());
        let b = present(&(0..40).map(|i| f64::from(i * i % 7) * 2.0 + 1.0).collect::<Vec<_>>());

        let correlations = latest_correlations(&a, &b, &[30, 90]);

        assert_eq!(correlations.len(), 1);
        assert!((correlations["30d"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_correlation_has_one_point_per_full_window() {
        let a = present(&(0..10).map(|i| f64::from(i % 3)).collect::<Vec<_>>());
        let b = present(&(0..10).map(|i| f64::from((i + 1) % 3)).collect::<Vec<_>>());

        assert_eq!(rolling_correlation(&a, &b, 5).len(), 6);
        assert!(rolling_correlation(&a, &b, 11).is_empty());
    }

    #[test]
    fn lead_lag_finds_shift() {
        // b repeats a two steps later.
        let base = [0.3, -1.2, 0.8, 2.1, -0.4, -1.7, 0.9, 1.4, -0.6, 0.2, -2.2, 1.1, 0.5, -0.9, 1.8, -1.3];
        let raw = base.iter().cycle().take(64).copied().collect::<Vec<_>>();
        let a = present(&raw[2..]);
        let b = present(&raw[..62]);

        let result = lead_lag(&a, &b, 5).expect("enough history");

        assert_eq!(result.lag, -2);
        assert!((result.correlation - 1.0).abs() < 1e-9);
        assert_eq!(result.leader, Leader::A);
    }

    #[test]
    fn lead_lag_needs_twice_max_lag_points() {
        let a = present(&[1.0, 2.0, 3.0, 1.0, 2.0]);
        assert_eq!(lead_lag(&a, &a, 3), None);
    }

    #[test]
    fn summary_uses_sample_std() {
        let stats = summary(&[1.0, 2.0, 3.0, 4.0]).expect("non-empty");

        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!((stats.min, stats.max, stats.count), (1.0, 4.0, 4));
        assert_eq!(summary(&[]), None);
    }
}
