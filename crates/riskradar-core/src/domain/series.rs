use serde::{Deserialize, Serialize};
use time::Date;

use super::date::{format_date, iso_date, DateRange};
use super::symbol::CanonicalSymbol;
use crate::ValidationError;

/// One dated value. `None` is an explicit gap, never an implicit zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub value: Option<f64>,
}

impl Observation {
    pub const fn new(date: Date, value: Option<f64>) -> Self {
        Self { date, value }
    }

    pub const fn present(date: Date, value: f64) -> Self {
        Self {
            date,
            value: Some(value),
        }
    }

    pub const fn missing(date: Date) -> Self {
        Self { date, value: None }
    }
}

/// Unit of measure carried by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Percent,
    Index,
    FxRate,
    BasisPoints,
    Ratio,
    #[default]
    Other,
}

/// How absent values are treated by consumers of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Gaps stay explicit.
    #[default]
    Keep,
    /// Gaps were replaced by the last present value.
    ForwardFill,
}

/// Ordered, immutable date to value mapping for one instrument.
///
/// Dates are strictly increasing and present values are finite. Once built the
/// series is only read; derived series are new values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    symbol: CanonicalSymbol,
    unit: Unit,
    gap_policy: GapPolicy,
    observations: Vec<Observation>,
}

impl TimeSeries {
    pub fn new(
        symbol: CanonicalSymbol,
        unit: Unit,
        observations: Vec<Observation>,
    ) -> Result<Self, ValidationError> {
        for pair in observations.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(ValidationError::UnorderedDates {
                    previous: format_date(pair[0].date),
                    next: format_date(pair[1].date),
                });
            }
        }

        if observations
            .iter()
            .any(|observation| observation.value.is_some_and(|value| !value.is_finite()))
        {
            return Err(ValidationError::NonFiniteValue { field: "value" });
        }

        Ok(Self {
            symbol,
            unit,
            gap_policy: GapPolicy::Keep,
            observations,
        })
    }

    pub fn symbol(&self) -> &CanonicalSymbol {
        &self.symbol
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<Date> {
        self.observations.first().map(|observation| observation.date)
    }

    pub fn last_date(&self) -> Option<Date> {
        self.observations.last().map(|observation| observation.date)
    }

    /// Count of observations carrying a value.
    pub fn present_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|observation| observation.value.is_some())
            .count()
    }

    pub fn present_values(&self) -> Vec<f64> {
        self.observations
            .iter()
            .filter_map(|observation| observation.value)
            .collect()
    }

    /// Last observation with a present value.
    pub fn latest(&self) -> Option<(Date, f64)> {
        self.observations
            .iter()
            .rev()
            .find_map(|observation| observation.value.map(|value| (observation.date, value)))
    }

    /// Value recorded exactly on `date`.
    pub fn value_on(&self, date: Date) -> Option<f64> {
        self.observations
            .binary_search_by_key(&date, |observation| observation.date)
            .ok()
            .and_then(|index| self.observations[index].value)
    }

    /// Most recent present value at or before `date`, no older than `max_staleness_days`.
    pub fn value_as_of(&self, date: Date, max_staleness_days: i64) -> Option<(Date, f64)> {
        let upper = self
            .observations
            .partition_point(|observation| observation.date <= date);

        self.observations[..upper]
            .iter()
            .rev()
            .find_map(|observation| observation.value.map(|value| (observation.date, value)))
            .filter(|(observed, _)| (date - *observed).whole_days() <= max_staleness_days)
    }

    /// Sub-series restricted to `range`.
    pub fn within(&self, range: &DateRange) -> Self {
        let observations = self
            .observations
            .iter()
            .filter(|observation| range.contains(observation.date))
            .copied()
            .collect();

        Self {
            symbol: self.symbol.clone(),
            unit: self.unit,
            gap_policy: self.gap_policy,
            observations,
        }
    }

    /// Last `count` observations.
    pub fn tail(&self, count: usize) -> Self {
        let start = self.observations.len().saturating_sub(count);
        Self {
            symbol: self.symbol.clone(),
            unit: self.unit,
            gap_policy: self.gap_policy,
            observations: self.observations[start..].to_vec(),
        }
    }

    /// Copy with every gap replaced by the last present value. Leading gaps stay.
    pub fn forward_filled(&self) -> Self {
        let mut carried = None;
        let observations = self
            .observations
            .iter()
            .map(|observation| {
                if observation.value.is_some() {
                    carried = observation.value;
                }
                Observation::new(observation.date, carried)
            })
            .collect();

        Self {
            symbol: self.symbol.clone(),
            unit: self.unit,
            gap_policy: GapPolicy::ForwardFill,
            observations,
        }
    }

    pub fn renamed(&self, symbol: CanonicalSymbol) -> Self {
        Self {
            symbol,
            ..self.clone()
        }
    }

    pub fn with_unit(&self, unit: Unit) -> Self {
        Self {
            unit,
            ..self.clone()
        }
    }

    /// Same dates, each value recomputed from its index; non-finite results become gaps.
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, &[Observation]) -> Option<f64>,
    {
        let observations = (0..self.observations.len())
            .map(|index| {
                let value = f(index, &self.observations).filter(|value| value.is_finite());
                Observation::new(self.observations[index].date, value)
            })
            .collect();

        Self {
            symbol: self.symbol.clone(),
            unit: self.unit,
            gap_policy: self.gap_policy,
            observations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn symbol() -> CanonicalSymbol {
        CanonicalSymbol::parse("VIX").expect("valid symbol")
    }

    fn sample() -> TimeSeries {
        TimeSeries::new(
            symbol(),
            Unit::Index,
            vec![
                Observation::present(date!(2024 - 01 - 02), 13.2),
                Observation::missing(date!(2024 - 01 - 03)),
                Observation::present(date!(2024 - 01 - 04), 14.1),
                Observation::missing(date!(2024 - 01 - 05)),
            ],
        )
        .expect("valid series")
    }

    #[test]
    fn rejects_duplicate_or_unordered_dates() {
        let err = TimeSeries::new(
            symbol(),
            Unit::Index,
            vec![
                Observation::present(date!(2024 - 01 - 03), 1.0),
                Observation::present(date!(2024 - 01 - 03), 2.0),
            ],
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::UnorderedDates { .. }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = TimeSeries::new(
            symbol(),
            Unit::Index,
            vec![Observation::present(date!(2024 - 01 - 03), f64::NAN)],
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::NonFiniteValue { .. }));
    }

    #[test]
    fn latest_skips_trailing_gaps() {
        assert_eq!(sample().latest(), Some((date!(2024 - 01 - 04), 14.1)));
    }

    #[test]
    fn value_as_of_respects_staleness() {
        let series = sample();
        assert_eq!(
            series.value_as_of(date!(2024 - 01 - 08), 5),
            Some((date!(2024 - 01 - 04), 14.1))
        );
        assert_eq!(series.value_as_of(date!(2024 - 01 - 20), 5), None);
        assert_eq!(series.value_as_of(date!(2024 - 01 - 01), 5), None);
    }

    #[test]
    fn forward_fill_keeps_gaps_explicit_in_source() {
        let series = sample();
        let filled = series.forward_filled();

        assert_eq!(filled.gap_policy(), GapPolicy::ForwardFill);
        assert_eq!(filled.value_on(date!(2024 - 01 - 03)), Some(13.2));
        assert_eq!(series.value_on(date!(2024 - 01 - 03)), None);
        assert_eq!(series.present_count(), 2);
    }

    #[test]
    fn map_values_keeps_dates_and_drops_non_finite() {
        let series = sample();
        let mapped = series.map_values(|index, observations| {
            if index == 2 {
                Some(f64::INFINITY)
            } else {
                observations[index].value.map(|value| value * 2.0)
            }
        });

        assert_eq!(mapped.len(), series.len());
        assert_eq!(mapped.value_on(date!(2024 - 01 - 02)), Some(26.4));
        assert_eq!(mapped.value_on(date!(2024 - 01 - 04)), None);
    }
}
