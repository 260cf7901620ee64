//! Regime classification.
//!
//! The regime is a pure function of the composite score for one date. Nothing
//! is carried between dates, so history is the same computation repeated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use riskradar_core::domain::iso_date;
use riskradar_core::CanonicalSymbol;

use crate::config::ConfigError;
use crate::stats::{ZScorePoint, ZScoreSeries};

/// Tolerance on the weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Flag threshold for components without an explicit entry.
pub const DEFAULT_FLAG_THRESHOLD: f64 = 1.5;

/// Stress level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Calm,
    Watch,
    Warning,
    Alert,
}

impl Regime {
    pub const ALL: [Self; 4] = [Self::Calm, Self::Watch, Self::Warning, Self::Alert];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calm => "CALM",
            Self::Watch => "WATCH",
            Self::Warning => "WARNING",
            Self::Alert => "ALERT",
        }
    }
}

impl Display for Regime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Regime {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|regime| regime.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown regime '{value}'")))
    }
}

/// Lower bounds (inclusive) of the non-calm regimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub watch: f64,
    pub warning: f64,
    pub alert: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            watch: 1.0,
            warning: 1.75,
            alert: 2.5,
        }
    }
}

impl RegimeThresholds {
    pub fn new(watch: f64, warning: f64, alert: f64) -> Result<Self, ConfigError> {
        let thresholds = Self {
            watch,
            warning,
            alert,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.watch, self.warning, self.alert]
            .iter()
            .all(|value| value.is_finite());
        if !finite || self.watch >= self.warning || self.warning >= self.alert {
            return Err(ConfigError::Thresholds {
                watch: self.watch,
                warning: self.warning,
                alert: self.alert,
            });
        }
        Ok(())
    }

    /// Top-down, first match wins.
    pub fn classify(&self, score: f64) -> Regime {
        if score >= self.alert {
            Regime::Alert
        } else if score >= self.warning {
            Regime::Warning
        } else if score >= self.watch {
            Regime::Watch
        } else {
            Regime::Calm
        }
    }
}

/// Component weights of the composite score. Always sums to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct CompositeWeights(BTreeMap<CanonicalSymbol, f64>);

impl CompositeWeights {
    pub fn new(weights: BTreeMap<CanonicalSymbol, f64>) -> Result<Self, ConfigError> {
        if weights.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "composite_weights must name at least one component",
            )));
        }

        for (component, weight) in &weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    component: component.to_string(),
                    weight: *weight,
                });
            }
        }

        let sum = weights.values().sum::<f64>();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        Ok(Self(weights))
    }

    /// `HY_OAS 0.30`, `IG_OAS 0.20`, `STLFSI 0.25`, `VIX 0.25`.
    pub fn stress_defaults() -> Self {
        Self(
            [("HY_OAS", 0.30), ("IG_OAS", 0.20), ("STLFSI", 0.25), ("VIX", 0.25)]
                .into_iter()
                .filter_map(|(name, weight)| {
                    CanonicalSymbol::parse(name).ok().map(|symbol| (symbol, weight))
                })
                .collect(),
        )
    }

    pub fn get(&self, component: &CanonicalSymbol) -> Option<f64> {
        self.0.get(component).copied()
    }

    pub fn components(&self) -> impl Iterator<Item = &CanonicalSymbol> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalSymbol, f64)> {
        self.0.iter().map(|(symbol, weight)| (symbol, *weight))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self::stress_defaults()
    }
}

impl TryFrom<BTreeMap<String, f64>> for CompositeWeights {
    type Error = ConfigError;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let weights = raw
            .into_iter()
            .map(|(name, weight)| -> Result<(CanonicalSymbol, f64), ConfigError> {
                Ok((CanonicalSymbol::parse(&name)?, weight))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Self::new(weights)
    }
}

impl From<CompositeWeights> for BTreeMap<String, f64> {
    fn from(weights: CompositeWeights) -> Self {
        weights
            .0
            .into_iter()
            .map(|(symbol, weight)| (symbol.to_string(), weight))
            .collect()
    }
}

/// One component's contribution on a date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub value: Option<f64>,
    pub z_score: f64,
    /// Observation date, which may precede the state date by the staleness allowance.
    #[serde(with = "iso_date")]
    pub date: Date,
    pub weight: f64,
    /// Component breached its own flag threshold. Does not affect the regime.
    pub flagged: bool,
}

/// Composite score and regime for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeState {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub composite_z: f64,
    pub regime: Regime,
    pub components: BTreeMap<String, ComponentSnapshot>,
}

impl CompositeState {
    pub fn flagged_components(&self) -> impl Iterator<Item = (&String, &ComponentSnapshot)> {
        self.components.iter().filter(|(_, snapshot)| snapshot.flagged)
    }
}

/// Change of regime between two consecutive states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeTransition {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub from: Regime,
    pub to: Regime,
    pub composite_z: f64,
}

/// Weighted composite of component Z-scores mapped onto a [`Regime`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeClassifier {
    weights: CompositeWeights,
    thresholds: RegimeThresholds,
    flag_thresholds: BTreeMap<CanonicalSymbol, f64>,
    max_staleness_days: i64,
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(CompositeWeights::default(), RegimeThresholds::default())
            .with_flag_thresholds(default_flag_thresholds())
    }
}

impl RegimeClassifier {
    pub fn new(weights: CompositeWeights, thresholds: RegimeThresholds) -> Self {
        Self {
            weights,
            thresholds,
            flag_thresholds: BTreeMap::new(),
            max_staleness_days: 10,
        }
    }

    pub fn with_flag_thresholds(mut self, flag_thresholds: BTreeMap<CanonicalSymbol, f64>) -> Self {
        self.flag_thresholds = flag_thresholds;
        self
    }

    pub fn with_max_staleness_days(mut self, days: i64) -> Self {
        self.max_staleness_days = days.max(0);
        self
    }

    pub fn weights(&self) -> &CompositeWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    pub fn flag_threshold(&self, component: &CanonicalSymbol) -> f64 {
        self.flag_thresholds
            .get(component)
            .copied()
            .unwrap_or(DEFAULT_FLAG_THRESHOLD)
    }

    pub fn classify(&self, composite: f64) -> Regime {
        self.thresholds.classify(composite)
    }

    /// Composite state for `date`, or `None` if any weighted component has no defined score.
    pub fn composite(
        &self,
        readings: &BTreeMap<CanonicalSymbol, ZScorePoint>,
        date: Date,
    ) -> Option<CompositeState> {
        let mut composite_z = 0.0;
        let mut components = BTreeMap::new();

        for (symbol, weight) in self.weights.iter() {
            let reading = readings.get(symbol)?;
            let z = reading.z?;
            composite_z += weight * z;
            components.insert(
                symbol.to_string(),
                ComponentSnapshot {
                    value: reading.value,
                    z_score: z,
                    date: reading.date,
                    weight,
                    flagged: z >= self.flag_threshold(symbol),
                },
            );
        }

        Some(CompositeState {
            date,
            composite_z,
            regime: self.classify(composite_z),
            components,
        })
    }

    /// One state per date of the union calendar where the composite is defined.
    ///
    /// Components are aligned as of each date, carrying a score forward at most
    /// `max_staleness_days` so weekly components line up with daily ones.
    pub fn history(&self, components: &BTreeMap<CanonicalSymbol, ZScoreSeries>) -> Vec<CompositeState> {
        let calendar = self
            .weights
            .components()
            .filter_map(|symbol| components.get(symbol))
            .flat_map(|series| series.points.iter().map(|point| point.date))
            .collect::<BTreeSet<_>>();

        calendar
            .into_iter()
            .filter_map(|date| {
                let readings = self
                    .weights
                    .components()
                    .filter_map(|symbol| {
                        let point = components
                            .get(symbol)?
                            .point_as_of(date, self.max_staleness_days)?;
                        Some((symbol.clone(), *point))
                    })
                    .collect::<BTreeMap<_, _>>();
                self.composite(&readings, date)
            })
            .collect()
    }
}

/// `STLFSI 1.0`, everything else [`DEFAULT_FLAG_THRESHOLD`].
pub fn default_flag_thresholds() -> BTreeMap<CanonicalSymbol, f64> {
    [
        ("HY_OAS", DEFAULT_FLAG_THRESHOLD),
        ("IG_OAS", DEFAULT_FLAG_THRESHOLD),
        ("STLFSI", 1.0),
        ("VIX", DEFAULT_FLAG_THRESHOLD),
    ]
    .into_iter()
    .filter_map(|(name, threshold)| {
        CanonicalSymbol::parse(name)
            .ok()
            .map(|symbol| (symbol, threshold))
    })
    .collect()
}

/// Days spent in each regime. Every regime is present, possibly with zero.
pub fn regime_distribution(states: &[CompositeState]) -> BTreeMap<Regime, usize> {
    let mut distribution = Regime::ALL
        .into_iter()
        .map(|regime| (regime, 0))
        .collect::<BTreeMap<_, _>>();
    for state in states {
        *distribution.entry(state.regime).or_default() += 1;
    }
    distribution
}

/// Regime changes between consecutive states, in date order.
pub fn transitions(states: &[CompositeState]) -> Vec<RegimeTransition> {
    states
        .windows(2)
        .filter(|pair| pair[0].regime != pair[1].regime)
        .map(|pair| RegimeTransition {
            date: pair[1].date,
            from: pair[0].regime,
            to: pair[1].regime,
            composite_z: pair[1].composite_z,
        })
        .collect()
}
