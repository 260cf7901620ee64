//! Alert generation.
//!
//! Every rule is a pure function of its inputs. Alerts are regenerated on each
//! pass and never deduplicated across calls.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Date;

use riskradar_core::domain::iso_date;
use riskradar_core::TimeSeries;

use crate::regime::{transitions, CompositeState, Regime};
use crate::stats::ZScoreSeries;

pub const EXTREME_Z_HIGH: f64 = 3.0;
pub const EXTREME_Z_MEDIUM: f64 = 2.5;
pub const HIGH_CORRELATION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    CurveInversion,
    ExtremeZscore,
    HighCorrelation,
    RegimeChange,
    ComponentFlag,
}

impl AlertKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurveInversion => "CURVE_INVERSION",
            Self::ExtremeZscore => "EXTREME_ZSCORE",
            Self::HighCorrelation => "HIGH_CORRELATION",
            Self::RegimeChange => "REGIME_CHANGE",
            Self::ComponentFlag => "COMPONENT_FLAG",
        }
    }
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    #[serde(with = "iso_date")]
    pub date: Date,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>, value: f64, date: Date) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            value,
            date,
        }
    }
}

/// One HIGH alert when the latest present spread value is below zero.
pub fn curve_inversion(spread_name: &str, spread: &TimeSeries) -> Option<Alert> {
    let (date, value) = spread.latest()?;
    (value < 0.0).then(|| {
        Alert::new(
            AlertKind::CurveInversion,
            Severity::High,
            format!("{spread_name} spread inverted at {value:.2}"),
            value,
            date,
        )
    })
}

/// Latest unclipped score: `|z| > 3` is HIGH, `2.5 < |z| <= 3` is MEDIUM.
pub fn extreme_zscores(name: &str, scores: &ZScoreSeries) -> Option<Alert> {
    let point = scores.points.iter().rev().find(|point| point.raw.is_some())?;
    let z = point.raw?;
    let severity = if z.abs() > EXTREME_Z_HIGH {
        Severity::High
    } else if z.abs() > EXTREME_Z_MEDIUM {
        Severity::Medium
    } else {
        return None;
    };

    let direction = if z > 0.0 { "above" } else { "below" };
    Some(Alert::new(
        AlertKind::ExtremeZscore,
        severity,
        format!("{name} Z-score {z:.2}, {:.1} std {direction} its rolling mean", z.abs()),
        z,
        point.date,
    ))
}

/// LOW alert per window whose `|correlation| > 0.7`.
pub fn high_correlations(name: &str, correlations: &BTreeMap<String, f64>, date: Date) -> Vec<Alert> {
    correlations
        .iter()
        .filter(|(_, correlation)| correlation.abs() > HIGH_CORRELATION)
        .map(|(window, correlation)| {
            Alert::new(
                AlertKind::HighCorrelation,
                Severity::Low,
                format!("{name} {window} correlation {correlation:.2}"),
                *correlation,
                date,
            )
        })
        .collect()
}

/// One alert per regime change, graded by the destination regime.
pub fn regime_changes(states: &[CompositeState]) -> Vec<Alert> {
    transitions(states)
        .into_iter()
        .map(|transition| {
            let severity = match transition.to {
                Regime::Alert | Regime::Warning => Severity::High,
                Regime::Watch => Severity::Medium,
                Regime::Calm => Severity::Low,
            };
            Alert::new(
                AlertKind::RegimeChange,
                severity,
                format!("regime changed from {} to {}", transition.from, transition.to),
                transition.composite_z,
                transition.date,
            )
        })
        .collect()
}

/// LOW alert per component at or above its own flag threshold.
pub fn component_flags(state: &CompositeState) -> Vec<Alert> {
    state
        .flagged_components()
        .map(|(name, snapshot)| {
            Alert::new(
                AlertKind::ComponentFlag,
                Severity::Low,
                format!("{name} Z-score {:.2} above its flag threshold", snapshot.z_score),
                snapshot.z_score,
                state.date,
            )
        })
        .collect()
}

/// Stable, so alerts on one date keep their generation order.
pub fn sort_most_recent_first(alerts: &mut [Alert]) {
    alerts.sort_by(|left, right| right.date.cmp(&left.date));
}
