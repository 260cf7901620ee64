//! # Riskradar Analytics
//!
//! Statistics, regime classification and alerts over series resolved by
//! `riskradar-core`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`stats`] | Rolling Z-scores, deltas, correlation, lead/lag |
//! | [`regime`] | Composite score and regime classification |
//! | [`alerts`] | Threshold alerts |
//! | [`config`] | TOML configuration |
//! | [`radar`] | Current state, history, statistics, alerts and spread analysis |
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use riskradar_analytics::{InstrumentSet, RadarConfig, RiskRadar};
//!
//! let config = RadarConfig::load("riskradar.toml")?;
//! let orchestrator = config.acquisition.orchestrator_builder()?.build();
//! let radar = RiskRadar::new(Arc::new(orchestrator), config.analysis)?;
//! let state = radar.current_state(&InstrumentSet::stress_components()).await?;
//! println!("{} {:.2}", state.data.regime, state.data.composite_z);
//! ```

pub mod alerts;
pub mod config;
pub mod radar;
pub mod regime;
pub mod stats;

pub use alerts::{Alert, AlertKind, Severity};
pub use config::{AcquisitionConfig, AnalysisConfig, BackoffKind, ConfigError, RadarConfig};
pub use radar::{
    warmup_days, Analysis, InstrumentSet, Provenance, RadarError, RadarStatistics, RiskRadar,
    SpreadAnalysis, SpreadHistory, SpreadLeg, SpreadPairSpec, SpreadSnapshot,
};
pub use regime::{
    CompositeState, CompositeWeights, ComponentSnapshot, Regime, RegimeClassifier,
    RegimeThresholds, RegimeTransition,
};
pub use stats::{
    LeadLag, Leader, StatsError, SummaryStats, ZScoreParams, ZScorePoint, ZScoreSeries, Z_CLIP,
};
