//! TOML configuration.
//!
//! Loaded once, validated at load time and passed explicitly afterwards. Every
//! field has a default so an empty file is a valid configuration.
//!
//! ```toml
//! [analysis]
//! lookback_window = 252
//! min_periods_fraction = 0.8
//!
//! [analysis.composite_weights]
//! HY_OAS = 0.30
//! IG_OAS = 0.20
//! STLFSI = 0.25
//! VIX = 0.25
//!
//! [acquisition]
//! priority = ["fred", "fredgraph", "yahoo", "alphavantage", "twelvedata"]
//! backoff = "exponential"
//! retry_delay_ms = 500
//! retry_jitter = true
//!
//! [acquisition.symbol_overrides.yahoo]
//! EURUSD = ["EURUSD=X", "EUR=X"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use riskradar_core::{
    Backoff, CanonicalSymbol, OrchestratorBuilder, ProviderId, RetryPolicy, SymbolTranslator,
    ValidationError,
};

use crate::regime::{default_flag_thresholds, CompositeWeights, RegimeClassifier, RegimeThresholds};
use crate::stats::ZScoreParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("composite weights must sum to 1.0 (±1e-9), got {sum}")]
    WeightSum { sum: f64 },
    #[error("weight for '{component}' must be finite and non-negative, got {weight}")]
    InvalidWeight { component: String, weight: f64 },
    #[error("regime thresholds must be finite and strictly increasing, got watch={watch} warning={warning} alert={alert}")]
    Thresholds { watch: f64, warning: f64, alert: f64 },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub analysis: AnalysisConfig,
    pub acquisition: AcquisitionConfig,
}

impl RadarConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;
        self.acquisition.validate()
    }
}

/// Statistics and classification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub lookback_window: usize,
    pub min_periods_fraction: f64,
    pub composite_weights: CompositeWeights,
    pub thresholds: RegimeThresholds,
    pub component_flag_thresholds: BTreeMap<String, f64>,
    /// How far a component reading may be carried forward when aligning dates.
    pub max_staleness_days: i64,
    /// How far a spread leg may be carried forward onto the other leg's dates.
    /// Monthly international yields need a month and a half.
    pub spread_staleness_days: i64,
    pub correlation_windows: Vec<usize>,
    pub max_lag: usize,
    /// Tail length of the historical block in spread analysis.
    pub history_days: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lookback_window: 252,
            min_periods_fraction: 0.8,
            composite_weights: CompositeWeights::default(),
            thresholds: RegimeThresholds::default(),
            component_flag_thresholds: default_flag_thresholds()
                .into_iter()
                .map(|(symbol, threshold)| (symbol.to_string(), threshold))
                .collect(),
            max_staleness_days: 10,
            spread_staleness_days: 45,
            correlation_windows: vec![30, 90, 180],
            max_lag: 20,
            history_days: 180,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zscore_params()?;
        self.thresholds.validate()?;
        self.flag_thresholds()?;

        for (name, days) in [
            ("max_staleness_days", self.max_staleness_days),
            ("spread_staleness_days", self.spread_staleness_days),
        ] {
            if days < 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must not be negative, got {days}"
                )));
            }
        }
        if let Some(window) = self.correlation_windows.iter().find(|window| **window < 2) {
            return Err(ConfigError::Invalid(format!(
                "correlation windows need at least 2 observations, got {window}"
            )));
        }
        Ok(())
    }

    pub fn zscore_params(&self) -> Result<ZScoreParams, ConfigError> {
        ZScoreParams::new(self.lookback_window, self.min_periods_fraction)
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn flag_thresholds(&self) -> Result<BTreeMap<CanonicalSymbol, f64>, ConfigError> {
        self.component_flag_thresholds
            .iter()
            .map(|(name, threshold)| {
                if !threshold.is_finite() {
                    return Err(ConfigError::Invalid(format!(
                        "flag threshold for '{name}' must be finite"
                    )));
                }
                Ok((CanonicalSymbol::parse(name)?, *threshold))
            })
            .collect()
    }

    pub fn classifier(&self) -> Result<RegimeClassifier, ConfigError> {
        Ok(
            RegimeClassifier::new(self.composite_weights.clone(), self.thresholds)
                .with_flag_thresholds(self.flag_thresholds()?)
                .with_max_staleness_days(self.max_staleness_days),
        )
    }
}

/// Delay shape between retries of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Provider chain, retry and cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub priority: Vec<ProviderId>,
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    /// Fixed delay, or the first delay of an exponential backoff.
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_retry_delay_ms: u64,
    pub retry_jitter: bool,
    pub attempt_timeout_ms: u64,
    pub request_budget_ms: u64,
    /// Zero disables the cache.
    pub cache_ttl_secs: u64,
    /// provider → canonical symbol → ordered provider-side aliases.
    pub symbol_overrides: BTreeMap<ProviderId, BTreeMap<String, Vec<String>>>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            priority: ProviderId::DEFAULT_PRIORITY.to_vec(),
            max_attempts: 3,
            backoff: BackoffKind::Fixed,
            retry_delay_ms: 2_000,
            backoff_factor: 2.0,
            max_retry_delay_ms: 30_000,
            retry_jitter: false,
            attempt_timeout_ms: 10_000,
            request_budget_ms: 150_000,
            cache_ttl_secs: 900,
            symbol_overrides: BTreeMap::new(),
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.priority.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "acquisition.priority must list at least one provider",
            )));
        }
        if self.request_budget_ms == 0 || self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(String::from(
                "request_budget_ms and attempt_timeout_ms must be positive",
            )));
        }
        self.retry_policy()?;
        self.translator()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.max_attempts,
            self.backoff()?,
            Duration::from_millis(self.attempt_timeout_ms),
        )?)
    }

    pub fn backoff(&self) -> Result<Backoff, ConfigError> {
        let delay = Duration::from_millis(self.retry_delay_ms);
        match self.backoff {
            BackoffKind::Fixed => Ok(Backoff::Fixed { delay }),
            BackoffKind::Exponential => {
                if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
                    return Err(ConfigError::Invalid(format!(
                        "backoff_factor must be finite and at least 1.0, got {}",
                        self.backoff_factor
                    )));
                }
                if self.max_retry_delay_ms < self.retry_delay_ms {
                    return Err(ConfigError::Invalid(format!(
                        "max_retry_delay_ms ({}) is below retry_delay_ms ({})",
                        self.max_retry_delay_ms, self.retry_delay_ms
                    )));
                }
                Ok(Backoff::Exponential {
                    base: delay,
                    factor: self.backoff_factor,
                    max: Duration::from_millis(self.max_retry_delay_ms),
                    jitter: self.retry_jitter,
                })
            }
        }
    }

    pub fn request_budget(&self) -> Duration {
        Duration::from_millis(self.request_budget_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Builtin tables with the configured overrides applied.
    pub fn translator(&self) -> Result<SymbolTranslator, ConfigError> {
        let mut translator = SymbolTranslator::builtin();
        for (provider, mappings) in &self.symbol_overrides {
            for (canonical, aliases) in mappings {
                translator =
                    translator.with_mapping(*provider, CanonicalSymbol::parse(canonical)?, aliases.clone());
            }
        }
        Ok(translator)
    }

    /// Orchestrator builder with keys from the environment and these settings applied.
    pub fn orchestrator_builder(&self) -> Result<OrchestratorBuilder, ConfigError> {
        Ok(OrchestratorBuilder::from_env()
            .with_translator(self.translator()?)
            .with_priority(&self.priority)
            .with_retry_policy(self.retry_policy()?)
            .with_budget(self.request_budget()))
    }
}
