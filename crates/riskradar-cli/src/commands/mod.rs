mod alerts;
mod fetch;
mod history;
mod sources;
mod spreads;
mod state;
mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use riskradar_analytics::{Analysis, RadarConfig, RadarError, RiskRadar};
use riskradar_core::{
    AcquisitionError, CachedResolver, Envelope, EnvelopeError, FallbackOrchestrator, ProviderId,
    SeriesResolver,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Metadata, SCHEMA_VERSION};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_chain,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    /// Data-less result for a failed acquisition.
    pub fn failed(error: &AcquisitionError) -> Self {
        let mut source_chain = Vec::new();
        for attempt in error.attempts() {
            if !source_chain.contains(&attempt.provider) {
                source_chain.push(attempt.provider);
            }
        }
        Self::ok(Value::Null, source_chain).with_errors(EnvelopeError::from_acquisition(error))
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let config = load_config(cli)?;
    let orchestrator = build_orchestrator(cli, &config)?;

    let command_result = match &cli.command {
        Command::State => state::run(&radar(cli, &config, orchestrator)?).await?,
        Command::History(args) => history::run(args, &radar(cli, &config, orchestrator)?).await?,
        Command::Stats(args) => stats::run(args, &radar(cli, &config, orchestrator)?).await?,
        Command::Alerts(args) => alerts::run(args, &radar(cli, &config, orchestrator)?).await?,
        Command::Spreads(args) => spreads::run(args, &radar(cli, &config, orchestrator)?).await?,
        Command::Fetch(args) => fetch::run(args, cli.as_of, &orchestrator).await?,
        Command::Sources(args) => sources::run(args, &orchestrator)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_chain,
    } = command_result;

    let mut metadata = Metadata::new(source_chain, latency_ms, cache_hit);
    for warning in warnings {
        metadata.push_warning(warning);
    }

    let meta = metadata.into_envelope_meta(SCHEMA_VERSION)?;
    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

fn load_config(cli: &Cli) -> Result<RadarConfig, CliError> {
    match &cli.config {
        Some(path) => Ok(RadarConfig::load(path)?),
        None => Ok(RadarConfig::default()),
    }
}

fn build_orchestrator(cli: &Cli, config: &RadarConfig) -> Result<FallbackOrchestrator, CliError> {
    let mut builder = config.acquisition.orchestrator_builder()?;
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::Command(String::from("--timeout-ms must be positive")));
        }
        builder = builder.with_budget(Duration::from_millis(timeout_ms));
    }
    debug!(providers = ?builder.registered_providers(), "registered providers");
    Ok(builder.build())
}

fn radar(cli: &Cli, config: &RadarConfig, orchestrator: FallbackOrchestrator) -> Result<RiskRadar, CliError> {
    let resolver: Arc<dyn SeriesResolver> = if cli.no_cache {
        Arc::new(orchestrator)
    } else {
        Arc::new(CachedResolver::with_ttl(orchestrator, config.acquisition.cache_ttl()))
    };

    let mut radar = RiskRadar::new(resolver, config.analysis.clone())?;
    if let Some(as_of) = cli.as_of {
        radar = radar.with_as_of(as_of);
    }
    Ok(radar)
}

/// Maps an analysis outcome onto a command result.
///
/// Acquisition failures and short histories become envelope errors; anything
/// else is a CLI error.
pub(crate) fn analysis_result<T: Serialize>(
    outcome: Result<Analysis<T>, RadarError>,
    started: Instant,
) -> Result<CommandResult, CliError> {
    let latency_ms = elapsed_ms(started);
    match outcome {
        Ok(analysis) => {
            let provenance = analysis.provenance;
            Ok(CommandResult::ok(serde_json::to_value(analysis.data)?, provenance.source_chain)
                .with_warnings(provenance.warnings)
                .with_latency(latency_ms)
                .with_cache_hit(provenance.cache_hit))
        }
        Err(RadarError::Acquisition(error)) => Ok(CommandResult::failed(&error).with_latency(latency_ms)),
        Err(error @ RadarError::InsufficientHistory { .. }) => {
            let envelope_error = EnvelopeError::new("analysis.insufficient_history", error.to_string())?
                .with_retryable(false);
            Ok(CommandResult::ok(Value::Null, Vec::new())
                .with_errors(vec![envelope_error])
                .with_latency(latency_ms))
        }
        Err(RadarError::Config(error)) => Err(CliError::Config(error)),
        Err(RadarError::Validation(error)) => Err(CliError::Validation(error)),
        Err(error) => Err(CliError::Command(error.to_string())),
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use clap::Parser;
    use riskradar_analytics::Provenance;
    use riskradar_core::{CanonicalSymbol, FailureReason, ProviderFailure, TotalFailure};
    use serde_json::json;

    fn vix() -> CanonicalSymbol {
        CanonicalSymbol::parse("VIX").expect("valid symbol")
    }

    #[test]
    fn total_failure_becomes_one_error_per_attempt() {
        let failure = AcquisitionError::TotalFailure(TotalFailure {
            symbol: vix(),
            attempts: vec![
                ProviderFailure {
                    provider: ProviderId::Fred,
                    reason: FailureReason::Unauthorized,
                    message: String::from("HTTP 403"),
                },
                ProviderFailure {
                    provider: ProviderId::Yahoo,
                    reason: FailureReason::RateLimited,
                    message: String::from("HTTP 429"),
                },
            ],
            skipped: vec![ProviderId::AlphaVantage],
            deadline_exceeded: false,
        });

        let result = analysis_result::<Value>(Err(RadarError::Acquisition(failure)), Instant::now())
            .expect("rendered as envelope errors");

        assert_eq!(result.data, Value::Null);
        assert_eq!(result.source_chain, vec![ProviderId::Fred, ProviderId::Yahoo]);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[1].source, Some(ProviderId::Yahoo));
        assert_eq!(result.errors[1].retryable, Some(true));
    }

    #[test]
    fn unmapped_symbol_is_a_single_error() {
        let result = analysis_result::<Value>(
            Err(RadarError::Acquisition(AcquisitionError::Unmapped { symbol: vix() })),
            Instant::now(),
        )
        .expect("rendered as envelope errors");

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "acquisition.unmapped");
        assert!(result.source_chain.is_empty());
    }

    #[test]
    fn insufficient_history_is_reported_not_calm() {
        let result = analysis_result::<Value>(
            Err(RadarError::InsufficientHistory {
                symbol: String::from("VIX"),
            }),
            Instant::now(),
        )
        .expect("rendered as envelope errors");

        assert_eq!(result.errors[0].code, "analysis.insufficient_history");
    }

    #[test]
    fn config_file_is_validated_before_any_fetch() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[analysis.thresholds]\nwatch = 3.0\nwarning = 2.0\nalert = 2.5").expect("write config");
        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["riskradar", "--config", path.as_str(), "state"]).expect("valid arguments");

        let err = load_config(&cli).expect_err("must fail");

        assert!(matches!(err, CliError::Config(_)), "{err}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["riskradar", "--timeout-ms", "0", "sources"]).expect("valid arguments");

        let err = build_orchestrator(&cli, &RadarConfig::default())
            .err()
            .expect("must fail");

        assert!(matches!(err, CliError::Command(_)));
    }

    #[test]
    fn success_carries_provenance() {
        let analysis = Analysis {
            data: json!({ "regime": "WATCH" }),
            provenance: Provenance {
                source_chain: vec![ProviderId::FredGraph, ProviderId::Yahoo],
                cache_hit: true,
                warnings: vec![String::from("DXY: no provider returned data")],
                ..Provenance::default()
            },
        };

        let result = analysis_result(Ok(analysis), Instant::now()).expect("ok");

        assert_eq!(result.data["regime"], "WATCH");
        assert_eq!(result.source_chain, vec![ProviderId::FredGraph, ProviderId::Yahoo]);
        assert!(result.cache_hit);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.errors.is_empty());
    }
}
