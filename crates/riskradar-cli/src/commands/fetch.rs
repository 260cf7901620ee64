use std::time::Instant;

use riskradar_core::{
    CanonicalSymbol, DateRange, FallbackOrchestrator, Observation, ProviderFailure, ProviderId, Unit,
};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{elapsed_ms, CommandResult};

#[derive(Debug, Serialize)]
struct FetchResponseData {
    symbol: CanonicalSymbol,
    unit: Unit,
    range: DateRange,
    source: ProviderId,
    failed: Vec<ProviderFailure>,
    skipped: Vec<ProviderId>,
    observations: Vec<Observation>,
}

pub async fn run(
    args: &FetchArgs,
    as_of: Option<Date>,
    orchestrator: &FallbackOrchestrator,
) -> Result<CommandResult, CliError> {
    let symbol = CanonicalSymbol::parse(&args.symbol)?;
    let end = as_of.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let range = args.period.range_ending(end);

    let started = Instant::now();
    let outcome = if args.sources.is_empty() {
        orchestrator.resolve(&symbol, range).await
    } else {
        orchestrator
            .resolve_with_priority(&symbol, &args.sources, range)
            .await
    };
    let latency_ms = elapsed_ms(started);

    match outcome {
        Ok(outcome) => {
            let source_chain = outcome.source_chain();
            let warnings = outcome
                .failed
                .iter()
                .map(|failure| format!("{} failed before fallback: {}", failure.provider, failure.reason))
                .collect::<Vec<_>>();
            let data = serde_json::to_value(FetchResponseData {
                unit: outcome.series.unit(),
                observations: outcome.series.observations().to_vec(),
                symbol,
                range,
                source: outcome.source,
                failed: outcome.failed,
                skipped: outcome.skipped,
            })?;

            Ok(CommandResult::ok(data, source_chain)
                .with_warnings(warnings)
                .with_latency(latency_ms)
                .with_cache_hit(outcome.cache_hit))
        }
        Err(error) => Ok(CommandResult::failed(&error).with_latency(latency_ms)),
    }
}
