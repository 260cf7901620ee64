use std::collections::BTreeMap;

use riskradar_core::{FallbackOrchestrator, ProviderId, ProviderPolicy};
use serde::Serialize;

use crate::cli::SourcesArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SourceStatus {
    id: ProviderId,
    /// Position in the configured chain, `None` when left out of it.
    priority: Option<usize>,
    registered: bool,
    metered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota_per_minute: Option<u32>,
    mapped_symbols: usize,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    priority: Vec<ProviderId>,
    sources: Vec<SourceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbols: Option<SymbolTable>,
}

/// canonical → provider → provider-side aliases, in try order.
type SymbolTable = BTreeMap<String, BTreeMap<ProviderId, Vec<String>>>;

pub fn run(args: &SourcesArgs, orchestrator: &FallbackOrchestrator) -> Result<CommandResult, CliError> {
    let translator = orchestrator.translator();
    let canonical = translator.canonical_symbols();

    let sources = ProviderId::ALL
        .into_iter()
        .map(|id| SourceStatus {
            id,
            priority: orchestrator.priority().iter().position(|provider| *provider == id),
            registered: orchestrator.is_registered(id),
            metered: id.is_metered(),
            quota_per_minute: ProviderPolicy::default_for(id).map(|policy| policy.quota_limit),
            mapped_symbols: canonical
                .iter()
                .filter(|symbol| translator.translate(symbol, id).is_ok())
                .count(),
        })
        .collect::<Vec<_>>();

    let symbols: Option<SymbolTable> = args.verbose.then(|| {
        canonical
            .iter()
            .map(|symbol| {
                let aliases = translator
                    .supported_providers(symbol)
                    .into_iter()
                    .filter_map(|provider| {
                        translator
                            .translate(symbol, provider)
                            .ok()
                            .map(|aliases| (provider, aliases.to_vec()))
                    })
                    .collect();
                (symbol.to_string(), aliases)
            })
            .collect()
    });

    let warnings = sources
        .iter()
        .filter(|source| source.priority.is_some() && !source.registered)
        .map(|source| format!("{} is in the priority list but has no API key configured", source.id))
        .collect::<Vec<_>>();

    let data = serde_json::to_value(SourcesResponseData {
        priority: orchestrator.priority().to_vec(),
        sources,
        symbols,
    })?;

    Ok(CommandResult::ok(data, Vec::new()).with_warnings(warnings))
}
