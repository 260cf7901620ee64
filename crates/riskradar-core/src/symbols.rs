//! Canonical symbol to provider symbol translation.
//!
//! Each provider has its own static table. A canonical symbol maps to an
//! ordered list of provider-side aliases; adapters try them in order.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{CanonicalSymbol, ProviderId, Unit};

/// No mapping exists for a `(canonical, provider)` pair.
///
/// This is a configuration gap, not a fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider '{provider}' has no mapping for '{symbol}'")]
pub struct NotSupported {
    pub symbol: CanonicalSymbol,
    pub provider: ProviderId,
}

type Aliases = &'static [&'static str];

struct BuiltinEntry {
    canonical: &'static str,
    unit: Unit,
    fred: Aliases,
    yahoo: Aliases,
    alphavantage: Aliases,
    twelvedata: Aliases,
}

const NONE: Aliases = &[];

// FRED series ids serve both the JSON API and the graph CSV download.
const BUILTIN: &[BuiltinEntry] = &[
    BuiltinEntry {
        canonical: "HY_OAS",
        unit: Unit::Percent,
        fred: &["BAMLH0A0HYM2"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "IG_OAS",
        unit: Unit::Percent,
        fred: &["BAMLC0A0CM"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "STLFSI",
        unit: Unit::Index,
        fred: &["STLFSI4", "STLFSI3"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "VIX",
        unit: Unit::Index,
        fred: &["VIXCLS"],
        yahoo: &["^VIX"],
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "US_2Y",
        unit: Unit::Percent,
        fred: &["DGS2"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "US_10Y",
        unit: Unit::Percent,
        fred: &["DGS10"],
        yahoo: &["^TNX"],
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "US_30Y",
        unit: Unit::Percent,
        fred: &["DGS30"],
        yahoo: &["^TYX"],
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "EU_10Y",
        unit: Unit::Percent,
        fred: &["IRLTLT01DEM156N"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "UK_10Y",
        unit: Unit::Percent,
        fred: &["IRLTLT01GBM156N"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "JP_10Y",
        unit: Unit::Percent,
        fred: &["IRLTLT01JPM156N"],
        yahoo: NONE,
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "EURUSD",
        unit: Unit::FxRate,
        fred: &["DEXUSEU"],
        yahoo: &["EURUSD=X", "EUR=X"],
        alphavantage: &["EURUSD"],
        twelvedata: &["EUR/USD"],
    },
    BuiltinEntry {
        canonical: "USDJPY",
        unit: Unit::FxRate,
        fred: &["DEXJPUS"],
        yahoo: &["USDJPY=X", "JPY=X"],
        alphavantage: &["USDJPY"],
        twelvedata: &["USD/JPY"],
    },
    BuiltinEntry {
        canonical: "GBPUSD",
        unit: Unit::FxRate,
        fred: &["DEXUSUK"],
        yahoo: &["GBPUSD=X", "GBP=X"],
        alphavantage: &["GBPUSD"],
        twelvedata: &["GBP/USD"],
    },
    BuiltinEntry {
        canonical: "DXY",
        unit: Unit::Index,
        fred: NONE,
        yahoo: &["DX-Y.NYB"],
        alphavantage: NONE,
        twelvedata: NONE,
    },
    BuiltinEntry {
        canonical: "SPX",
        unit: Unit::Index,
        fred: &["SP500"],
        yahoo: &["^GSPC"],
        alphavantage: NONE,
        twelvedata: NONE,
    },
];

/// Immutable per-provider lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTranslator {
    tables: BTreeMap<ProviderId, BTreeMap<CanonicalSymbol, Vec<String>>>,
    units: BTreeMap<CanonicalSymbol, Unit>,
}

impl SymbolTranslator {
    /// Translator with no mappings at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Translator preloaded with the bundled instrument tables.
    pub fn builtin() -> Self {
        let mut translator = Self::empty();

        for entry in BUILTIN {
            let Ok(canonical) = CanonicalSymbol::parse(entry.canonical) else {
                continue;
            };
            translator.units.insert(canonical.clone(), entry.unit);

            let per_provider = [
                (ProviderId::Fred, entry.fred),
                (ProviderId::FredGraph, entry.fred),
                (ProviderId::Yahoo, entry.yahoo),
                (ProviderId::AlphaVantage, entry.alphavantage),
                (ProviderId::TwelveData, entry.twelvedata),
            ];
            for (provider, aliases) in per_provider {
                if aliases.is_empty() {
                    continue;
                }
                translator.tables.entry(provider).or_default().insert(
                    canonical.clone(),
                    aliases.iter().map(|alias| (*alias).to_owned()).collect(),
                );
            }
        }

        translator
    }

    /// Replace the alias list for one `(provider, canonical)` pair.
    ///
    /// An empty list removes the mapping.
    pub fn with_mapping(
        mut self,
        provider: ProviderId,
        canonical: CanonicalSymbol,
        aliases: Vec<String>,
    ) -> Self {
        let aliases: Vec<String> = aliases
            .into_iter()
            .map(|alias| alias.trim().to_owned())
            .filter(|alias| !alias.is_empty())
            .collect();

        let table = self.tables.entry(provider).or_default();
        if aliases.is_empty() {
            table.remove(&canonical);
        } else {
            table.insert(canonical, aliases);
        }
        self
    }

    pub fn with_unit(mut self, canonical: CanonicalSymbol, unit: Unit) -> Self {
        self.units.insert(canonical, unit);
        self
    }

    /// Ordered provider-side candidates for `canonical`.
    pub fn translate(
        &self,
        canonical: &CanonicalSymbol,
        provider: ProviderId,
    ) -> Result<&[String], NotSupported> {
        self.tables
            .get(&provider)
            .and_then(|table| table.get(canonical))
            .map(Vec::as_slice)
            .filter(|aliases| !aliases.is_empty())
            .ok_or_else(|| NotSupported {
                symbol: canonical.clone(),
                provider,
            })
    }

    /// Providers with a mapping for `canonical`, in [`ProviderId::ALL`] order.
    pub fn supported_providers(&self, canonical: &CanonicalSymbol) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|provider| self.translate(canonical, *provider).is_ok())
            .collect()
    }

    /// Every canonical symbol mapped by at least one provider.
    pub fn canonical_symbols(&self) -> BTreeSet<CanonicalSymbol> {
        self.tables
            .values()
            .flat_map(|table| table.keys().cloned())
            .collect()
    }

    pub fn unit_for(&self, canonical: &CanonicalSymbol) -> Unit {
        self.units.get(canonical).copied().unwrap_or_default()
    }
}
