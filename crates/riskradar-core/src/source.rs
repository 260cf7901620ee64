use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// FRED JSON API (primary native source).
    Fred,
    /// FRED graph CSV download, the keyless variant of the same source.
    #[serde(rename = "fredgraph")]
    FredGraph,
    Yahoo,
    #[serde(rename = "alphavantage")]
    AlphaVantage,
    #[serde(rename = "twelvedata")]
    TwelveData,
}

impl ProviderId {
    pub const ALL: [Self; 5] = [
        Self::Fred,
        Self::FredGraph,
        Self::Yahoo,
        Self::AlphaVantage,
        Self::TwelveData,
    ];

    /// Free and unlimited sources first, rate-limited paid tiers last.
    pub const DEFAULT_PRIORITY: [Self; 5] = Self::ALL;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fred => "fred",
            Self::FredGraph => "fredgraph",
            Self::Yahoo => "yahoo",
            Self::AlphaVantage => "alphavantage",
            Self::TwelveData => "twelvedata",
        }
    }

    /// Whether the provider meters requests against a small paid quota.
    pub const fn is_metered(self) -> bool {
        matches!(self, Self::AlphaVantage | Self::TwelveData)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fred" => Ok(Self::Fred),
            "fredgraph" => Ok(Self::FredGraph),
            "yahoo" => Ok(Self::Yahoo),
            "alphavantage" => Ok(Self::AlphaVantage),
            "twelvedata" => Ok(Self::TwelveData),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for provider in ProviderId::ALL {
            assert_eq!(provider.as_str().parse::<ProviderId>(), Ok(provider));
        }
        assert!("polygon".parse::<ProviderId>().is_err());
    }

    #[test]
    fn serializes_lowercase_names() {
        let rendered = serde_json::to_string(&ProviderId::TwelveData).expect("serializes");
        assert_eq!(rendered, "\"twelvedata\"");
    }
}
