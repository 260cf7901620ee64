use std::time::Duration;

use crate::ProviderId;

/// Local request quota for a metered provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub quota_window: Duration,
    pub quota_limit: u32,
}

impl ProviderPolicy {
    /// Alpha Vantage free tier: 5 requests per minute.
    pub fn alphavantage_default() -> Self {
        Self {
            provider_id: ProviderId::AlphaVantage,
            quota_window: Duration::from_secs(60),
            quota_limit: 5,
        }
    }

    /// Twelve Data basic plan: 8 credits per minute.
    pub fn twelvedata_default() -> Self {
        Self {
            provider_id: ProviderId::TwelveData,
            quota_window: Duration::from_secs(60),
            quota_limit: 8,
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Option<Self> {
        match provider_id {
            ProviderId::AlphaVantage => Some(Self::alphavantage_default()),
            ProviderId::TwelveData => Some(Self::twelvedata_default()),
            ProviderId::Fred | ProviderId::FredGraph | ProviderId::Yahoo => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphavantage_policy_matches_free_tier() {
        let policy = ProviderPolicy::alphavantage_default();

        assert_eq!(policy.provider_id, ProviderId::AlphaVantage);
        assert_eq!(policy.quota_window, Duration::from_secs(60));
        assert_eq!(policy.quota_limit, 5);
    }

    #[test]
    fn only_metered_providers_have_policies() {
        for provider in ProviderId::ALL {
            assert_eq!(
                ProviderPolicy::default_for(provider).is_some(),
                provider.is_metered()
            );
        }
    }
}
