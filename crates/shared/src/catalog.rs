//! Tier feature catalog
//!
//! Static mapping of tier to feature flags and limits. Feature gating always
//! consults the *effective* tier (see the entitlements crate), never the
//! billed tier directly.

use serde::{Deserialize, Serialize};

use crate::types::Tier;

/// Named boolean features for `Tier::has_feature`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BatchProcessing,
    ApiAccess,
    PriorityQueue,
    CustomTemplates,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchProcessing => "batch_processing",
            Self::ApiAccess => "api_access",
            Self::PriorityQueue => "priority_queue",
            Self::CustomTemplates => "custom_templates",
        }
    }
}

/// Feature flags and limits for one tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierFeatures {
    pub tier: Tier,
    /// Documentation generations per calendar month
    pub monthly_generations: u64,
    /// Largest accepted source file, in KB
    pub max_source_kb: u32,
    /// Files per batch (0 when batches are unavailable)
    pub max_batch_files: u32,
    pub batch_processing: bool,
    pub api_access: bool,
    pub priority_queue: bool,
    pub custom_templates: bool,
}

impl Tier {
    /// Feature flags and limits for this tier
    ///
    /// Free and the legacy starter tier share one set of limits; enterprise
    /// is effectively unmetered.
    pub fn features(&self) -> TierFeatures {
        match self {
            Self::Free | Self::Starter => TierFeatures {
                tier: *self,
                monthly_generations: 10,
                max_source_kb: 64,
                max_batch_files: 0,
                batch_processing: false,
                api_access: false,
                priority_queue: false,
                custom_templates: false,
            },
            Self::Pro => TierFeatures {
                tier: *self,
                monthly_generations: 200,
                max_source_kb: 512,
                max_batch_files: 25,
                batch_processing: true,
                api_access: true,
                priority_queue: false,
                custom_templates: false,
            },
            Self::Team => TierFeatures {
                tier: *self,
                monthly_generations: 1_000,
                max_source_kb: 2_048,
                max_batch_files: 100,
                batch_processing: true,
                api_access: true,
                priority_queue: true,
                custom_templates: true,
            },
            Self::Enterprise => TierFeatures {
                tier: *self,
                monthly_generations: u64::MAX,
                max_source_kb: u32::MAX,
                max_batch_files: 500,
                batch_processing: true,
                api_access: true,
                priority_queue: true,
                custom_templates: true,
            },
        }
    }

    /// Check a single named feature flag
    pub fn has_feature(&self, feature: Feature) -> bool {
        let features = self.features();
        match feature {
            Feature::BatchProcessing => features.batch_processing,
            Feature::ApiAccess => features.api_access,
            Feature::PriorityQueue => features.priority_queue,
            Feature::CustomTemplates => features.custom_templates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_generations() {
        assert_eq!(Tier::Free.features().monthly_generations, 10);
        assert_eq!(Tier::Starter.features().monthly_generations, 10); // Legacy
        assert_eq!(Tier::Pro.features().monthly_generations, 200);
        assert_eq!(Tier::Team.features().monthly_generations, 1_000);
        assert_eq!(Tier::Enterprise.features().monthly_generations, u64::MAX);
    }

    #[test]
    fn test_max_source_kb() {
        assert_eq!(Tier::Free.features().max_source_kb, 64);
        assert_eq!(Tier::Pro.features().max_source_kb, 512);
        assert_eq!(Tier::Team.features().max_source_kb, 2_048);
        assert_eq!(Tier::Enterprise.features().max_source_kb, u32::MAX);
    }

    #[test]
    fn test_batch_processing_gate() {
        assert!(!Tier::Free.has_feature(Feature::BatchProcessing));
        assert!(!Tier::Starter.has_feature(Feature::BatchProcessing));
        assert!(Tier::Pro.has_feature(Feature::BatchProcessing));
        assert!(Tier::Team.has_feature(Feature::BatchProcessing));
        assert!(Tier::Enterprise.has_feature(Feature::BatchProcessing));

        assert_eq!(Tier::Free.features().max_batch_files, 0);
        assert_eq!(Tier::Pro.features().max_batch_files, 25);
    }

    #[test]
    fn test_api_access_gate() {
        assert!(!Tier::Free.has_feature(Feature::ApiAccess));
        assert!(Tier::Pro.has_feature(Feature::ApiAccess));
        assert!(Tier::Enterprise.has_feature(Feature::ApiAccess));
    }

    #[test]
    fn test_team_only_features() {
        assert!(!Tier::Pro.has_feature(Feature::PriorityQueue));
        assert!(Tier::Team.has_feature(Feature::PriorityQueue));
        assert!(!Tier::Pro.has_feature(Feature::CustomTemplates));
        assert!(Tier::Team.has_feature(Feature::CustomTemplates));
        assert!(Tier::Enterprise.has_feature(Feature::CustomTemplates));
    }
}
