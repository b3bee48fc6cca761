//! Categorical-mode-shift rule.
//!
//! Computes the most frequent land-cover class per pixel before and
//! after the boundary date (mode composites of a discrete classification
//! band), flags pixels where the class moved by more than the configured
//! shift threshold, and intersects with the baseline forest reference.

use async_trait::async_trait;
use land_audit_assess_models::CriterionResult;
use land_audit_backend::{GeoBackend, ImageCollection};
use land_audit_geo::Region;

use super::{ChangeDetector, baseline_forest_reference, vectorize_verdict};
use crate::AssessError;
use crate::config::DeforestationConfig;

/// See module docs.
pub struct CategoricalModeShift;

#[async_trait]
impl ChangeDetector for CategoricalModeShift {
    fn id(&self) -> &'static str {
        "categorical-mode-shift"
    }

    async fn detect(
        &self,
        backend: &dyn GeoBackend,
        region: &Region,
        config: &DeforestationConfig,
    ) -> Result<CriterionResult, AssessError> {
        let policy = &config.mode_shift;

        // Mode, not median: the band holds discrete class codes.
        let before = ImageCollection::load(&policy.dataset)
            .filter_date(policy.start, policy.boundary)
            .filter_bounds(region)
            .select(&policy.band)
            .mode();
        let after = ImageCollection::load(&policy.dataset)
            .filter_date(policy.boundary, policy.end)
            .filter_bounds(region)
            .select(&policy.band)
            .mode();

        let shifted = after
            .subtract(&before)
            .abs()
            .greater_than(policy.shift_threshold);

        let deforested = shifted.and(&baseline_forest_reference(config)).clip(region);
        vectorize_verdict(backend, &deforested, region, config).await
    }
}
