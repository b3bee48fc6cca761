//! Magnitude-of-change rule.
//!
//! Composites one or more spectral/radar bands over a baseline and a
//! recent window, flags pixels where |recent − baseline| exceeds the
//! per-band threshold, combines bands (AND to require agreement across
//! sensors, OR to accept any), and intersects with the static baseline
//! forest reference so change outside forest never counts.

use async_trait::async_trait;
use land_audit_assess_models::CriterionResult;
use land_audit_backend::{GeoBackend, ImageCollection, ImageExpr};
use land_audit_geo::Region;

use super::{ChangeDetector, baseline_forest_reference, vectorize_verdict};
use crate::AssessError;
use crate::config::DeforestationConfig;

/// See module docs.
pub struct MagnitudeOfChange;

#[async_trait]
impl ChangeDetector for MagnitudeOfChange {
    fn id(&self) -> &'static str {
        "magnitude-of-change"
    }

    async fn detect(
        &self,
        backend: &dyn GeoBackend,
        region: &Region,
        config: &DeforestationConfig,
    ) -> Result<CriterionResult, AssessError> {
        let policy = &config.magnitude;
        if policy.bands.is_empty() {
            return Err(AssessError::InvalidConfig {
                message: "magnitude-of-change requires at least one band".to_string(),
            });
        }

        let mut combined: Option<ImageExpr> = None;
        for band in &policy.bands {
            let baseline = ImageCollection::load(&policy.dataset)
                .filter_date(policy.baseline_start, policy.baseline_end)
                .filter_bounds(region)
                .select(&band.name)
                .median();
            let recent = ImageCollection::load(&policy.dataset)
                .filter_date(policy.recent_start, policy.recent_end)
                .filter_bounds(region)
                .select(&band.name)
                .median();

            let flagged = recent
                .subtract(&baseline)
                .abs()
                .greater_than(band.threshold);

            combined = Some(match combined {
                None => flagged,
                Some(acc) if policy.require_all_bands => acc.and(&flagged),
                // OR via De Morgan; the backend algebra only has AND/NOT.
                Some(acc) => acc.not().and(&flagged.not()).not(),
            });
        }

        let change = combined.expect("bands checked non-empty above");
        let deforested = change.and(&baseline_forest_reference(config)).clip(region);
        vectorize_verdict(backend, &deforested, region, config).await
    }
}
