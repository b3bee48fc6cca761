//! Threshold-difference change rule.
//!
//! Flags pixels that tested positive for forest in the baseline
//! canopy-cover product but no longer test positive in a recent median
//! composite: `baseline > T_base AND NOT (recent > T_recent)`. Both
//! thresholds are configured policy.

use async_trait::async_trait;
use land_audit_assess_models::CriterionResult;
use land_audit_backend::{GeoBackend, Image, ImageCollection};
use land_audit_geo::Region;

use super::{ChangeDetector, vectorize_verdict};
use crate::AssessError;
use crate::config::DeforestationConfig;

/// See module docs.
pub struct ThresholdDifference;

#[async_trait]
impl ChangeDetector for ThresholdDifference {
    fn id(&self) -> &'static str {
        "threshold-difference"
    }

    async fn detect(
        &self,
        backend: &dyn GeoBackend,
        region: &Region,
        config: &DeforestationConfig,
    ) -> Result<CriterionResult, AssessError> {
        let baseline_forest = Image::load(&config.baseline.dataset)
            .select(&config.baseline.band)
            .clip(region)
            .greater_than(config.baseline.threshold);

        // Median composite suppresses clouds and sensor noise in the
        // recent window.
        let recent_forest = ImageCollection::load(&config.recent.dataset)
            .filter_date(config.recent.start, config.recent.end)
            .filter_bounds(region)
            .select(&config.recent.band)
            .median()
            .clip(region)
            .greater_than(config.recent.threshold);

        let deforested = baseline_forest.and(&recent_forest.not());
        vectorize_verdict(backend, &deforested, region, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use land_audit_backend::local::{GridBounds, GridRaster, LocalBackend};

    const BOUNDS: GridBounds = GridBounds {
        west: 10.0,
        south: 0.0,
        east: 10.1,
        north: 0.1,
    };

    fn roi() -> Region {
        Region::from_rings(vec![vec![
            (10.0, 0.0),
            (10.1, 0.0),
            (10.1, 0.1),
            (10.0, 0.1),
            (10.0, 0.0),
        ]])
        .unwrap()
    }

    fn config() -> DeforestationConfig {
        let mut config = DeforestationConfig::default();
        config.baseline.dataset = "baseline".to_string();
        config.baseline.band = "treecover2000".to_string();
        config.baseline.threshold = 50.0;
        config.recent.dataset = "recent".to_string();
        config.recent.band = "trees".to_string();
        config.recent.threshold = 50.0;
        config
    }

    fn backend(baseline_cover: f64, recent_cover: f64) -> LocalBackend {
        let mut backend = LocalBackend::new();
        backend.insert_image(
            "baseline",
            GridRaster::new(BOUNDS, 10, 10).with_uniform_band("treecover2000", baseline_cover),
        );
        backend.insert_collection(
            "recent",
            vec![(
                NaiveDate::from_ymd_opt(2022, 6, 1).unwrap(),
                GridRaster::new(BOUNDS, 10, 10).with_uniform_band("trees", recent_cover),
            )],
        );
        backend
    }

    #[tokio::test]
    async fn identical_observations_detect_nothing() {
        let backend = backend(100.0, 100.0);
        let result = ThresholdDifference
            .detect(&backend, &roi(), &config())
            .await
            .unwrap();
        assert!(result.status);
        assert!(result.details.is_none());
    }

    #[tokio::test]
    async fn forest_loss_is_flagged_with_patches() {
        let backend = backend(100.0, 0.0);
        let result = ThresholdDifference
            .detect(&backend, &roi(), &config())
            .await
            .unwrap();
        assert!(!result.status);
        let details = result.details.unwrap();
        assert!(!details.features.is_empty());
    }

    #[tokio::test]
    async fn bare_ground_throughout_is_not_deforestation() {
        // Never forest in the baseline — nothing to lose.
        let backend = backend(0.0, 0.0);
        let result = ThresholdDifference
            .detect(&backend, &roi(), &config())
            .await
            .unwrap();
        assert!(result.status);
    }
}
