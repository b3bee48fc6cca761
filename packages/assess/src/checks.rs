//! Independent risk checks.
//!
//! Each check is a pure query against the backend, independent of the
//! change-detection strategy and of the other checks; the orchestrator
//! runs them concurrently.

use land_audit_assess_models::CriterionResult;
use land_audit_backend::{
    FeatureDataset, GeoBackend, Image, ReduceOptions, Reducer, VectorizeOptions,
};
use land_audit_geo::Region;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::AssessError;
use crate::config::{BuiltUpConfig, ElevationConfig, OnLandConfig, ProtectedAreaConfig};

/// Which on-land/water implementation to run. The two return different
/// payloads, so the choice is explicit configuration — never a silent
/// fallback.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LandPolicy {
    /// Mode-reduce a categorical land-cover raster; land unless the mode
    /// is the water or no-data sentinel. Boolean only.
    LandCoverMode,
    /// Threshold a water-occurrence raster; any flagged pixel fails the
    /// check and the water polygons are returned as the detail payload.
    WaterOccurrence,
}

/// `status = true` iff the ROI intersects no protected-area polygon.
///
/// # Errors
///
/// Returns [`AssessError`] if the backend query fails.
pub async fn protected_area(
    backend: &dyn GeoBackend,
    region: &Region,
    config: &ProtectedAreaConfig,
) -> Result<CriterionResult, AssessError> {
    let overlapping = FeatureDataset::load(&config.dataset).intersecting(region);
    let count = backend.count_features(&overlapping).await?;
    log::debug!("protected-area overlap count: {count}");

    Ok(if count == 0 {
        CriterionResult::pass()
    } else {
        // Boolean-only criterion; the overlapping polygons are not
        // returned.
        CriterionResult::fail_bare()
    })
}

/// On-land/water classification under the configured [`LandPolicy`].
///
/// # Errors
///
/// Returns [`AssessError`] if the backend query fails.
pub async fn on_land(
    backend: &dyn GeoBackend,
    region: &Region,
    config: &OnLandConfig,
) -> Result<CriterionResult, AssessError> {
    let opts = ReduceOptions {
        scale_m: config.scale_m,
        ..ReduceOptions::default()
    };

    match config.policy {
        LandPolicy::LandCoverMode => {
            let cover = Image::load(&config.dataset)
                .select(&config.band)
                .clip(region);
            let dominant = backend.reduce(&cover, Reducer::Mode, region, opts).await?;
            log::debug!("dominant land-cover class: {dominant:?}");

            // A region with no valid pixels cannot be confirmed as land;
            // the no-data sentinel gets the same treatment.
            let is_land = dominant.is_some_and(|class| {
                (class - config.water_class).abs() >= f64::EPSILON
                    && (class - config.nodata_class).abs() >= f64::EPSILON
            });
            Ok(if is_land {
                CriterionResult::pass()
            } else {
                CriterionResult::fail_bare()
            })
        }
        LandPolicy::WaterOccurrence => {
            let water = Image::load(&config.dataset)
                .select(&config.band)
                .clip(region)
                .greater_than(0.0);
            let flagged = backend
                .reduce(&water, Reducer::Sum, region, opts)
                .await?
                .unwrap_or(0.0);
            log::debug!("water-occurrence flagged pixels: {flagged}");

            if flagged > 0.0 {
                let polygons = water.self_mask().vectorize(
                    region,
                    VectorizeOptions {
                        scale_m: config.scale_m,
                        ..VectorizeOptions::default()
                    },
                );
                Ok(CriterionResult::fail(backend.materialize(&polygons).await?))
            } else {
                Ok(CriterionResult::pass())
            }
        }
    }
}

/// `status = true` iff the ROI intersects no building footprint; on
/// failure the intersecting footprints are the detail payload.
///
/// # Errors
///
/// Returns [`AssessError`] if the backend query fails.
pub async fn built_up(
    backend: &dyn GeoBackend,
    region: &Region,
    config: &BuiltUpConfig,
) -> Result<CriterionResult, AssessError> {
    let footprints = FeatureDataset::load(&config.dataset).intersecting(region);
    let count = backend.count_features(&footprints).await?;
    log::debug!("building-footprint overlap count: {count}");

    if count == 0 {
        Ok(CriterionResult::pass())
    } else {
        Ok(CriterionResult::fail(
            backend.materialize(&footprints).await?,
        ))
    }
}

/// Mean elevation over the ROI in meters. `None` over no-data regions —
/// elevation has no pass/fail semantics and never fails the assessment.
///
/// # Errors
///
/// Returns [`AssessError`] if the backend query fails.
pub async fn elevation(
    backend: &dyn GeoBackend,
    region: &Region,
    config: &ElevationConfig,
) -> Result<Option<f64>, AssessError> {
    let dem = Image::load(&config.dataset)
        .select(&config.band)
        .clip(region);
    let opts = ReduceOptions {
        scale_m: config.scale_m,
        ..ReduceOptions::default()
    };
    let mean = backend.reduce(&dem, Reducer::Mean, region, opts).await?;
    log::debug!("mean elevation: {mean:?}");
    Ok(mean)
}
