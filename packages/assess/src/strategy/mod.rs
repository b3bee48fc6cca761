//! Interchangeable deforestation-detection strategies.
//!
//! All strategies share the same three-phase shape: a baseline forest
//! observation, a recent observation (a composite to suppress
//! noise/clouds), and a change rule combining the two into a boolean
//! "deforested" raster. The surrounding pipeline never changes — a
//! deployment picks one rule via [`StrategyKind`] in configuration.

mod magnitude;
mod mode_shift;
mod threshold_diff;

use async_trait::async_trait;
use land_audit_assess_models::CriterionResult;
use land_audit_backend::{GeoBackend, ImageExpr, VectorizeOptions};
use land_audit_geo::Region;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::AssessError;
use crate::config::DeforestationConfig;

pub use magnitude::MagnitudeOfChange;
pub use mode_shift::CategoricalModeShift;
pub use threshold_diff::ThresholdDifference;

/// Which change rule a deployment runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    /// Forest-presence thresholding of baseline vs. recent observations.
    ThresholdDifference,
    /// Per-band |recent − baseline| magnitude thresholding.
    MagnitudeOfChange,
    /// Most-frequent-class shift across a boundary date.
    CategoricalModeShift,
}

/// A pluggable deforestation-detection algorithm.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    /// Stable identifier for logs.
    fn id(&self) -> &'static str;

    /// Produces the deforestation verdict for one region.
    ///
    /// # Errors
    ///
    /// Returns [`AssessError`] if a forced backend call fails or the
    /// strategy's configuration block is unusable.
    async fn detect(
        &self,
        backend: &dyn GeoBackend,
        region: &Region,
        config: &DeforestationConfig,
    ) -> Result<CriterionResult, AssessError>;
}

/// Instantiates the detector for a configured strategy.
#[must_use]
pub fn select(kind: StrategyKind) -> Box<dyn ChangeDetector> {
    match kind {
        StrategyKind::ThresholdDifference => Box::new(ThresholdDifference),
        StrategyKind::MagnitudeOfChange => Box::new(MagnitudeOfChange),
        StrategyKind::CategoricalModeShift => Box::new(CategoricalModeShift),
    }
}

/// Shared vectorization tail: turns a boolean change mask into the
/// criterion verdict.
///
/// Flagged pixels are self-masked and vectorized best-effort at the
/// configured scale; `status = true` iff no patch survives. A
/// best-effort truncation to zero features is indistinguishable from a
/// true negative — known precision limit.
pub(crate) async fn vectorize_verdict(
    backend: &dyn GeoBackend,
    mask: &ImageExpr,
    region: &Region,
    config: &DeforestationConfig,
) -> Result<CriterionResult, AssessError> {
    let patches = mask.self_mask().vectorize(
        region,
        VectorizeOptions {
            scale_m: config.scale_m,
            connectivity: config.connectivity,
            max_pixels: config.max_pixels,
            best_effort: true,
        },
    );

    let count = backend.count_features(&patches).await?;
    log::debug!("change detection flagged {count} patch(es)");

    if count == 0 {
        Ok(CriterionResult::pass())
    } else {
        Ok(CriterionResult::fail(backend.materialize(&patches).await?))
    }
}

/// Static forest/no-forest reference for the baseline year, shared by
/// the magnitude and mode-shift rules.
pub(crate) fn baseline_forest_reference(config: &DeforestationConfig) -> ImageExpr {
    land_audit_backend::Image::load(&config.baseline.dataset)
        .select(&config.baseline.band)
        .greater_than(config.baseline.threshold)
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::ThresholdDifference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kinds_parse_from_kebab_case() {
        assert_eq!(
            StrategyKind::from_str("threshold-difference").unwrap(),
            StrategyKind::ThresholdDifference
        );
        assert_eq!(
            StrategyKind::from_str("magnitude-of-change").unwrap(),
            StrategyKind::MagnitudeOfChange
        );
        assert_eq!(
            StrategyKind::from_str("categorical-mode-shift").unwrap(),
            StrategyKind::CategoricalModeShift
        );
    }

    #[test]
    fn selector_maps_every_kind() {
        assert_eq!(
            select(StrategyKind::ThresholdDifference).id(),
            "threshold-difference"
        );
        assert_eq!(
            select(StrategyKind::MagnitudeOfChange).id(),
            "magnitude-of-change"
        );
        assert_eq!(
            select(StrategyKind::CategoricalModeShift).id(),
            "categorical-mode-shift"
        );
    }
}
