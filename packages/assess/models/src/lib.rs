#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Result types for the region risk-assessment pipeline.
//!
//! [`CriterionResult`] is the internal per-criterion outcome; the `Api*`
//! wrappers fix the JSON field names consumed by other systems
//! (`deforestation.details`, `onLand.polygon`, …). Those names are the
//! contract surface — do not rename them.

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};

/// Outcome of one risk criterion.
///
/// `status == true` means the check passes (no risk found). `details` is
/// populated only on the failing path, carrying the offending features
/// for the caller to render.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionResult {
    /// `true` when no risk was detected.
    pub status: bool,
    /// Offending features, present only when `status == false`.
    pub details: Option<FeatureCollection>,
}

impl CriterionResult {
    /// A passing criterion.
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            status: true,
            details: None,
        }
    }

    /// A failing criterion carrying the offending features.
    #[must_use]
    pub const fn fail(details: FeatureCollection) -> Self {
        Self {
            status: false,
            details: Some(details),
        }
    }

    /// A failing criterion with no feature payload.
    #[must_use]
    pub const fn fail_bare() -> Self {
        Self {
            status: false,
            details: None,
        }
    }
}

/// Criterion serialized as `{status, details?}` (deforestation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDetailedCriterion {
    /// `true` when no risk was detected.
    pub status: bool,
    /// Offending features, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FeatureCollection>,
}

/// Criterion serialized as `{status}` only (protected area).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSimpleCriterion {
    /// `true` when no risk was detected.
    pub status: bool,
}

/// Criterion serialized as `{status, polygon?}` (on-land, built-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPolygonCriterion {
    /// `true` when no risk was detected.
    pub status: bool,
    /// Offending features, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<FeatureCollection>,
}

impl From<CriterionResult> for ApiDetailedCriterion {
    fn from(result: CriterionResult) -> Self {
        Self {
            status: result.status,
            details: result.details,
        }
    }
}

impl From<CriterionResult> for ApiSimpleCriterion {
    fn from(result: CriterionResult) -> Self {
        Self {
            status: result.status,
        }
    }
}

impl From<CriterionResult> for ApiPolygonCriterion {
    fn from(result: CriterionResult) -> Self {
        Self {
            status: result.status,
            polygon: result.details,
        }
    }
}

/// Aggregate verdict for one ROI, constructed once per request and never
/// mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    /// The assessed polygon, echoed back as GeoJSON.
    pub polygon: geojson::Geometry,
    /// ROI area in hectares, rounded to 2 decimal places.
    pub area: f64,
    /// Forest-loss verdict from the configured change-detection strategy.
    pub deforestation: ApiDetailedCriterion,
    /// Protected-area overlap check.
    pub protected_area: ApiSimpleCriterion,
    /// On-land/water classification.
    pub on_land: ApiPolygonCriterion,
    /// Building-footprint overlap check.
    pub builtup_area: ApiPolygonCriterion,
    /// Mean elevation in meters; absent over no-data regions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}
