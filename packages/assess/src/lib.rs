#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Region risk-assessment pipeline.
//!
//! One ROI in, one multi-criterion verdict out: area, deforestation (via
//! a pluggable change-detection strategy), protected-area overlap,
//! on-land classification, built-up detection, and elevation. The
//! pipeline owns no transport — it receives a parsed GeoJSON value and
//! returns an [`AssessmentResult`]; HTTP lives in the server package.
//!
//! A run is a linear state machine: validate → area → criteria →
//! assemble. Criteria have no data dependency on each other and are
//! dispatched concurrently; the first hard failure aborts the run.
//! Partial results are never returned.

pub mod checks;
pub mod config;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use land_audit_assess_models::AssessmentResult;
use land_audit_backend::{BackendError, GeoBackend};
use land_audit_geo::{GeoError, Region};

use crate::config::AssessConfig;

/// Errors surfaced to the caller of [`Assessor::assess`].
///
/// None of these are recovered internally and none trigger retries; the
/// HTTP layer maps them to status codes (validation 4xx, backend and
/// timeout 5xx).
#[derive(Debug, thiserror::Error)]
pub enum AssessError {
    /// The submitted geometry is missing or malformed. Returned before
    /// any backend call is made; user-fixable.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] GeoError),

    /// The deployment configuration cannot drive the selected strategy.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },

    /// A backend call failed (unreachable service or rejected query).
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The request exceeded its overall deadline; in-flight backend
    /// calls were abandoned.
    #[error("assessment timed out")]
    Timeout,
}

/// Runs the full criterion battery over submitted regions.
///
/// Stateless across requests; one instance is shared by all concurrent
/// requests of the host.
pub struct Assessor {
    backend: Arc<dyn GeoBackend>,
    config: AssessConfig,
}

impl Assessor {
    /// Creates an assessor over an already-authenticated backend.
    #[must_use]
    pub const fn new(backend: Arc<dyn GeoBackend>, config: AssessConfig) -> Self {
        Self { backend, config }
    }

    /// Assesses the first polygon found in `raw` (a GeoJSON
    /// FeatureCollection, Feature, Polygon geometry, or raw ring list).
    ///
    /// # Errors
    ///
    /// Returns [`AssessError::InvalidInput`] without touching the
    /// backend when the geometry is unusable; otherwise the first hard
    /// backend failure or [`AssessError::Timeout`] when the configured
    /// deadline passes.
    pub async fn assess(&self, raw: &serde_json::Value) -> Result<AssessmentResult, AssessError> {
        let region = Region::from_geojson_value(raw)?;
        log::debug!(
            "ROI validated: {} ring(s), {} outer points",
            region.rings().len(),
            region.outer().len()
        );

        let deadline = Duration::from_secs(self.config.request_timeout_secs);
        match tokio::time::timeout(deadline, self.run(&region)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("assessment exceeded {}s deadline", deadline.as_secs());
                Err(AssessError::Timeout)
            }
        }
    }

    async fn run(&self, region: &Region) -> Result<AssessmentResult, AssessError> {
        let backend = self.backend.as_ref();
        let detector = strategy::select(self.config.deforestation.strategy);
        log::debug!("running change detection via {}", detector.id());

        let area = async {
            let square_meters = backend.area_square_meters(region).await?;
            Ok::<f64, AssessError>(round_hectares(square_meters / 10_000.0))
        };

        // No data dependencies between criteria — dispatch them all and
        // wait for completion or the first hard failure.
        let (area, deforestation, protected, land, built, altitude) = futures::try_join!(
            area,
            detector.detect(backend, region, &self.config.deforestation),
            checks::protected_area(backend, region, &self.config.protected_area),
            checks::on_land(backend, region, &self.config.on_land),
            checks::built_up(backend, region, &self.config.built_up),
            checks::elevation(backend, region, &self.config.elevation),
        )?;

        Ok(AssessmentResult {
            polygon: region.to_geojson(),
            area,
            deforestation: deforestation.into(),
            protected_area: protected.into(),
            on_land: land.into(),
            builtup_area: built.into(),
            altitude,
        })
    }
}

/// Hectares rounded to 2 decimal places, deterministic for a fixed ROI.
fn round_hectares(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
