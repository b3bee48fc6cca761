#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Narrow adapter over the external geospatial compute service.
//!
//! All raster and vector algebra is *lazy*: chaining operations on
//! [`ImageExpr`] and [`VectorExpr`] only builds a local expression graph.
//! The graph is forced through the [`GeoBackend`] trait, whose four
//! methods ([`GeoBackend::reduce`], [`GeoBackend::count_features`],
//! [`GeoBackend::materialize`], [`GeoBackend::area_square_meters`]) are
//! the only suspension points in a pipeline run. Two engines are
//! provided: [`remote::RemoteBackend`] (HTTP, production) and
//! [`local::LocalBackend`] (in-memory grids, tests and offline runs).
//! Anything satisfying [`GeoBackend`] is substitutable without touching
//! the pipeline.

pub mod expr;
pub mod local;
pub mod remote;

use async_trait::async_trait;
use land_audit_geo::Region;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use expr::{FeatureDataset, Image, ImageCollection, ImageExpr, VectorExpr, VectorizeOptions};

/// Errors surfaced by a compute backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The service could not be reached (network, DNS, TLS, auth
    /// transport failures). Fatal for the request; never retried here.
    #[error("backend unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    /// The service rejected the query (e.g. pixel budget exceeded
    /// without best-effort, unknown dataset, mismatched grids).
    #[error("backend compute error: {message}")]
    Compute {
        /// The service's description of the rejection.
        message: String,
    },

    /// The service replied with something this adapter cannot decode.
    #[error("backend protocol error: {message}")]
    Protocol {
        /// What was malformed about the reply.
        message: String,
    },
}

impl BackendError {
    pub(crate) fn compute(message: impl Into<String>) -> Self {
        Self::Compute {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Region-reduction aggregations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Reducer {
    /// Arithmetic mean of valid pixels.
    Mean,
    /// Most frequent discrete value.
    Mode,
    /// Sum of valid pixels.
    Sum,
    /// Count of valid pixels.
    Count,
}

/// Pixel-adjacency rule for merging flagged pixels into vector features.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Connectivity {
    /// Every flagged pixel becomes its own feature.
    None,
    /// Edge-adjacent pixels merge (4-neighbor).
    Four,
    /// Edge- and corner-adjacent pixels merge (8-neighbor).
    Eight,
}

/// Cost bounds for a forced region reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceOptions {
    /// Ground sample distance in meters.
    pub scale_m: f64,
    /// Upper bound on pixels the backend may visit.
    pub max_pixels: u64,
    /// When `true`, exceeding `max_pixels` degrades to an approximation
    /// (a result-quality caveat) instead of failing the query.
    pub best_effort: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            scale_m: 30.0,
            max_pixels: 1_000_000_000,
            best_effort: true,
        }
    }
}

/// Forcing interface to a geospatial compute engine.
///
/// These four calls are the only points where a deferred expression graph
/// is evaluated; everything upstream of them is cheap local graph
/// construction. Implementations must be shareable across concurrent
/// criterion evaluations within one request.
#[async_trait]
pub trait GeoBackend: Send + Sync {
    /// Reduces `layer` over `region` with the given aggregation.
    ///
    /// Returns `None` when the region contains no valid pixels (no-data),
    /// which is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the service is unreachable or rejects
    /// the query.
    async fn reduce(
        &self,
        layer: &ImageExpr,
        reducer: Reducer,
        region: &Region,
        opts: ReduceOptions,
    ) -> Result<Option<f64>, BackendError>;

    /// Counts the features a vector expression evaluates to.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the service is unreachable or rejects
    /// the query.
    async fn count_features(&self, collection: &VectorExpr) -> Result<u64, BackendError>;

    /// Fully evaluates a vector expression into GeoJSON features.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the service is unreachable or rejects
    /// the query.
    async fn materialize(
        &self,
        collection: &VectorExpr,
    ) -> Result<geojson::FeatureCollection, BackendError>;

    /// Geodesic area of the region in square meters, holes subtracted.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the service is unreachable or rejects
    /// the query.
    async fn area_square_meters(&self, region: &Region) -> Result<f64, BackendError>;
}
