//! HTTP adapter for a hosted raster/vector compute service.
//!
//! Each forcing call serializes the deferred expression graph to JSON
//! and POSTs it to the service's `compute` endpoint in a single round
//! trip. The adapter is constructed already authenticated (bearer
//! token); acquiring credentials is the host's job.

use land_audit_geo::Region;
use serde_json::{Value, json};

use crate::expr::{ImageOp, VectorOp};
use crate::{BackendError, GeoBackend, ImageExpr, ReduceOptions, Reducer, VectorExpr};
use async_trait::async_trait;

/// [`GeoBackend`] implementation backed by a remote compute service.
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteBackend {
    /// Creates an adapter for the service at `base_url` using the given
    /// bearer token.
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// POSTs one compute request and extracts its `value` field.
    async fn compute(&self, body: Value) -> Result<Value, BackendError> {
        let url = format!("{}/v1/compute", self.base_url);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let reply: Value = response.json().await?;

        if let Some(error) = reply.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified service error");
            return Err(BackendError::compute(message));
        }
        if !status.is_success() {
            return Err(BackendError::compute(format!(
                "service returned HTTP {status}"
            )));
        }

        reply
            .get("value")
            .cloned()
            .ok_or_else(|| BackendError::protocol("reply has no `value` field"))
    }
}

#[async_trait]
impl GeoBackend for RemoteBackend {
    async fn reduce(
        &self,
        layer: &ImageExpr,
        reducer: Reducer,
        region: &Region,
        opts: ReduceOptions,
    ) -> Result<Option<f64>, BackendError> {
        let value = self
            .compute(json!({
                "expression": encode_image(layer),
                "output": {
                    "kind": "reduce",
                    "reducer": reducer.as_ref(),
                    "region": encode_region(region),
                    "scale": opts.scale_m,
                    "maxPixels": opts.max_pixels,
                    "bestEffort": opts.best_effort,
                },
            }))
            .await?;

        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            other => Err(BackendError::protocol(format!(
                "expected scalar reduce value, got {other}"
            ))),
        }
    }

    async fn count_features(&self, collection: &VectorExpr) -> Result<u64, BackendError> {
        let value = self
            .compute(json!({
                "expression": encode_vector(collection),
                "output": { "kind": "count" },
            }))
            .await?;

        value
            .as_u64()
            .ok_or_else(|| BackendError::protocol(format!("expected feature count, got {value}")))
    }

    async fn materialize(
        &self,
        collection: &VectorExpr,
    ) -> Result<geojson::FeatureCollection, BackendError> {
        let value = self
            .compute(json!({
                "expression": encode_vector(collection),
                "output": { "kind": "features" },
            }))
            .await?;

        serde_json::from_value(value)
            .map_err(|e| BackendError::protocol(format!("invalid feature collection: {e}")))
    }

    async fn area_square_meters(&self, region: &Region) -> Result<f64, BackendError> {
        let value = self
            .compute(json!({
                "output": { "kind": "area", "region": encode_region(region) },
            }))
            .await?;

        value
            .as_f64()
            .ok_or_else(|| BackendError::protocol(format!("expected area scalar, got {value}")))
    }
}

fn encode_region(region: &Region) -> Value {
    serde_json::to_value(region.to_geojson()).unwrap_or(Value::Null)
}

fn encode_image(expr: &ImageExpr) -> Value {
    match expr.op.as_ref() {
        ImageOp::Source { dataset, band } => json!({
            "op": "image",
            "dataset": dataset,
            "band": band,
        }),
        ImageOp::Composite { query, reducer } => json!({
            "op": "composite",
            "dataset": query.dataset,
            "reducer": reducer.as_str(),
            "start": query.start.map(|d| d.to_string()),
            "end": query.end.map(|d| d.to_string()),
            "band": query.band,
            "bounds": query.bounds.as_ref().map(encode_region),
        }),
        ImageOp::GreaterThan { input, threshold } => json!({
            "op": "gt",
            "input": encode_image(input),
            "threshold": threshold,
        }),
        ImageOp::Equals { input, value } => json!({
            "op": "eq",
            "input": encode_image(input),
            "value": value,
        }),
        ImageOp::And { left, right } => json!({
            "op": "and",
            "left": encode_image(left),
            "right": encode_image(right),
        }),
        ImageOp::Not { input } => json!({
            "op": "not",
            "input": encode_image(input),
        }),
        ImageOp::Subtract { left, right } => json!({
            "op": "subtract",
            "left": encode_image(left),
            "right": encode_image(right),
        }),
        ImageOp::Abs { input } => json!({
            "op": "abs",
            "input": encode_image(input),
        }),
        ImageOp::Clip { input, region } => json!({
            "op": "clip",
            "input": encode_image(input),
            "region": encode_region(region),
        }),
        ImageOp::SelfMask { input } => json!({
            "op": "selfMask",
            "input": encode_image(input),
        }),
    }
}

fn encode_vector(expr: &VectorExpr) -> Value {
    match expr.op.as_ref() {
        VectorOp::Vectorize {
            layer,
            region,
            opts,
        } => json!({
            "op": "vectorize",
            "input": encode_image(layer),
            "region": encode_region(region),
            "scale": opts.scale_m,
            "connectivity": opts.connectivity.as_ref(),
            "maxPixels": opts.max_pixels,
            "bestEffort": opts.best_effort,
        }),
        VectorOp::Intersecting { dataset, region } => json!({
            "op": "intersecting",
            "dataset": dataset,
            "region": encode_region(region),
        }),
    }
}
