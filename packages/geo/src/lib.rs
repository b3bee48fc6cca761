#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! ROI (region of interest) polygon representation and validation.
//!
//! A [`Region`] is the user-submitted polygon under assessment: one outer
//! ring plus optional holes, each ring a closed sequence of (longitude,
//! latitude) pairs. Parsing accepts the shapes the HTTP layer forwards —
//! a GeoJSON `FeatureCollection` (first feature's geometry), a bare
//! `Feature`, a bare `Polygon` geometry, or a raw ring list. Validation
//! here is structural only; self-intersection is left to the backend.

use geo::{LineString, Polygon};
use serde_json::Value;

/// A closed linear ring of (longitude, latitude) pairs, first == last.
pub type Ring = Vec<(f64, f64)>;

/// Errors produced while parsing or validating an ROI.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// The GeoJSON `FeatureCollection` has no features.
    #[error("GeoJSON input has no features")]
    NoFeatures,

    /// The first feature carries no geometry.
    #[error("feature has no geometry")]
    MissingGeometry,

    /// The geometry is not a polygon.
    #[error("unsupported geometry type: {found}")]
    UnsupportedGeometry {
        /// The `type` value that was encountered.
        found: String,
    },

    /// A ring fails structural validation.
    #[error("malformed ring: {message}")]
    MalformedRing {
        /// Description of what is wrong with the ring.
        message: String,
    },
}

/// One polygon: an outer ring plus optional hole rings.
///
/// Immutable once constructed; every ring is validated at construction
/// time (closure, minimum point count, finite coordinates, non-zero outer
/// area).
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    rings: Vec<Ring>,
}

impl Region {
    /// Builds a region from raw rings (outer first, then holes).
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if there is no outer ring, any ring is open,
    /// has fewer than 4 points, or contains non-finite coordinates, or if
    /// the outer ring has zero signed area.
    pub fn from_rings(rings: Vec<Ring>) -> Result<Self, GeoError> {
        let Some(outer) = rings.first() else {
            return Err(GeoError::MalformedRing {
                message: "polygon has no rings".to_string(),
            });
        };

        for ring in &rings {
            validate_ring(ring)?;
        }

        if ring_area(outer).abs() <= f64::EPSILON {
            return Err(GeoError::MalformedRing {
                message: "outer ring has zero area".to_string(),
            });
        }

        Ok(Self { rings })
    }

    /// Extracts a region from whatever GeoJSON-ish value the transport
    /// layer hands over.
    ///
    /// Accepted shapes, in order of preference: a `FeatureCollection`
    /// (takes `features[0].geometry`), a bare `Feature`, a bare `Polygon`
    /// geometry, or a plain ring coordinate array.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if no geometry can be located or the located
    /// geometry is not a valid polygon.
    pub fn from_geojson_value(raw: &Value) -> Result<Self, GeoError> {
        if let Some(features) = raw.get("features") {
            let first = features
                .as_array()
                .and_then(|f| f.first())
                .ok_or(GeoError::NoFeatures)?;
            let geometry = first.get("geometry").ok_or(GeoError::MissingGeometry)?;
            return Self::from_polygon_geometry(geometry);
        }

        if let Some(geometry) = raw.get("geometry") {
            return Self::from_polygon_geometry(geometry);
        }

        if raw.get("type").is_some() {
            return Self::from_polygon_geometry(raw);
        }

        if raw.is_array() {
            return Self::from_rings(parse_rings(raw)?);
        }

        Err(GeoError::MissingGeometry)
    }

    /// All rings, outer ring first.
    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    /// The outer ring.
    #[must_use]
    pub fn outer(&self) -> &Ring {
        &self.rings[0]
    }

    /// Hole rings (possibly empty).
    #[must_use]
    pub fn holes(&self) -> &[Ring] {
        &self.rings[1..]
    }

    /// Converts to a [`geo::Polygon`] for geometric predicates.
    #[must_use]
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let exterior = LineString::from(self.rings[0].clone());
        let interiors = self.rings[1..]
            .iter()
            .map(|ring| LineString::from(ring.clone()))
            .collect();
        Polygon::new(exterior, interiors)
    }

    /// Converts to a GeoJSON `Polygon` geometry for echoing back to the
    /// caller.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::Geometry {
        let coordinates = self
            .rings
            .iter()
            .map(|ring| ring.iter().map(|&(lng, lat)| vec![lng, lat]).collect())
            .collect();
        geojson::Geometry::new(geojson::Value::Polygon(coordinates))
    }

    fn from_polygon_geometry(geometry: &Value) -> Result<Self, GeoError> {
        let geometry_type = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeoError::MissingGeometry)?;

        if geometry_type != "Polygon" {
            return Err(GeoError::UnsupportedGeometry {
                found: geometry_type.to_string(),
            });
        }

        let coordinates = geometry
            .get("coordinates")
            .ok_or(GeoError::MissingGeometry)?;
        Self::from_rings(parse_rings(coordinates)?)
    }
}

/// Planar signed area of a ring (shoelace formula). Positive for
/// counter-clockwise winding. Used only for the zero-area structural
/// check — authoritative areas are geodesic and come from the backend.
#[must_use]
pub fn ring_area(ring: &[(f64, f64)]) -> f64 {
    let mut sum = 0.0;
    for window in ring.windows(2) {
        let (x1, y1) = window[0];
        let (x2, y2) = window[1];
        sum += x1 * y2 - x2 * y1;
    }
    sum / 2.0
}

fn validate_ring(ring: &Ring) -> Result<(), GeoError> {
    if ring.len() < 4 {
        return Err(GeoError::MalformedRing {
            message: format!("ring has {} points, need at least 4", ring.len()),
        });
    }

    if ring.first() != ring.last() {
        return Err(GeoError::MalformedRing {
            message: "ring is not closed (first point != last point)".to_string(),
        });
    }

    for &(lng, lat) in ring {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(GeoError::MalformedRing {
                message: "ring contains non-finite coordinates".to_string(),
            });
        }
    }

    Ok(())
}

fn parse_rings(coordinates: &Value) -> Result<Vec<Ring>, GeoError> {
    let rings = coordinates
        .as_array()
        .ok_or_else(|| GeoError::MalformedRing {
            message: "coordinates is not an array of rings".to_string(),
        })?;

    rings
        .iter()
        .map(|ring| {
            let points = ring.as_array().ok_or_else(|| GeoError::MalformedRing {
                message: "ring is not an array of points".to_string(),
            })?;
            points
                .iter()
                .map(|point| {
                    let pair = point.as_array().ok_or_else(|| GeoError::MalformedRing {
                        message: "point is not a [lng, lat] pair".to_string(),
                    })?;
                    let (Some(lng), Some(lat)) = (
                        pair.first().and_then(Value::as_f64),
                        pair.get(1).and_then(Value::as_f64),
                    ) else {
                        return Err(GeoError::MalformedRing {
                            message: "point coordinates are not numbers".to_string(),
                        });
                    };
                    Ok((lng, lat))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square() -> Ring {
        vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]
    }

    #[test]
    fn area_invariant_under_start_point_rotation() {
        let ring = square();
        let base = ring_area(&ring).abs();

        // Rotate the start point through every vertex; the closed ring is
        // rebuilt each time so first == last still holds.
        for start in 1..ring.len() - 1 {
            let mut rotated: Ring = ring[start..ring.len() - 1]
                .iter()
                .chain(ring[..start].iter())
                .copied()
                .collect();
            rotated.push(rotated[0]);
            assert!((ring_area(&rotated).abs() - base).abs() < 1e-12);
        }
    }

    #[test]
    fn area_invariant_under_winding_reversal() {
        let ring = square();
        let mut reversed = ring.clone();
        reversed.reverse();
        assert!((ring_area(&ring).abs() - ring_area(&reversed).abs()).abs() < 1e-12);
        assert!((ring_area(&ring) + ring_area(&reversed)).abs() < 1e-12);
    }

    #[test]
    fn parses_feature_collection() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
                },
                "properties": {}
            }]
        });
        let region = Region::from_geojson_value(&raw).unwrap();
        assert_eq!(region.rings().len(), 1);
        assert_eq!(region.outer().len(), 5);
    }

    #[test]
    fn parses_bare_polygon_geometry() {
        let raw = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
        });
        assert!(Region::from_geojson_value(&raw).is_ok());
    }

    #[test]
    fn parses_raw_ring_list() {
        let raw = json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]);
        assert!(Region::from_geojson_value(&raw).is_ok());
    }

    #[test]
    fn rejects_empty_features() {
        let raw = json!({ "type": "FeatureCollection", "features": [] });
        assert!(matches!(
            Region::from_geojson_value(&raw),
            Err(GeoError::NoFeatures)
        ));
    }

    #[test]
    fn rejects_missing_features_key() {
        let raw = json!({ "hello": "world" });
        assert!(matches!(
            Region::from_geojson_value(&raw),
            Err(GeoError::MissingGeometry)
        ));
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let raw = json!({ "type": "Point", "coordinates": [0.0, 0.0] });
        assert!(matches!(
            Region::from_geojson_value(&raw),
            Err(GeoError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn rejects_open_ring() {
        let rings = vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]];
        assert!(matches!(
            Region::from_rings(rings),
            Err(GeoError::MalformedRing { .. })
        ));
    }

    #[test]
    fn rejects_degenerate_ring() {
        let rings = vec![vec![(0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]];
        assert!(matches!(
            Region::from_rings(rings),
            Err(GeoError::MalformedRing { .. })
        ));
    }

    #[test]
    fn accepts_polygon_with_hole() {
        let rings = vec![
            vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)],
            vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)],
        ];
        let region = Region::from_rings(rings).unwrap();
        assert_eq!(region.holes().len(), 1);
    }
}
