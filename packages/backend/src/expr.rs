//! Deferred raster/vector expression graphs.
//!
//! Handles are immutable: every transform returns a *new* handle sharing
//! structure with its inputs via [`Arc`]. Nothing here talks to the
//! network — evaluation happens only when a graph is handed to a
//! [`crate::GeoBackend`] forcing call.

use std::sync::Arc;

use chrono::NaiveDate;
use land_audit_geo::Region;

use crate::Connectivity;

/// Temporal aggregation collapsing an image collection into one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TemporalReducer {
    /// Per-pixel median (continuous reflectance bands).
    Median,
    /// Per-pixel most frequent value (discrete classifications).
    Mode,
    /// Last valid observation on top.
    Mosaic,
    /// First valid observation.
    First,
}

impl TemporalReducer {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Mosaic => "mosaic",
            Self::First => "first",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ImageOp {
    Source {
        dataset: String,
        band: Option<String>,
    },
    Composite {
        query: ImageCollection,
        reducer: TemporalReducer,
    },
    GreaterThan {
        input: ImageExpr,
        threshold: f64,
    },
    Equals {
        input: ImageExpr,
        value: f64,
    },
    And {
        left: ImageExpr,
        right: ImageExpr,
    },
    Not {
        input: ImageExpr,
    },
    Subtract {
        left: ImageExpr,
        right: ImageExpr,
    },
    Abs {
        input: ImageExpr,
    },
    Clip {
        input: ImageExpr,
        region: Region,
    },
    SelfMask {
        input: ImageExpr,
    },
}

/// Opaque handle to a deferred single-band raster computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageExpr {
    pub(crate) op: Arc<ImageOp>,
}

impl ImageExpr {
    fn wrap(op: ImageOp) -> Self {
        Self { op: Arc::new(op) }
    }

    /// Boolean raster: 1 where the pixel value exceeds `threshold`.
    #[must_use]
    pub fn greater_than(&self, threshold: f64) -> Self {
        Self::wrap(ImageOp::GreaterThan {
            input: self.clone(),
            threshold,
        })
    }

    /// Boolean raster: 1 where the pixel value equals `value`.
    #[must_use]
    pub fn equals(&self, value: f64) -> Self {
        Self::wrap(ImageOp::Equals {
            input: self.clone(),
            value,
        })
    }

    /// Pixel-wise logical AND (non-zero is true).
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        Self::wrap(ImageOp::And {
            left: self.clone(),
            right: other.clone(),
        })
    }

    /// Pixel-wise logical NOT.
    #[must_use]
    pub fn not(&self) -> Self {
        Self::wrap(ImageOp::Not {
            input: self.clone(),
        })
    }

    /// Pixel-wise subtraction (`self - other`).
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        Self::wrap(ImageOp::Subtract {
            left: self.clone(),
            right: other.clone(),
        })
    }

    /// Pixel-wise absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self::wrap(ImageOp::Abs {
            input: self.clone(),
        })
    }

    /// Masks pixels outside the region to no-data.
    #[must_use]
    pub fn clip(&self, region: &Region) -> Self {
        Self::wrap(ImageOp::Clip {
            input: self.clone(),
            region: region.clone(),
        })
    }

    /// Masks pixels to no-data wherever this raster is itself zero or
    /// no-data. Standard step before vectorizing a boolean mask so only
    /// flagged pixels produce features.
    #[must_use]
    pub fn self_mask(&self) -> Self {
        Self::wrap(ImageOp::SelfMask {
            input: self.clone(),
        })
    }

    /// Defers vectorization of flagged (non-zero, valid) pixels into
    /// polygons under the given adjacency rule.
    #[must_use]
    pub fn vectorize(&self, region: &Region, opts: VectorizeOptions) -> VectorExpr {
        VectorExpr {
            op: Arc::new(VectorOp::Vectorize {
                layer: self.clone(),
                region: region.clone(),
                opts,
            }),
        }
    }
}

/// Entry point for single-image datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    dataset: String,
}

impl Image {
    /// References a dataset holding one image (e.g. a fixed-year canopy
    /// cover product).
    #[must_use]
    pub fn load(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
        }
    }

    /// Selects one band, producing a raster handle.
    #[must_use]
    pub fn select(&self, band: &str) -> ImageExpr {
        ImageExpr::wrap(ImageOp::Source {
            dataset: self.dataset.clone(),
            band: Some(band.to_string()),
        })
    }
}

/// Chainable query over a time-stamped image collection.
///
/// `filter_date` bounds are half-open: `start <= t < end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection {
    pub(crate) dataset: String,
    pub(crate) start: Option<NaiveDate>,
    pub(crate) end: Option<NaiveDate>,
    pub(crate) bounds: Option<Region>,
    pub(crate) band: Option<String>,
}

impl ImageCollection {
    /// References a time-stamped image collection dataset.
    #[must_use]
    pub fn load(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            start: None,
            end: None,
            bounds: None,
            band: None,
        }
    }

    /// Keeps images with `start <= timestamp < end`.
    #[must_use]
    pub fn filter_date(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Keeps images intersecting the region.
    #[must_use]
    pub fn filter_bounds(mut self, region: &Region) -> Self {
        self.bounds = Some(region.clone());
        self
    }

    /// Selects one band.
    #[must_use]
    pub fn select(mut self, band: &str) -> Self {
        self.band = Some(band.to_string());
        self
    }

    /// Per-pixel median composite.
    #[must_use]
    pub fn median(self) -> ImageExpr {
        self.composite(TemporalReducer::Median)
    }

    /// Per-pixel most-frequent-value composite.
    #[must_use]
    pub fn mode(self) -> ImageExpr {
        self.composite(TemporalReducer::Mode)
    }

    /// Last-on-top mosaic.
    #[must_use]
    pub fn mosaic(self) -> ImageExpr {
        self.composite(TemporalReducer::Mosaic)
    }

    /// First valid observation.
    #[must_use]
    pub fn first(self) -> ImageExpr {
        self.composite(TemporalReducer::First)
    }

    fn composite(self, reducer: TemporalReducer) -> ImageExpr {
        ImageExpr::wrap(ImageOp::Composite {
            query: self,
            reducer,
        })
    }
}

/// Cost and adjacency parameters for a deferred vectorization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorizeOptions {
    /// Ground sample distance in meters.
    pub scale_m: f64,
    /// Adjacency rule for merging flagged pixels.
    pub connectivity: Connectivity,
    /// Upper bound on pixels the backend may visit.
    pub max_pixels: u64,
    /// Degrade to an approximation instead of failing when `max_pixels`
    /// is exceeded.
    pub best_effort: bool,
}

impl Default for VectorizeOptions {
    fn default() -> Self {
        Self {
            scale_m: 30.0,
            connectivity: Connectivity::None,
            max_pixels: 1_000_000_000,
            best_effort: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VectorOp {
    Vectorize {
        layer: ImageExpr,
        region: Region,
        opts: VectorizeOptions,
    },
    Intersecting {
        dataset: String,
        region: Region,
    },
}

/// Opaque handle to a deferred vector feature collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorExpr {
    pub(crate) op: Arc<VectorOp>,
}

/// Entry point for polygon feature datasets (protected areas, building
/// footprints).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDataset {
    dataset: String,
}

impl FeatureDataset {
    /// References a polygon feature dataset.
    #[must_use]
    pub fn load(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
        }
    }

    /// Defers filtering to features intersecting the region.
    #[must_use]
    pub fn intersecting(&self, region: &Region) -> VectorExpr {
        VectorExpr {
            op: Arc::new(VectorOp::Intersecting {
                dataset: self.dataset.clone(),
                region: region.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        Region::from_rings(vec![vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ]])
        .unwrap()
    }

    #[test]
    fn transforms_share_structure() {
        let base = Image::load("canopy/2000").select("treecover2000");
        let mask = base.greater_than(30.0);

        // The original handle is untouched; the new one references it.
        assert_ne!(base, mask);
        assert_eq!(base, Image::load("canopy/2000").select("treecover2000"));
    }

    #[test]
    fn identical_chains_compare_equal() {
        let roi = region();
        let a = Image::load("d").select("b").greater_than(1.0).clip(&roi);
        let b = Image::load("d").select("b").greater_than(1.0).clip(&roi);
        assert_eq!(a, b);
    }

    #[test]
    fn collection_builder_accumulates_filters() {
        let roi = region();
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let query = ImageCollection::load("dw/v1")
            .filter_date(start, end)
            .filter_bounds(&roi)
            .select("trees");

        assert_eq!(query.start, Some(start));
        assert_eq!(query.end, Some(end));
        assert_eq!(query.band.as_deref(), Some("trees"));
        assert!(query.bounds.is_some());
    }
}
