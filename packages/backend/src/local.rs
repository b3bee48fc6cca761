//! In-memory compute engine evaluating expression graphs over registered
//! grid rasters and polygon datasets.
//!
//! This is the substitutable local engine: it implements the full
//! [`GeoBackend`] contract (temporal composites, pixel algebra, region
//! reducers, connected-component vectorization, geodesic area) without
//! any network dependency. Integration tests run the whole pipeline
//! against it; the forced-call counter lets tests assert that invalid
//! input never reaches the backend.
//!
//! Simplifications relative to a real raster service: all grids
//! registered for one backend must share the same geometry, `scale_m` is
//! ignored (grids are reduced at native resolution), and vectorized
//! components are emitted as their pixel-aligned bounding rectangles.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use geo::{Contains, GeodesicArea, Intersects, Point, Polygon};
use land_audit_geo::Region;

use crate::expr::{ImageCollection, ImageOp, TemporalReducer, VectorOp, VectorizeOptions};
use crate::{
    BackendError, Connectivity, GeoBackend, ImageExpr, ReduceOptions, Reducer, VectorExpr,
};

/// Geographic extent of a grid, in lon/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// A registered multi-band raster. Cells are row-major with row 0 at the
/// northern edge; `None` is no-data.
#[derive(Debug, Clone)]
pub struct GridRaster {
    bounds: GridBounds,
    width: usize,
    height: usize,
    bands: BTreeMap<String, Vec<Option<f64>>>,
}

impl GridRaster {
    /// Creates an empty raster with the given geometry.
    #[must_use]
    pub fn new(bounds: GridBounds, width: usize, height: usize) -> Self {
        Self {
            bounds,
            width,
            height,
            bands: BTreeMap::new(),
        }
    }

    /// Adds a band from explicit cells.
    ///
    /// # Panics
    ///
    /// Panics if `cells.len() != width * height` (fixture construction
    /// error).
    #[must_use]
    pub fn with_band(mut self, name: &str, cells: Vec<Option<f64>>) -> Self {
        assert_eq!(cells.len(), self.width * self.height, "band size mismatch");
        self.bands.insert(name.to_string(), cells);
        self
    }

    /// Adds a band where every cell holds the same value.
    #[must_use]
    pub fn with_uniform_band(self, name: &str, value: f64) -> Self {
        let cells = vec![Some(value); self.width * self.height];
        self.with_band(name, cells)
    }

    /// Adds a band where every cell is no-data.
    #[must_use]
    pub fn with_nodata_band(self, name: &str) -> Self {
        let cells = vec![None; self.width * self.height];
        self.with_band(name, cells)
    }

    fn band(&self, name: Option<&str>) -> Result<&[Option<f64>], BackendError> {
        match name {
            Some(n) => self
                .bands
                .get(n)
                .map(Vec::as_slice)
                .ok_or_else(|| BackendError::compute(format!("unknown band: {n}"))),
            None => match self.bands.values().next() {
                Some(cells) if self.bands.len() == 1 => Ok(cells.as_slice()),
                _ => Err(BackendError::compute(
                    "band selection required for multi-band raster",
                )),
            },
        }
    }
}

/// One evaluated single-band grid.
#[derive(Debug, Clone)]
struct Grid {
    bounds: GridBounds,
    width: usize,
    height: usize,
    cells: Vec<Option<f64>>,
}

impl Grid {
    fn same_geometry(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.bounds == other.bounds
    }

    fn cell_center(&self, x: usize, y: usize) -> (f64, f64) {
        let dx = (self.bounds.east - self.bounds.west) / self.width as f64;
        let dy = (self.bounds.north - self.bounds.south) / self.height as f64;
        let lng = (x as f64).mul_add(dx, self.bounds.west) + dx / 2.0;
        let lat = self.bounds.north - (y as f64).mul_add(dy, dy / 2.0);
        (lng, lat)
    }

    fn cell_rect(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<(f64, f64)> {
        let dx = (self.bounds.east - self.bounds.west) / self.width as f64;
        let dy = (self.bounds.north - self.bounds.south) / self.height as f64;
        let west = (x0 as f64).mul_add(dx, self.bounds.west);
        let east = ((x1 + 1) as f64).mul_add(dx, self.bounds.west);
        let north = (y0 as f64).mul_add(-dy, self.bounds.north);
        let south = ((y1 + 1) as f64).mul_add(-dy, self.bounds.north);
        vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]
    }

    fn map(self, f: impl Fn(f64) -> Option<f64>) -> Self {
        Self {
            cells: self.cells.iter().map(|c| c.and_then(&f)).collect(),
            ..self
        }
    }

    fn zip(self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, BackendError> {
        if !self.same_geometry(other) {
            return Err(BackendError::compute("grid geometry mismatch"));
        }
        let cells = self
            .cells
            .iter()
            .zip(&other.cells)
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        Ok(Self { cells, ..self })
    }
}

/// In-memory [`GeoBackend`] over registered datasets.
#[derive(Default)]
pub struct LocalBackend {
    rasters: BTreeMap<String, Vec<(Option<NaiveDate>, GridRaster)>>,
    features: BTreeMap<String, Vec<Polygon<f64>>>,
    forced_calls: AtomicUsize,
}

impl LocalBackend {
    /// Creates an engine with no registered datasets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single-image dataset.
    pub fn insert_image(&mut self, dataset: &str, raster: GridRaster) {
        self.rasters
            .insert(dataset.to_string(), vec![(None, raster)]);
    }

    /// Registers a time-stamped image collection.
    pub fn insert_collection(&mut self, dataset: &str, epochs: Vec<(NaiveDate, GridRaster)>) {
        self.rasters.insert(
            dataset.to_string(),
            epochs.into_iter().map(|(d, g)| (Some(d), g)).collect(),
        );
    }

    /// Registers a polygon feature dataset.
    pub fn insert_features(&mut self, dataset: &str, polygons: Vec<Polygon<f64>>) {
        self.features.insert(dataset.to_string(), polygons);
    }

    /// Number of forcing calls made so far (reduce, count, materialize,
    /// area). Lets tests assert that nothing was evaluated.
    #[must_use]
    pub fn forced_call_count(&self) -> usize {
        self.forced_calls.load(Ordering::Relaxed)
    }

    fn record_forced_call(&self) {
        self.forced_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn epochs(&self, dataset: &str) -> Result<&[(Option<NaiveDate>, GridRaster)], BackendError> {
        self.rasters
            .get(dataset)
            .map(Vec::as_slice)
            .ok_or_else(|| BackendError::compute(format!("unknown dataset: {dataset}")))
    }

    fn eval_image(&self, expr: &ImageExpr) -> Result<Grid, BackendError> {
        match expr.op.as_ref() {
            ImageOp::Source { dataset, band } => {
                let epochs = self.epochs(dataset)?;
                let (_, raster) = epochs
                    .first()
                    .ok_or_else(|| BackendError::compute(format!("empty dataset: {dataset}")))?;
                let cells = raster.band(band.as_deref())?.to_vec();
                Ok(Grid {
                    bounds: raster.bounds,
                    width: raster.width,
                    height: raster.height,
                    cells,
                })
            }
            ImageOp::Composite { query, reducer } => self.eval_composite(query, *reducer),
            ImageOp::GreaterThan { input, threshold } => {
                let t = *threshold;
                Ok(self
                    .eval_image(input)?
                    .map(|v| Some(f64::from(u8::from(v > t)))))
            }
            ImageOp::Equals { input, value } => {
                let target = *value;
                Ok(self
                    .eval_image(input)?
                    .map(|v| Some(f64::from(u8::from((v - target).abs() < f64::EPSILON)))))
            }
            ImageOp::And { left, right } => {
                let l = self.eval_image(left)?;
                let r = self.eval_image(right)?;
                l.zip(&r, |a, b| f64::from(u8::from(a != 0.0 && b != 0.0)))
            }
            ImageOp::Not { input } => Ok(self
                .eval_image(input)?
                .map(|v| Some(f64::from(u8::from(v == 0.0))))),
            ImageOp::Subtract { left, right } => {
                let l = self.eval_image(left)?;
                let r = self.eval_image(right)?;
                l.zip(&r, |a, b| a - b)
            }
            ImageOp::Abs { input } => Ok(self.eval_image(input)?.map(|v| Some(v.abs()))),
            ImageOp::Clip { input, region } => {
                let grid = self.eval_image(input)?;
                let polygon = region.to_geo_polygon();
                let mut cells = grid.cells.clone();
                for y in 0..grid.height {
                    for x in 0..grid.width {
                        let (lng, lat) = grid.cell_center(x, y);
                        if !polygon.contains(&Point::new(lng, lat)) {
                            cells[y * grid.width + x] = None;
                        }
                    }
                }
                Ok(Grid { cells, ..grid })
            }
            ImageOp::SelfMask { input } => Ok(self
                .eval_image(input)?
                .map(|v| if v == 0.0 { None } else { Some(v) })),
        }
    }

    fn eval_composite(
        &self,
        query: &ImageCollection,
        reducer: TemporalReducer,
    ) -> Result<Grid, BackendError> {
        let epochs = self.epochs(&query.dataset)?;
        let selected: Vec<&GridRaster> = epochs
            .iter()
            .filter(|(date, _)| match (date, query.start, query.end) {
                (Some(d), Some(start), Some(end)) => *d >= start && *d < end,
                // Undated images and unbounded queries always match.
                _ => true,
            })
            .map(|(_, raster)| raster)
            .collect();

        let Some(first) = selected.first() else {
            return Err(BackendError::compute(format!(
                "no images in collection {} after filtering",
                query.dataset
            )));
        };

        let band = query.band.as_deref();
        let layers: Vec<&[Option<f64>]> = selected
            .iter()
            .map(|raster| {
                if raster.bounds != first.bounds
                    || raster.width != first.width
                    || raster.height != first.height
                {
                    return Err(BackendError::compute("grid geometry mismatch in collection"));
                }
                raster.band(band)
            })
            .collect::<Result<_, _>>()?;

        let cells = (0..first.width * first.height)
            .map(|i| {
                let values: Vec<f64> = layers.iter().filter_map(|layer| layer[i]).collect();
                reduce_samples(&values, reducer)
            })
            .collect();

        Ok(Grid {
            bounds: first.bounds,
            width: first.width,
            height: first.height,
            cells,
        })
    }

    fn eval_vector(&self, expr: &VectorExpr) -> Result<Vec<geojson::Feature>, BackendError> {
        match expr.op.as_ref() {
            VectorOp::Vectorize {
                layer,
                region,
                opts,
            } => self.eval_vectorize(layer, region, *opts),
            VectorOp::Intersecting { dataset, region } => {
                let polygons = self.features.get(dataset).ok_or_else(|| {
                    BackendError::compute(format!("unknown feature dataset: {dataset}"))
                })?;
                let roi = region.to_geo_polygon();
                Ok(polygons
                    .iter()
                    .enumerate()
                    .filter(|(_, polygon)| polygon.intersects(&roi))
                    .map(|(index, polygon)| {
                        feature_from_value(
                            geojson::Value::from(polygon),
                            &[("index", serde_json::json!(index))],
                        )
                    })
                    .collect())
            }
        }
    }

    fn eval_vectorize(
        &self,
        layer: &ImageExpr,
        region: &Region,
        opts: VectorizeOptions,
    ) -> Result<Vec<geojson::Feature>, BackendError> {
        let grid = self.eval_image(layer)?;
        let roi = region.to_geo_polygon();

        let mut flagged: Vec<(usize, usize)> = Vec::new();
        let mut visited_pixels: u64 = 0;
        'scan: for y in 0..grid.height {
            for x in 0..grid.width {
                let (lng, lat) = grid.cell_center(x, y);
                if !roi.contains(&Point::new(lng, lat)) {
                    continue;
                }
                visited_pixels += 1;
                if visited_pixels > opts.max_pixels {
                    if opts.best_effort {
                        // Best-effort truncation: remaining pixels are
                        // skipped. A truncated-to-zero result is
                        // indistinguishable from a true negative for the
                        // caller; known precision limit.
                        log::warn!(
                            "vectorize exceeded max_pixels={}, truncating (best-effort)",
                            opts.max_pixels
                        );
                        break 'scan;
                    }
                    return Err(BackendError::compute(format!(
                        "vectorize exceeded max_pixels={} without best-effort",
                        opts.max_pixels
                    )));
                }
                if matches!(grid.cells[y * grid.width + x], Some(v) if v != 0.0) {
                    flagged.push((x, y));
                }
            }
        }

        let components = match opts.connectivity {
            Connectivity::None => flagged.iter().map(|&p| vec![p]).collect(),
            Connectivity::Four => connected_components(&flagged, false),
            Connectivity::Eight => connected_components(&flagged, true),
        };

        Ok(components
            .into_iter()
            .map(|component| {
                let x0 = component.iter().map(|&(x, _)| x).min().unwrap_or(0);
                let x1 = component.iter().map(|&(x, _)| x).max().unwrap_or(0);
                let y0 = component.iter().map(|&(_, y)| y).min().unwrap_or(0);
                let y1 = component.iter().map(|&(_, y)| y).max().unwrap_or(0);
                let ring = grid
                    .cell_rect(x0, y0, x1, y1)
                    .into_iter()
                    .map(|(lng, lat)| vec![lng, lat])
                    .collect();
                feature_from_value(
                    geojson::Value::Polygon(vec![ring]),
                    &[("count", serde_json::json!(component.len()))],
                )
            })
            .collect())
    }
}

#[async_trait]
impl GeoBackend for LocalBackend {
    async fn reduce(
        &self,
        layer: &ImageExpr,
        reducer: Reducer,
        region: &Region,
        opts: ReduceOptions,
    ) -> Result<Option<f64>, BackendError> {
        self.record_forced_call();
        let grid = self.eval_image(layer)?;
        let roi = region.to_geo_polygon();

        let mut candidates: Vec<usize> = Vec::new();
        for y in 0..grid.height {
            for x in 0..grid.width {
                let (lng, lat) = grid.cell_center(x, y);
                if roi.contains(&Point::new(lng, lat)) {
                    candidates.push(y * grid.width + x);
                }
            }
        }

        let total = candidates.len() as u64;
        if total > opts.max_pixels {
            if !opts.best_effort {
                return Err(BackendError::compute(format!(
                    "region covers {total} pixels, exceeding max_pixels={}",
                    opts.max_pixels
                )));
            }
            log::warn!(
                "reduce over {total} pixels exceeds max_pixels={}, approximating (best-effort)",
                opts.max_pixels
            );
            let stride = usize::try_from(total.div_ceil(opts.max_pixels)).unwrap_or(usize::MAX);
            candidates = candidates.into_iter().step_by(stride.max(1)).collect();
        }

        let values: Vec<f64> = candidates
            .into_iter()
            .filter_map(|i| grid.cells[i])
            .collect();

        Ok(match reducer {
            Reducer::Count => Some(values.len() as f64),
            Reducer::Mean if values.is_empty() => None,
            Reducer::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Reducer::Sum if values.is_empty() => None,
            Reducer::Sum => Some(values.iter().sum()),
            Reducer::Mode => mode(&values),
        })
    }

    async fn count_features(&self, collection: &VectorExpr) -> Result<u64, BackendError> {
        self.record_forced_call();
        Ok(self.eval_vector(collection)?.len() as u64)
    }

    async fn materialize(
        &self,
        collection: &VectorExpr,
    ) -> Result<geojson::FeatureCollection, BackendError> {
        self.record_forced_call();
        Ok(geojson::FeatureCollection {
            bbox: None,
            features: self.eval_vector(collection)?,
            foreign_members: None,
        })
    }

    async fn area_square_meters(&self, region: &Region) -> Result<f64, BackendError> {
        self.record_forced_call();
        Ok(region.to_geo_polygon().geodesic_area_unsigned())
    }
}

fn reduce_samples(values: &[f64], reducer: TemporalReducer) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match reducer {
        TemporalReducer::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                Some((sorted[mid - 1] + sorted[mid]) / 2.0)
            } else {
                Some(sorted[mid])
            }
        }
        TemporalReducer::Mode => mode(values),
        TemporalReducer::Mosaic => values.last().copied(),
        TemporalReducer::First => values.first().copied(),
    }
}

/// Most frequent value; ties break toward the smaller value so results
/// stay deterministic.
fn mode(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut best = sorted[0];
    let mut best_run = 0usize;
    let mut current = sorted[0];
    let mut run = 0usize;
    for &v in &sorted {
        if (v - current).abs() < f64::EPSILON {
            run += 1;
        } else {
            current = v;
            run = 1;
        }
        if run > best_run {
            best_run = run;
            best = current;
        }
    }
    Some(best)
}

fn connected_components(flagged: &[(usize, usize)], diagonal: bool) -> Vec<Vec<(usize, usize)>> {
    let set: HashSet<(usize, usize)> = flagged.iter().copied().collect();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut components = Vec::new();

    let orthogonal: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
    let diagonals: [(isize, isize); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

    for &start in flagged {
        if seen.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen.insert(start);

        while let Some((x, y)) = queue.pop_front() {
            component.push((x, y));
            let neighbors = orthogonal
                .iter()
                .chain(diagonal.then_some(diagonals.iter()).into_iter().flatten());
            for &(dx, dy) in neighbors {
                let nx = x.checked_add_signed(dx);
                let ny = y.checked_add_signed(dy);
                if let (Some(nx), Some(ny)) = (nx, ny)
                    && set.contains(&(nx, ny))
                    && seen.insert((nx, ny))
                {
                    queue.push_back((nx, ny));
                }
            }
        }
        components.push(component);
    }

    components
}

fn feature_from_value(
    geometry: geojson::Value,
    properties: &[(&str, serde_json::Value)],
) -> geojson::Feature {
    let mut map = serde_json::Map::new();
    for (key, value) in properties {
        map.insert((*key).to_string(), value.clone());
    }
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geometry)),
        id: None,
        properties: Some(map),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Image;

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

    fn uniform(value: f64) -> GridRaster {
        GridRaster::new(BOUNDS, 10, 10).with_uniform_band("b", value)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn mean_reduce_over_uniform_grid() {
        let mut backend = LocalBackend::new();
        backend.insert_image("dem", uniform(500.0));

        let layer = Image::load("dem").select("b");
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(value, Some(500.0));
    }

    #[tokio::test]
    async fn mean_reduce_over_nodata_returns_none() {
        let mut backend = LocalBackend::new();
        backend.insert_image("dem", GridRaster::new(BOUNDS, 10, 10).with_nodata_band("b"));

        let layer = Image::load("dem").select("b");
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn pixel_budget_without_best_effort_fails() {
        let mut backend = LocalBackend::new();
        backend.insert_image("dem", uniform(1.0));

        let layer = Image::load("dem").select("b");
        let opts = ReduceOptions {
            scale_m: 30.0,
            max_pixels: 10,
            best_effort: false,
        };
        let err = backend
            .reduce(&layer, Reducer::Mean, &roi(), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Compute { .. }));
    }

    #[tokio::test]
    async fn pixel_budget_with_best_effort_approximates() {
        let mut backend = LocalBackend::new();
        backend.insert_image("dem", uniform(7.0));

        let layer = Image::load("dem").select("b");
        let opts = ReduceOptions {
            scale_m: 30.0,
            max_pixels: 10,
            best_effort: true,
        };
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), opts)
            .await
            .unwrap();
        assert_eq!(value, Some(7.0));
    }

    #[tokio::test]
    async fn median_composite_suppresses_outliers() {
        let mut backend = LocalBackend::new();
        backend.insert_collection(
            "dw",
            vec![
                (date(2021, 6, 1), uniform(10.0)),
                (date(2022, 6, 1), uniform(90.0)),
                (date(2023, 6, 1), uniform(10.0)),
            ],
        );

        let layer = ImageCollection::load("dw")
            .filter_date(date(2021, 1, 1), date(2024, 1, 1))
            .select("b")
            .median();
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(value, Some(10.0));
    }

    #[tokio::test]
    async fn date_filter_is_half_open() {
        let mut backend = LocalBackend::new();
        backend.insert_collection(
            "dw",
            vec![
                (date(2021, 1, 1), uniform(1.0)),
                (date(2022, 1, 1), uniform(2.0)),
            ],
        );

        // End date excluded: only the 2021 epoch survives.
        let layer = ImageCollection::load("dw")
            .filter_date(date(2021, 1, 1), date(2022, 1, 1))
            .select("b")
            .mosaic();
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(value, Some(1.0));
    }

    #[tokio::test]
    async fn mode_composite_picks_most_frequent_class() {
        let mut backend = LocalBackend::new();
        backend.insert_collection(
            "lc",
            vec![
                (date(2021, 1, 2), uniform(4.0)),
                (date(2021, 6, 1), uniform(4.0)),
                (date(2021, 9, 1), uniform(7.0)),
            ],
        );

        let layer = ImageCollection::load("lc").select("b").mode();
        let value = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(value, Some(4.0));
    }

    #[tokio::test]
    async fn threshold_and_not_algebra() {
        let mut backend = LocalBackend::new();
        backend.insert_image("baseline", uniform(100.0));
        backend.insert_image("recent", uniform(100.0));

        let baseline = Image::load("baseline").select("b").greater_than(30.0);
        let recent = Image::load("recent").select("b").greater_than(30.0);
        let change = baseline.and(&recent.not());

        let flagged = backend
            .reduce(&change, Reducer::Sum, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(flagged, Some(0.0));
    }

    #[tokio::test]
    async fn clip_masks_outside_region() {
        let mut backend = LocalBackend::new();
        backend.insert_image("img", uniform(1.0));

        // Clip to the western half, then count valid pixels over the full
        // ROI.
        let half = Region::from_rings(vec![vec![
            (10.0, 0.0),
            (10.05, 0.0),
            (10.05, 0.1),
            (10.0, 0.1),
            (10.0, 0.0),
        ]])
        .unwrap();
        let layer = Image::load("img").select("b").clip(&half);
        let count = backend
            .reduce(&layer, Reducer::Count, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(count, Some(50.0));
    }

    #[tokio::test]
    async fn diagonal_pixels_merge_only_under_eight_connectivity() {
        let mut cells = vec![Some(0.0); 100];
        cells[3 * 10 + 3] = Some(1.0);
        cells[4 * 10 + 4] = Some(1.0);
        let mut backend = LocalBackend::new();
        backend.insert_image("mask", GridRaster::new(BOUNDS, 10, 10).with_band("b", cells));

        let layer = Image::load("mask").select("b").self_mask();
        let four = layer.vectorize(
            &roi(),
            VectorizeOptions {
                connectivity: Connectivity::Four,
                ..VectorizeOptions::default()
            },
        );
        let eight = layer.vectorize(
            &roi(),
            VectorizeOptions {
                connectivity: Connectivity::Eight,
                ..VectorizeOptions::default()
            },
        );

        assert_eq!(backend.count_features(&four).await.unwrap(), 2);
        assert_eq!(backend.count_features(&eight).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn vectorized_features_carry_pixel_counts() {
        let mut cells = vec![Some(0.0); 100];
        cells[5 * 10 + 5] = Some(1.0);
        cells[5 * 10 + 6] = Some(1.0);
        let mut backend = LocalBackend::new();
        backend.insert_image("mask", GridRaster::new(BOUNDS, 10, 10).with_band("b", cells));

        let layer = Image::load("mask").select("b").self_mask();
        let patches = layer.vectorize(
            &roi(),
            VectorizeOptions {
                connectivity: Connectivity::Four,
                ..VectorizeOptions::default()
            },
        );
        let collection = backend.materialize(&patches).await.unwrap();
        assert_eq!(collection.features.len(), 1);
        let count = collection.features[0]
            .properties
            .as_ref()
            .and_then(|p| p.get("count"))
            .and_then(serde_json::Value::as_u64);
        assert_eq!(count, Some(2));
    }

    #[tokio::test]
    async fn intersecting_filters_by_region() {
        let mut backend = LocalBackend::new();
        let inside = Polygon::new(
            geo::LineString::from(vec![
                (10.04, 0.04),
                (10.06, 0.04),
                (10.06, 0.06),
                (10.04, 0.06),
                (10.04, 0.04),
            ]),
            vec![],
        );
        let outside = Polygon::new(
            geo::LineString::from(vec![
                (50.0, 50.0),
                (50.1, 50.0),
                (50.1, 50.1),
                (50.0, 50.1),
                (50.0, 50.0),
            ]),
            vec![],
        );
        backend.insert_features("pa", vec![inside, outside]);

        let query = crate::FeatureDataset::load("pa").intersecting(&roi());
        assert_eq!(backend.count_features(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn area_positive_and_rotation_invariant() {
        let backend = LocalBackend::new();
        let base = backend.area_square_meters(&roi()).await.unwrap();
        assert!(base > 0.0);

        let rotated = Region::from_rings(vec![vec![
            (10.1, 0.0),
            (10.1, 0.1),
            (10.0, 0.1),
            (10.0, 0.0),
            (10.1, 0.0),
        ]])
        .unwrap();
        let other = backend.area_square_meters(&rotated).await.unwrap();
        assert!((base - other).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hole_area_subtracted_regardless_of_winding() {
        let backend = LocalBackend::new();
        let outer = vec![
            (10.0, 0.0),
            (10.1, 0.0),
            (10.1, 0.1),
            (10.0, 0.1),
            (10.0, 0.0),
        ];
        let hole_cw = vec![
            (10.04, 0.04),
            (10.04, 0.06),
            (10.06, 0.06),
            (10.06, 0.04),
            (10.04, 0.04),
        ];
        let mut hole_ccw = hole_cw.clone();
        hole_ccw.reverse();

        let full = backend.area_square_meters(&roi()).await.unwrap();
        let a = backend
            .area_square_meters(&Region::from_rings(vec![outer.clone(), hole_cw]).unwrap())
            .await
            .unwrap();
        let b = backend
            .area_square_meters(&Region::from_rings(vec![outer, hole_ccw]).unwrap())
            .await
            .unwrap();

        assert!(a < full);
        assert!((a - b).abs() < 1e-6);
    }

    #[tokio::test]
    async fn forced_calls_are_counted() {
        let mut backend = LocalBackend::new();
        backend.insert_image("img", uniform(1.0));
        assert_eq!(backend.forced_call_count(), 0);

        // Graph construction alone forces nothing.
        let layer = Image::load("img").select("b").greater_than(0.5).not();
        assert_eq!(backend.forced_call_count(), 0);

        backend
            .reduce(&layer, Reducer::Sum, &roi(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(backend.forced_call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_dataset_is_a_compute_error() {
        let backend = LocalBackend::new();
        let layer = Image::load("missing").select("b");
        let err = backend
            .reduce(&layer, Reducer::Mean, &roi(), ReduceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Compute { .. }));
    }
}
