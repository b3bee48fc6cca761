//! Assessment policy configuration.
//!
//! Every threshold, dataset identifier, and date window in the pipeline
//! is policy, not derived — the source datasets disagree on what counts
//! as "forest" (30% canopy cover vs. a 98.5% classifier probability), so
//! the constants live here and nowhere else. Defaults reproduce the
//! deployed Earth-Engine-backed configuration; a TOML file overrides any
//! subset of fields.

use std::path::Path;

use chrono::NaiveDate;
use land_audit_backend::Connectivity;
use serde::{Deserialize, Serialize};

use crate::checks::LandPolicy;
use crate::strategy::StrategyKind;

/// Errors while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`AssessConfig`].
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessConfig {
    /// Overall request deadline; exceeding it abandons in-flight backend
    /// calls and surfaces a timeout, never a partial result.
    pub request_timeout_secs: u64,
    /// Change-detection strategy and its dataset/threshold policy.
    pub deforestation: DeforestationConfig,
    /// Protected-area overlap check.
    pub protected_area: ProtectedAreaConfig,
    /// On-land/water classification check.
    pub on_land: OnLandConfig,
    /// Building-footprint overlap check.
    pub built_up: BuiltUpConfig,
    /// Elevation sampling.
    pub elevation: ElevationConfig,
}

impl AssessConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

impl Default for AssessConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            deforestation: DeforestationConfig::default(),
            protected_area: ProtectedAreaConfig::default(),
            on_land: OnLandConfig::default(),
            built_up: BuiltUpConfig::default(),
            elevation: ElevationConfig::default(),
        }
    }
}

/// Configuration shared by all change-detection strategies, plus the
/// per-strategy dataset policy blocks (only the block for the selected
/// strategy is consulted, but all carry defaults so switching strategies
/// is a one-line change).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeforestationConfig {
    /// Which change rule to run.
    pub strategy: StrategyKind,
    /// Ground sample distance for reductions and vectorization. 30 m
    /// matches the source datasets' native resolution.
    pub scale_m: f64,
    /// Backend pixel budget per forced call.
    pub max_pixels: u64,
    /// Adjacency rule when merging flagged pixels into patches.
    pub connectivity: Connectivity,
    /// Baseline forest observation (also the static forest reference for
    /// the magnitude and mode-shift rules).
    pub baseline: BaselineConfig,
    /// Recent forest observation for the threshold-difference rule.
    pub recent: RecentConfig,
    /// Policy for the magnitude-of-change rule.
    pub magnitude: MagnitudeConfig,
    /// Policy for the categorical-mode-shift rule.
    pub mode_shift: ModeShiftConfig,
}

impl Default for DeforestationConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ThresholdDifference,
            scale_m: 30.0,
            max_pixels: 1_000_000_000,
            connectivity: Connectivity::None,
            baseline: BaselineConfig::default(),
            recent: RecentConfig::default(),
            magnitude: MagnitudeConfig::default(),
            mode_shift: ModeShiftConfig::default(),
        }
    }
}

/// Fixed-year canopy-cover product used as the baseline observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Dataset identifier.
    pub dataset: String,
    /// Canopy-cover band.
    pub band: String,
    /// Cover percentage above which a pixel counts as forest.
    pub threshold: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            dataset: "UMD/hansen/global_forest_change_2023_v1_11".to_string(),
            band: "treecover2000".to_string(),
            threshold: 98.5,
        }
    }
}

/// Recent forest-presence composite for the threshold-difference rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    /// Image collection identifier.
    pub dataset: String,
    /// Forest-probability band.
    pub band: String,
    /// Composite window start (inclusive), `YYYY-MM-DD`.
    pub start: NaiveDate,
    /// Composite window end (exclusive), `YYYY-MM-DD`.
    pub end: NaiveDate,
    /// Probability above which a pixel counts as forest.
    pub threshold: f64,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            dataset: "GOOGLE/DYNAMICWORLD/V1".to_string(),
            band: "trees".to_string(),
            start: ymd(2021, 1, 1),
            end: ymd(2024, 12, 31),
            threshold: 98.5,
        }
    }
}

/// One spectral/radar band and its change-magnitude threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandThreshold {
    /// Band name.
    pub name: String,
    /// Magnitude above which the band flags change. Lowering a threshold
    /// never shrinks the flagged set.
    pub threshold: f64,
}

/// Policy for the magnitude-of-change rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnitudeConfig {
    /// Image collection providing the spectral/radar bands.
    pub dataset: String,
    /// Baseline composite window start (inclusive).
    pub baseline_start: NaiveDate,
    /// Baseline composite window end (exclusive).
    pub baseline_end: NaiveDate,
    /// Recent composite window start (inclusive).
    pub recent_start: NaiveDate,
    /// Recent composite window end (exclusive).
    pub recent_end: NaiveDate,
    /// Bands and per-band thresholds; at least one is required.
    pub bands: Vec<BandThreshold>,
    /// When `true`, *every* band must flag a pixel (AND, fewer false
    /// positives from any single sensor); when `false`, any band
    /// suffices (OR).
    pub require_all_bands: bool,
}

impl Default for MagnitudeConfig {
    fn default() -> Self {
        Self {
            dataset: "COPERNICUS/S1_GRD".to_string(),
            baseline_start: ymd(2020, 1, 1),
            baseline_end: ymd(2021, 1, 1),
            recent_start: ymd(2023, 1, 1),
            recent_end: ymd(2024, 1, 1),
            bands: vec![
                BandThreshold {
                    name: "VV".to_string(),
                    threshold: 3.0,
                },
                BandThreshold {
                    name: "VH".to_string(),
                    threshold: 3.0,
                },
            ],
            require_all_bands: true,
        }
    }
}

/// Policy for the categorical-mode-shift rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeShiftConfig {
    /// Image collection providing the classification band.
    pub dataset: String,
    /// Discrete land-cover class band.
    pub band: String,
    /// Before-period start (inclusive).
    pub start: NaiveDate,
    /// Boundary date splitting before/after periods.
    pub boundary: NaiveDate,
    /// After-period end (exclusive).
    pub end: NaiveDate,
    /// Class-difference magnitude above which a pixel flags change.
    pub shift_threshold: f64,
}

impl Default for ModeShiftConfig {
    fn default() -> Self {
        Self {
            dataset: "GOOGLE/DYNAMICWORLD/V1".to_string(),
            band: "label".to_string(),
            start: ymd(2019, 1, 1),
            boundary: ymd(2022, 1, 1),
            end: ymd(2024, 12, 31),
            shift_threshold: 0.5,
        }
    }
}

/// Protected-area overlap check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedAreaConfig {
    /// Global protected-areas polygon dataset.
    pub dataset: String,
}

impl Default for ProtectedAreaConfig {
    fn default() -> Self {
        Self {
            dataset: "WCMC/WDPA/current/polygons".to_string(),
        }
    }
}

/// On-land/water classification check. `dataset`/`band` belong to the
/// selected policy: a categorical land-cover raster for
/// [`LandPolicy::LandCoverMode`] (water/no-data sentinels apply), or a
/// water-occurrence raster (e.g. `JRC/GSW1_4/GlobalSurfaceWater`,
/// `occurrence`) for [`LandPolicy::WaterOccurrence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnLandConfig {
    /// Which of the two implementations to run. There is no silent
    /// fallback between them.
    pub policy: LandPolicy,
    /// Raster dataset for the selected policy.
    pub dataset: String,
    /// Band for the selected policy.
    pub band: String,
    /// Class code meaning water (mode policy).
    pub water_class: f64,
    /// Class code meaning no-data (mode policy).
    pub nodata_class: f64,
    /// Ground sample distance for the reduction.
    pub scale_m: f64,
}

impl Default for OnLandConfig {
    fn default() -> Self {
        Self {
            policy: LandPolicy::LandCoverMode,
            dataset: "ESA/WorldCover/v200".to_string(),
            band: "Map".to_string(),
            water_class: 80.0,
            nodata_class: 0.0,
            scale_m: 30.0,
        }
    }
}

/// Building-footprint overlap check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltUpConfig {
    /// Building-footprint polygon dataset.
    pub dataset: String,
}

impl Default for BuiltUpConfig {
    fn default() -> Self {
        Self {
            dataset: "GOOGLE/Research/open-buildings/v3/polygons".to_string(),
        }
    }
}

/// Elevation sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Digital elevation model dataset.
    pub dataset: String,
    /// Elevation band.
    pub band: String,
    /// Ground sample distance for the mean reduction.
    pub scale_m: f64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            dataset: "USGS/SRTMGL1_003".to_string(),
            band: "elevation".to_string(),
            scale_m: 90.0,
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid literal date")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_deployed_policy() {
        let config = AssessConfig::default();
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(
            config.deforestation.strategy,
            StrategyKind::ThresholdDifference
        );
        assert_eq!(config.deforestation.baseline.band, "treecover2000");
        assert!(
            (config.deforestation.scale_m - 30.0).abs() < f64::EPSILON,
            "vectorization is calibrated for 30 m source resolution"
        );
        assert_eq!(config.on_land.policy, LandPolicy::LandCoverMode);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml = r#"
            request_timeout_secs = 10

            [deforestation]
            strategy = "magnitude-of-change"
            connectivity = "eight"

            [deforestation.baseline]
            threshold = 30.0

            [on_land]
            policy = "water-occurrence"
            dataset = "JRC/GSW1_4/GlobalSurfaceWater"
            band = "occurrence"
        "#;
        let config: AssessConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(
            config.deforestation.strategy,
            StrategyKind::MagnitudeOfChange
        );
        assert!((config.deforestation.baseline.threshold - 30.0).abs() < f64::EPSILON);
        // Untouched fields keep their defaults.
        assert_eq!(config.deforestation.recent.band, "trees");
        assert_eq!(config.protected_area.dataset, "WCMC/WDPA/current/polygons");
        assert_eq!(config.on_land.policy, LandPolicy::WaterOccurrence);
        assert_eq!(config.on_land.band, "occurrence");
    }

    #[test]
    fn dates_parse_from_strings() {
        let toml = r#"
            [deforestation.recent]
            start = "2022-06-01"
            end = "2023-06-01"
        "#;
        let config: AssessConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.deforestation.recent.start, ymd(2022, 6, 1));
        assert_eq!(config.deforestation.recent.end, ymd(2023, 6, 1));
    }
}
