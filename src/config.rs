//! Environment-driven configuration: processing graphs, default resolutions,
//! elevation source and the test-mode band folder.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_SAR_GRAPH: &str = "EOBANDS_SAR_GRAPH";
pub const ENV_DSPK_GRAPH: &str = "EOBANDS_DSPK_GRAPH";
pub const ENV_S3_GRAPH: &str = "EOBANDS_S3_GRAPH";
pub const ENV_SLSTR_GRAPH: &str = "EOBANDS_SLSTR_GRAPH";
pub const ENV_SAR_DEFAULT_RES: &str = "EOBANDS_SAR_DEFAULT_RES";
pub const ENV_S3_DEFAULT_RES: &str = "EOBANDS_S3_DEFAULT_RES";
pub const ENV_DEM_PATH: &str = "EOBANDS_DEM_PATH";
pub const ENV_GPT: &str = "EOBANDS_GPT";
pub const ENV_TEST_BAND_DIR: &str = "EOBANDS_TEST_BAND_DIR";

const GRAPH_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/graphs");

/// Which processing graph a geocoding job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphKind {
    /// Calibration and terrain correction of radar products.
    SarGeocoding,
    /// Speckle filtering of an already geocoded raster.
    Despeckle,
    /// Reprojection of Sentinel-3 OLCI radiances.
    S3Geocoding,
    /// Resampling of the SLSTR nadir grid followed by reprojection.
    SlstrGeocoding,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub sar_graph: Option<PathBuf>,
    pub dspk_graph: Option<PathBuf>,
    pub s3_graph: Option<PathBuf>,
    pub slstr_graph: Option<PathBuf>,
    pub sar_default_resolution: Option<f64>,
    pub s3_default_resolution: Option<f64>,
    pub dem_path: Option<PathBuf>,
    pub gpt: Option<PathBuf>,
    pub test_band_dir: Option<PathBuf>,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_f64(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Some(v),
        _ => {
            warn!("Ignoring {}={:?}: not a positive number", key, raw);
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sar_graph: env_path(ENV_SAR_GRAPH),
            dspk_graph: env_path(ENV_DSPK_GRAPH),
            s3_graph: env_path(ENV_S3_GRAPH),
            slstr_graph: env_path(ENV_SLSTR_GRAPH),
            sar_default_resolution: env_f64(ENV_SAR_DEFAULT_RES),
            s3_default_resolution: env_f64(ENV_S3_DEFAULT_RES),
            dem_path: env_path(ENV_DEM_PATH),
            gpt: env_path(ENV_GPT),
            test_band_dir: env_path(ENV_TEST_BAND_DIR),
        }
    }

    /// Graph to run for `kind`: the override when set, else the bundled one.
    pub fn graph(&self, kind: GraphKind) -> PathBuf {
        let (custom, file) = match kind {
            GraphKind::SarGeocoding => (&self.sar_graph, "sar_geocoding.xml"),
            GraphKind::Despeckle => (&self.dspk_graph, "sar_despeckle.xml"),
            GraphKind::S3Geocoding => (&self.s3_graph, "s3_olci_geocoding.xml"),
            GraphKind::SlstrGeocoding => (&self.slstr_graph, "s3_slstr_geocoding.xml"),
        };
        custom
            .clone()
            .unwrap_or_else(|| Path::new(GRAPH_DIR).join(file))
    }

    pub fn gpt_program(&self) -> String {
        self.gpt
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gpt".to_string())
    }
}
