use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to load: bands and indices by canonical name, and the target grid.
///
/// `resolution` wins over `size`; with neither, the product default is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub bands: Vec<String>,
    pub resolution: Option<f64>,
    /// Target (width, height) in pixels.
    pub size: Option<(usize, usize)>,
}

impl LoadRequest {
    pub fn new<S: AsRef<str>>(bands: &[S]) -> Self {
        Self {
            bands: bands.iter().map(|b| b.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Reject non-positive resolutions and empty sizes.
    pub fn validate(&self) -> Result<()> {
        if let Some(res) = self.resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(Error::InvalidRequest(format!("resolution must be positive, got {res}")));
            }
        }
        if let Some((w, h)) = self.size {
            if w == 0 || h == 0 {
                return Err(Error::InvalidRequest(format!("size must be non-empty, got {w}x{h}")));
            }
        }
        Ok(())
    }
}

/// A load written out as one multi-band raster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackRequest {
    pub load: LoadRequest,
    /// Written when set, otherwise the stack stays in memory.
    pub output: Option<PathBuf>,
    /// Quantize reflectance-like bands to 16-bit integers.
    pub as_int: bool,
    /// Also write a `<output>.json` sidecar with the dataset tags.
    pub sidecar: bool,
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_size(text: &str) -> Result<(usize, usize)> {
    let bad = || Error::InvalidRequest(format!("invalid size {text:?}, expected WIDTHxHEIGHT"));
    let (w, h) = text.trim().split_once(['x', 'X']).ok_or_else(bad)?;
    let w = w.trim().parse().map_err(|_| bad())?;
    let h = h.trim().parse().map_err(|_| bad())?;
    Ok((w, h))
}
