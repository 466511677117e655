use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::raster::{Crs, GeoTransform};

/// Errors encountered when using the GDAL adapter
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2} values")]
    DimensionMismatch(usize, usize, usize),
}

/// Metadata extracted from a GDAL-supported dataset
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    pub geotransform: GeoTransform,
    /// `EPSG:n` when the WKT carries an authority, WKT otherwise; `None` if unprojected
    pub crs: Option<Crs>,
    /// Dataset metadata items (domain "")
    pub metadata: HashMap<String, String>,
}

/// Reader for any GDAL-supported raster (GeoTIFF, JP2, NetCDF subdatasets, DIMAP, ENVI)
pub struct GdalReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

impl GdalReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat(format!(
                "no raster bands in {}",
                path.as_ref().display()
            )));
        }
        let geotransform = match dataset.geo_transform() {
            Ok(gt) => GeoTransform::from_gdal(gt),
            Err(_) => GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
        };
        let proj = dataset.projection();
        let crs = Crs::parse(&proj).ok();
        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        Ok(GdalReader {
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                crs,
                metadata: metadata_map,
            },
        })
    }

    /// Nodata value declared on a band (1-based), if any.
    pub fn nodata(&self, index: usize) -> Result<Option<f64>, GdalError> {
        Ok(self.dataset.rasterband(index)?.no_data_value())
    }

    /// Read a single band (1-based index) as f32, shape (height, width)
    pub fn read_band(&self, index: usize) -> Result<Array2<f32>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "band index {} out of range 1..={}",
                index, self.metadata.bands
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f32>((0, 0), window, window, None)?;
        let data_vec = buf.data().to_vec();
        let len = data_vec.len();
        Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec).map_err(
            |_| GdalError::DimensionMismatch(self.metadata.size_x, self.metadata.size_y, len),
        )
    }

    /// Metadata item from any domain, e.g. NetCDF attributes.
    pub fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
        self.dataset.metadata_item(key, domain)
    }
}
