//! Raster I/O seam. The pipeline reads source rasters and writes derived
//! artifacts only through [`RasterIo`], so it can run against GDAL or an
//! in-memory store.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use tracing::debug;

use super::gdal::GdalReader;
use super::writers::tiff::write_geotiff;
use crate::core::raster::{Crs, GeoTransform, RasterMeta};
use crate::error::{Error, Result};

/// One band read from disk, still in its native geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRaster {
    pub data: Array2<f32>,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
}

impl SourceRaster {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Pixel payload of a raster to be written, `(band, row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBands {
    Float32(Array3<f32>),
    Int16(Array3<i16>),
    UInt8(Array3<u8>),
}

impl OutputBands {
    pub fn count(&self) -> usize {
        match self {
            OutputBands::Float32(a) => a.len_of(Axis(0)),
            OutputBands::Int16(a) => a.len_of(Axis(0)),
            OutputBands::UInt8(a) => a.len_of(Axis(0)),
        }
    }

    /// Band `i` widened to f32, for readers of written artifacts.
    pub fn band_f32(&self, i: usize) -> Array2<f32> {
        match self {
            OutputBands::Float32(a) => a.index_axis(Axis(0), i).to_owned(),
            OutputBands::Int16(a) => a.index_axis(Axis(0), i).mapv(f32::from),
            OutputBands::UInt8(a) => a.index_axis(Axis(0), i).mapv(f32::from),
        }
    }
}

/// A complete raster to write: geometry, pixels, band names and dataset tags.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOutput {
    pub meta: RasterMeta,
    pub bands: OutputBands,
    pub descriptions: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl RasterOutput {
    pub fn single_f32(meta: RasterMeta, data: Array2<f32>, description: &str) -> Self {
        let bands = OutputBands::Float32(data.insert_axis(Axis(0)));
        Self {
            meta,
            bands,
            descriptions: vec![description.to_string()],
            tags: BTreeMap::new(),
        }
    }

    /// Band `i` as a source raster, the way it reads back from disk.
    pub fn to_source(&self, i: usize) -> SourceRaster {
        SourceRaster {
            data: self.bands.band_f32(i),
            transform: self.meta.transform,
            crs: Some(self.meta.crs.clone()),
            nodata: Some(self.meta.nodata),
        }
    }
}

pub trait RasterIo: Send + Sync {
    /// Read band `band` (1-based) of the raster at `path`.
    fn read(&self, path: &Path, band: usize) -> Result<SourceRaster>;

    fn write(&self, path: &Path, raster: &RasterOutput) -> Result<()>;

    /// Existence of an artifact; the cache treats it as a hit.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// GDAL-backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalRasterIo;

impl RasterIo for GdalRasterIo {
    fn read(&self, path: &Path, band: usize) -> Result<SourceRaster> {
        debug!("Reading band {} of {:?}", band, path);
        let reader = GdalReader::open(path)?;
        let data = reader.read_band(band)?;
        let nodata = reader.nodata(band)?;
        Ok(SourceRaster {
            data,
            transform: reader.metadata.geotransform,
            crs: reader.metadata.crs.clone(),
            nodata,
        })
    }

    fn write(&self, path: &Path, raster: &RasterOutput) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if raster.bands.count() != raster.meta.count {
            return Err(Error::EoReader(format!(
                "raster metadata declares {} bands, payload has {}",
                raster.meta.count,
                raster.bands.count()
            )));
        }
        write_geotiff(path, raster)?;
        Ok(())
    }
}
