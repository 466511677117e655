//! High-level, ergonomic library API: open a product, load bands and indices
//! onto one grid, stack them into a raster. Prefer these entry points over the
//! low-level processing modules when integrating eobands.
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::bands::{Band, Index, Token};
use crate::core::context::Context;
use crate::core::geocode::res_str;
use crate::core::params::{LoadRequest, StackRequest};
use crate::core::processing::pipeline::{self, LoadResult};
use crate::core::processing::stack::{self as stacking, band_output};
use crate::core::raster::Envelope;
use crate::error::Result;
use crate::io::RasterOutput;
use crate::products::Product;
use crate::reader::Reader;

/// Open a product with the process-wide reader.
pub fn open(path: &Path) -> Result<Box<dyn Product>> {
    Reader::global()?.open(path, None, None)
}

/// Open a product stored in `archive_path`, caching derived files in `output_path`.
pub fn open_with(
    path: &Path,
    archive_path: Option<&Path>,
    output_path: Option<&Path>,
) -> Result<Box<dyn Product>> {
    Reader::global()?.open(path, archive_path, output_path)
}

/// Load with the environment configuration, the real tools and GDAL.
pub fn load(product: &dyn Product, request: &LoadRequest) -> Result<LoadResult> {
    pipeline::load(product, request, &Context::from_env())
}

/// Stack with the environment configuration, writing to `output` when given.
pub fn stack(
    product: &dyn Product,
    request: &LoadRequest,
    output: Option<&Path>,
    as_int: bool,
) -> Result<RasterOutput> {
    let request = StackRequest {
        load: request.clone(),
        output: output.map(Path::to_path_buf),
        as_int,
        sidecar: false,
    };
    stacking::stack(product, &request, &Context::from_env())
}

/// What `eobands --info` prints.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub condensed_name: String,
    pub sensor: String,
    pub product_type: String,
    pub datetime: String,
    pub crs: String,
    pub extent: Envelope,
    pub resolution: f64,
    pub default_band: Option<String>,
    pub bands: Vec<String>,
    pub indices: Vec<String>,
}

/// A product with the collaborators it is processed with.
#[derive(Debug)]
pub struct Session {
    product: Box<dyn Product>,
    ctx: Context,
}

impl Session {
    /// Open `path` with the environment configuration.
    pub fn open(path: &Path) -> Result<Self> {
        let ctx = Context::from_env();
        let product = Reader::new(ctx.config.clone())?.open(path, None, None)?;
        Ok(Self { product, ctx })
    }

    pub fn with_context(product: Box<dyn Product>, ctx: Context) -> Self {
        Self { product, ctx }
    }

    pub fn product(&self) -> &dyn Product {
        self.product.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.product.set_output_dir(dir);
    }

    pub fn load(&self, request: &LoadRequest) -> Result<LoadResult> {
        pipeline::load(self.product(), request, &self.ctx)
    }

    pub fn stack(&self, request: &StackRequest) -> Result<RasterOutput> {
        stacking::stack(self.product(), request, &self.ctx)
    }

    /// Write every entry of `result` to `<dir>/<condensed>_<BAND>.tif`.
    pub fn write_bands(&self, result: &LoadResult, dir: &Path) -> Result<Vec<PathBuf>> {
        let info = self.product.info();
        let mut written = Vec::with_capacity(result.len());
        for (i, (token, _)) in result.entries.iter().enumerate() {
            let path = dir.join(format!("{}_{}.tif", info.condensed_name, token.name()));
            self.ctx.io.write(&path, &band_output(result, i)?)?;
            info!("Wrote {} at {}: {}", token, res_str(result.meta.transform.resolution().0), path.display());
            written.push(path);
        }
        Ok(written)
    }

    pub fn summary(&self) -> Result<ProductSummary> {
        let product = self.product();
        let info = product.info();
        let bands = Band::all()
            .filter(|b| product.has_band(Token::Band(*b)))
            .map(|b| b.name().to_string())
            .collect();
        let indices = Index::ALL
            .iter()
            .filter(|i| product.has_band(Token::Index(**i)))
            .map(|i| i.name().to_string())
            .collect();
        Ok(ProductSummary {
            name: info.name.clone(),
            condensed_name: info.condensed_name.clone(),
            sensor: info.sensor.to_string(),
            product_type: info.product_type.clone(),
            datetime: info.datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
            crs: product.crs()?.to_string(),
            extent: product.extent()?,
            resolution: info.resolution,
            default_band: product.get_default_band().ok().map(|b| b.name().to_string()),
            bands,
            indices,
        })
    }
}
