//! Band loading and collocation.
//!
//! A request is resolved and checked against the product before anything is
//! read. Indices expand into the bands they need; those are located (running
//! the geocoding cache when needed), read, masked, calibrated and resampled
//! onto one grid. Terrain and cloud bands are derived on the same grid, and
//! indices are evaluated last over the collocated arrays.
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use ndarray::Array2;
use tracing::{debug, info};

use super::ops::{cloud_band, evaluate_index, mask_invalid};
use super::resample::{resample, resample_nearest};
use super::terrain::ensure_terrain;
use crate::bands::{
    classify, policy, resolve_all, Band, CloudBand, TerrainBand, Token, FLOAT_NODATA,
};
use crate::core::context::Context;
use crate::core::geocode::{get_band_paths, res_str, Artifact};
use crate::core::geometry::rasterize;
use crate::core::params::LoadRequest;
use crate::core::raster::{BandData, Grid, MaskedRaster, RasterMeta};
use crate::error::{Error, Result};
use crate::io::tools::gdalwarp_args;
use crate::io::SourceRaster;
use crate::products::{CloudSource, Product};
use crate::types::{DataType, Resampling};

/// Collocated bands in request order, sharing one raster description.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub entries: Vec<(Token, BandData)>,
    /// Grid, dtype and nodata of the first entry; `count` is 1.
    pub meta: RasterMeta,
}

impl LoadResult {
    pub fn get(&self, token: impl Into<Token>) -> Option<&BandData> {
        let token = token.into();
        self.entries
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, data)| data)
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.entries.iter().map(|(t, _)| *t).collect()
    }

    pub fn grid(&self) -> Grid {
        self.meta.grid()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every check that needs no file access: availability of bands, inputs of
/// indices, an elevation source for terrain, a sane grid.
pub fn check_request(
    product: &dyn Product,
    tokens: &[Token],
    request: &LoadRequest,
    ctx: &Context,
) -> Result<()> {
    request.validate()?;
    let info = product.info();
    for token in tokens {
        match token {
            Token::Index(index) => {
                let missing: Vec<&str> = index
                    .required_bands()
                    .into_iter()
                    .filter(|b| !product.has_band(Token::Band(*b)))
                    .map(Band::name)
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::InvalidIndex {
                        index: index.name().to_string(),
                        missing: missing.join(", "),
                    });
                }
            }
            Token::Band(band) => {
                if !product.has_band(*token) {
                    return Err(Error::invalid_band(
                        band,
                        format!("not available in {}", info.name),
                    ));
                }
                if matches!(band, Band::Terrain(_)) && ctx.config.dem_path.is_none() {
                    return Err(Error::invalid_band(band, "no elevation source configured"));
                }
            }
        }
    }
    Ok(())
}

/// Reference grid: requested resolution, else requested size, else the
/// product's default resolution, over the product extent.
pub fn target_grid(product: &dyn Product, request: &LoadRequest) -> Result<Grid> {
    let extent = product.extent()?;
    let crs = product.crs()?;
    match (request.resolution, request.size) {
        (Some(res), _) => Grid::from_resolution(&extent, crs, res),
        (None, Some((width, height))) => Grid::from_size(&extent, crs, width, height),
        (None, None) => Grid::from_resolution(&extent, crs, product.info().resolution),
    }
}

fn needs_warp(src: &SourceRaster, grid: &Grid) -> bool {
    !src.transform.is_north_up() || src.crs.as_ref().is_some_and(|crs| *crs != grid.crs)
}

/// Reproject a source raster onto the grid with the external warper, cached
/// next to the other derived artifacts.
fn warp_to_grid(
    product: &dyn Product,
    band: Band,
    artifact: &Artifact,
    grid: &Grid,
    ctx: &Context,
) -> Result<SourceRaster> {
    let info = product.info();
    let target: PathBuf = info.output_dir.join(format!(
        "{}_{}_{}_warped.tif",
        info.condensed_name,
        band.name(),
        res_str(grid.resolution())
    ));
    if ctx.io.exists(&target) {
        debug!("Cache hit for warped {}: {}", band, target.display());
    } else {
        std::fs::create_dir_all(&info.output_dir)?;
        let class = policy(band.class());
        let args = gdalwarp_args(
            artifact.path(),
            &target,
            &grid.crs,
            &grid.envelope(),
            grid.resolution(),
            class.resampling,
            class.nodata,
        );
        info!("Warping {} of {} onto {}", band, info.name, grid.crs);
        ctx.tool.run("gdalwarp", &args)?;
    }
    ctx.io.read(&target, artifact.index())
}

/// Read, mask, calibrate and collocate one optical or radar band.
fn load_source_band(
    product: &dyn Product,
    band: Band,
    artifact: &Artifact,
    grid: &Grid,
    ctx: &Context,
) -> Result<MaskedRaster<f32>> {
    let class = policy(band.class());
    let mut src = ctx.io.read(artifact.path(), artifact.index())?;
    if needs_warp(&src, grid) {
        src = warp_to_grid(product, band, artifact, grid, ctx)?;
    }
    let transform = src.transform;
    let mut raster = mask_invalid(src.data, class.nodata, src.nodata);
    product.calibrate(band, &mut raster.data, ctx.io.as_ref())?;
    let not_finite = raster.data.mapv(|v| !v.is_finite());
    raster.mask_also(&not_finite);
    resample(&raster, &transform, grid, class.resampling)
}

fn load_terrain_band(
    product: &dyn Product,
    band: TerrainBand,
    grid: &Grid,
    ctx: &Context,
) -> Result<MaskedRaster<f32>> {
    let artifact = ensure_terrain(product, band, grid.resolution(), ctx)?;
    let src = ctx.io.read(artifact.path(), 1)?;
    let transform = src.transform;
    let raster = mask_invalid(src.data, FLOAT_NODATA, src.nodata);
    resample(&raster, &transform, grid, Resampling::Bilinear)
}

/// Non-zero cells of one plane of a cloud raster, on the grid.
fn read_flag_plane(path: &std::path::Path, index: usize, grid: &Grid, ctx: &Context) -> Result<Array2<bool>> {
    let src = ctx.io.read(path, index)?;
    let flags = MaskedRaster::unmasked(src.data.mapv(|v| u8::from(v.is_finite() && v > 0.0)));
    let on_grid = resample_nearest(&flags, &src.transform, grid, 0u8)?;
    Ok(on_grid.filled(0).mapv(|v| v == 1))
}

/// Cloud bands on the grid; `invalid` is the product's nodata on the grid.
fn load_cloud_bands(
    product: &dyn Product,
    kinds: &[CloudBand],
    grid: &Grid,
    invalid: &Array2<bool>,
    ctx: &Context,
) -> Result<Vec<(CloudBand, MaskedRaster<u8>)>> {
    let clear = || Array2::from_elem(grid.shape(), false);
    let (opaque, cirrus) = match product.cloud_source(ctx.io.as_ref())? {
        CloudSource::Raster {
            path,
            opaque,
            cirrus,
        } => {
            let o = read_flag_plane(&path, opaque, grid, ctx)?;
            let c = match cirrus {
                Some(index) => read_flag_plane(&path, index, grid, ctx)?,
                None => clear(),
            };
            (o, c)
        }
        CloudSource::Vector { opaque, cirrus } => (rasterize(&opaque, grid), rasterize(&cirrus, grid)),
        CloudSource::Clear => (clear(), clear()),
    };
    Ok(kinds
        .iter()
        .map(|kind| (*kind, cloud_band(*kind, &opaque, &cirrus, invalid)))
        .collect())
}

/// Load every requested band and index onto one grid.
pub fn load(product: &dyn Product, request: &LoadRequest, ctx: &Context) -> Result<LoadResult> {
    let tokens = resolve_all(&request.bands)?;
    check_request(product, &tokens, request, ctx)?;
    let grid = target_grid(product, request)?;
    let info = product.info();

    let Some(first) = tokens.first() else {
        return Ok(LoadResult {
            entries: Vec::new(),
            meta: RasterMeta::for_grid(&grid, DataType::Float32, FLOAT_NODATA, 1),
        });
    };
    info!(
        "Loading [{}] from {} on a {}x{} grid at {} m",
        tokens.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "),
        info.name,
        grid.width,
        grid.height,
        grid.resolution()
    );

    let mut sources: BTreeSet<Band> = BTreeSet::new();
    let mut terrain: Vec<TerrainBand> = Vec::new();
    let mut clouds: Vec<CloudBand> = Vec::new();
    for token in &tokens {
        match token {
            Token::Index(index) => sources.extend(index.required_bands()),
            Token::Band(band @ (Band::Optical(_) | Band::Sar(_))) => {
                sources.insert(*band);
            }
            Token::Band(Band::Terrain(t)) => terrain.push(*t),
            Token::Band(Band::Cloud(c)) => clouds.push(*c),
        }
    }
    let default_band = if clouds.is_empty() {
        None
    } else {
        let band = product.get_default_band()?;
        sources.insert(band);
        Some(band)
    };

    let wanted: Vec<Band> = sources.into_iter().collect();
    let artifacts = get_band_paths(product, &wanted, grid.resolution(), ctx)?;
    let mut loaded: BTreeMap<Band, BandData> = BTreeMap::new();
    for (band, artifact) in &artifacts {
        debug!("{} <- {}", band, artifact.path().display());
        let raster = load_source_band(product, *band, artifact, &grid, ctx)?;
        loaded.insert(*band, BandData::Float(raster));
    }
    for band in terrain {
        let raster = load_terrain_band(product, band, &grid, ctx)?;
        loaded.insert(Band::Terrain(band), BandData::Float(raster));
    }
    if let Some(default_band) = default_band {
        let invalid = loaded
            .get(&default_band)
            .map(|d| d.mask().clone())
            .ok_or_else(|| Error::invalid_band(default_band, "default band was not loaded"))?;
        for (kind, raster) in load_cloud_bands(product, &clouds, &grid, &invalid, ctx)? {
            loaded.insert(Band::Cloud(kind), BandData::Byte(raster));
        }
    }

    let mut entries = Vec::with_capacity(tokens.len());
    for token in &tokens {
        let data = match token {
            Token::Index(index) => BandData::Float(evaluate_index(*index, &loaded)?),
            Token::Band(band) => loaded
                .get(band)
                .cloned()
                .ok_or_else(|| Error::invalid_band(band, "was not loaded"))?,
        };
        if data.shape() != grid.shape() {
            return Err(Error::EoReader(format!(
                "{} is {:?}, expected {:?}",
                token,
                data.shape(),
                grid.shape()
            )));
        }
        entries.push((*token, data));
    }

    let class = policy(classify(*first));
    Ok(LoadResult {
        entries,
        meta: RasterMeta::for_grid(&grid, class.dtype, class.nodata, 1),
    })
}
