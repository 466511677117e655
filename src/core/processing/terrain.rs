//! Terrain bands: elevation cropped from the configured DEM, slope and
//! hillshade derived with Horn's 3x3 gradient. All three are cached as
//! GeoTIFF next to the geocoded bands.
use std::f64::consts::PI;

use ndarray::{Array2, Zip};
use tracing::info;

use super::ops::mask_invalid;
use crate::bands::{Band, TerrainBand, FLOAT_NODATA};
use crate::core::context::Context;
use crate::core::geocode::{artifact_path, Artifact};
use crate::core::raster::{Grid, MaskedRaster, RasterMeta};
use crate::error::{Error, Result};
use crate::io::tools::gdalwarp_args;
use crate::io::RasterOutput;
use crate::products::Product;
use crate::types::{DataType, Resampling};

/// Margin around the product extent when cropping the DEM, in metres.
pub const DEM_BUFFER: f64 = 100.0;

/// Horn gradients (dz/dx, dz/dy) at an interior cell, `None` near masked cells.
fn horn(dem: &MaskedRaster<f32>, row: usize, col: usize, cell: f64) -> Option<(f64, f64)> {
    let mut w = [[0.0f64; 3]; 3];
    for (i, r) in (row - 1..=row + 1).enumerate() {
        for (j, c) in (col - 1..=col + 1).enumerate() {
            if dem.mask[[r, c]] {
                return None;
            }
            w[i][j] = f64::from(dem.data[[r, c]]);
        }
    }
    let dz_dx = ((w[0][2] + 2.0 * w[1][2] + w[2][2]) - (w[0][0] + 2.0 * w[1][0] + w[2][0])) / (8.0 * cell);
    let dz_dy = ((w[2][0] + 2.0 * w[2][1] + w[2][2]) - (w[0][0] + 2.0 * w[0][1] + w[0][2])) / (8.0 * cell);
    Some((dz_dx, dz_dy))
}

fn map_interior(
    dem: &MaskedRaster<f32>,
    cell: f64,
    f: impl Fn(f64, f64) -> f32 + Sync,
) -> MaskedRaster<f32> {
    let (rows, cols) = dem.shape();
    let mut data = Array2::from_elem((rows, cols), FLOAT_NODATA as f32);
    let mut mask = Array2::from_elem((rows, cols), true);
    Zip::indexed(&mut data)
        .and(&mut mask)
        .par_for_each(|(r, c), value, masked| {
            if r == 0 || c == 0 || r + 1 >= rows || c + 1 >= cols {
                return;
            }
            if let Some((dx, dy)) = horn(dem, r, c, cell) {
                *value = f(dx, dy);
                *masked = false;
            }
        });
    MaskedRaster { data, mask }
}

/// Slope in degrees. Border cells and cells next to nodata are masked.
pub fn slope(dem: &MaskedRaster<f32>, cell_size: f64) -> MaskedRaster<f32> {
    map_interior(dem, cell_size, |dx, dy| {
        (dx * dx + dy * dy).sqrt().atan().to_degrees() as f32
    })
}

/// Shaded relief in 0..=255 for a sun at `azimuth` (clockwise from north)
/// and `altitude` above the horizon, both in degrees.
pub fn hillshade(dem: &MaskedRaster<f32>, cell_size: f64, azimuth: f64, altitude: f64) -> MaskedRaster<f32> {
    let zenith = (90.0 - altitude).to_radians();
    let az_math = (360.0 - azimuth + 90.0).rem_euclid(360.0).to_radians();
    let (sin_zen, cos_zen) = zenith.sin_cos();
    map_interior(dem, cell_size, move |dx, dy| {
        let slope = (dx * dx + dy * dy).sqrt().atan();
        let aspect = if dx.abs() < 1e-12 && dy.abs() < 1e-12 {
            0.0
        } else {
            let a = dy.atan2(-dx);
            if a < 0.0 { a + 2.0 * PI } else { a }
        };
        let shade = cos_zen * slope.cos() + sin_zen * slope.sin() * (az_math - aspect).cos();
        (255.0 * shade.max(0.0)) as f32
    })
}

/// Terrain raster of `band` for `product` at `resolution`, built on first use.
pub fn ensure_terrain(
    product: &dyn Product,
    band: TerrainBand,
    resolution: f64,
    ctx: &Context,
) -> Result<Artifact> {
    let info = product.info();
    let target = artifact_path(info, band.name(), resolution);
    if ctx.io.exists(&target) {
        info!("Cache hit for {}: {}", band, target.display());
        return Ok(Artifact::Cached(target));
    }
    let sun = match band {
        TerrainBand::Hillshade => {
            let optical = product.as_optical().ok_or_else(|| {
                Error::invalid_band(Band::Terrain(band), "only optical products have sun angles")
            })?;
            Some(optical.get_mean_sun_angles(ctx.io.as_ref())?)
        }
        _ => None,
    };

    std::fs::create_dir_all(&info.output_dir)?;

    if band == TerrainBand::Dem {
        let source = ctx.config.dem_path.as_ref().ok_or_else(|| {
            Error::invalid_band(Band::Terrain(band), "no elevation source configured")
        })?;
        let extent = product.extent()?.buffered(DEM_BUFFER);
        let args = gdalwarp_args(
            source,
            &target,
            &product.crs()?,
            &extent,
            resolution,
            Resampling::Bilinear,
            FLOAT_NODATA,
        );
        info!("Cropping DEM {} for {}", source.display(), info.name);
        ctx.tool.run("gdalwarp", &args)?;
        return Ok(Artifact::Produced(target));
    }

    let dem_artifact = ensure_terrain(product, TerrainBand::Dem, resolution, ctx)?;
    let src = ctx.io.read(dem_artifact.path(), 1)?;
    let (height, width) = src.shape();
    let cell = src.transform.resolution().0;
    let dem = mask_invalid(src.data, FLOAT_NODATA, src.nodata);
    let derived = match sun {
        Some((azimuth, zenith)) => hillshade(&dem, cell, azimuth, 90.0 - zenith),
        None => slope(&dem, cell),
    };

    let grid = Grid {
        crs: match src.crs {
            Some(crs) => crs,
            None => product.crs()?,
        },
        transform: src.transform,
        width,
        height,
    };
    let meta = RasterMeta::for_grid(&grid, DataType::Float32, FLOAT_NODATA, 1);
    let output = RasterOutput::single_f32(meta, derived.filled(FLOAT_NODATA as f32), band.name());
    info!("Writing {} of {} to {}", band, info.name, target.display());
    ctx.io.write(&target, &output)?;
    Ok(Artifact::Produced(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn plane(rows: usize, cols: usize, gx: f32, gy: f32) -> MaskedRaster<f32> {
        MaskedRaster::unmasked(Array2::from_shape_fn((rows, cols), |(r, c)| {
            gx * c as f32 + gy * r as f32
        }))
    }

    #[test]
    fn slope_of_a_tilted_plane() {
        // Rises 10 m per 10 m cell eastward: 45 degrees.
        let out = slope(&plane(5, 5, 10.0, 0.0), 10.0);
        assert!(out.mask[[0, 0]]);
        assert_abs_diff_eq!(out.data[[2, 2]], 45.0, epsilon = 1e-4);
        assert_eq!(out.valid_count(), 9);
    }

    #[test]
    fn flat_hillshade_depends_on_sun_altitude_only() {
        let out = hillshade(&plane(4, 4, 0.0, 0.0), 10.0, 135.0, 30.0);
        let expected = 255.0 * 60f64.to_radians().cos();
        assert_abs_diff_eq!(f64::from(out.data[[1, 1]]), expected, epsilon = 1e-3);
    }

    #[test]
    fn slopes_facing_the_sun_are_brighter() {
        // Elevation grows westward: the surface faces east.
        let east_facing = plane(5, 5, -5.0, 0.0);
        let lit = hillshade(&east_facing, 10.0, 90.0, 45.0);
        let shaded = hillshade(&east_facing, 10.0, 270.0, 45.0);
        assert!(lit.data[[2, 2]] > shaded.data[[2, 2]]);
    }

    #[test]
    fn nodata_propagates_to_neighbours() {
        let mut dem = plane(5, 5, 1.0, 1.0);
        dem.mask[[2, 2]] = true;
        let out = slope(&dem, 10.0);
        assert!(out.mask[[1, 1]]);
        assert!(out.mask[[3, 3]]);
        assert_eq!(out.valid_count(), 0);
    }
}
