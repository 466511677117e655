//! Masked resampling of a north-up source raster onto a target grid in the same CRS.
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::raster::{GeoTransform, Grid, MaskedRaster};
use crate::error::{Error, Result};
use crate::types::Resampling;

/// Source pixel (row, col) containing fractional position (col, row), if inside.
fn containing(fc: f64, fr: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
    if !(fc.is_finite() && fr.is_finite()) || fc < 0.0 || fr < 0.0 {
        return None;
    }
    let (c, r) = (fc.floor() as usize, fr.floor() as usize);
    (r < rows && c < cols).then_some((r, c))
}

fn check_north_up(transform: &GeoTransform) -> Result<()> {
    if transform.is_north_up() {
        Ok(())
    } else {
        Err(Error::EoReader(
            "rotated source rasters must be warped before resampling".into(),
        ))
    }
}

/// Nearest-neighbour resampling; works for any pixel type.
pub fn resample_nearest<T>(
    source: &MaskedRaster<T>,
    transform: &GeoTransform,
    grid: &Grid,
    fill: T,
) -> Result<MaskedRaster<T>>
where
    T: Copy + Send + Sync,
{
    check_north_up(transform)?;
    let (rows, cols) = source.shape();
    let mut data = Array2::from_elem(grid.shape(), fill);
    let mut mask = Array2::from_elem(grid.shape(), true);
    Zip::indexed(&mut data)
        .and(&mut mask)
        .par_for_each(|(row, col), value, masked| {
            let (x, y) = grid.transform.pixel_center(col, row);
            let (fc, fr) = transform.geo_to_pixel(x, y);
            if let Some((r, c)) = containing(fc, fr, rows, cols) {
                if !source.mask[[r, c]] {
                    *value = source.data[[r, c]];
                    *masked = false;
                }
            }
        });
    Ok(MaskedRaster { data, mask })
}

/// Bilinear resampling over valid neighbours only.
///
/// A target pixel is masked when the source pixel containing its centre is
/// masked or outside; otherwise the weights of masked neighbours are dropped
/// and the remaining ones renormalised.
pub fn resample_bilinear(
    source: &MaskedRaster<f32>,
    transform: &GeoTransform,
    grid: &Grid,
) -> Result<MaskedRaster<f32>> {
    check_north_up(transform)?;
    let (rows, cols) = source.shape();
    let mut data = Array2::zeros(grid.shape());
    let mut mask = Array2::from_elem(grid.shape(), true);
    Zip::indexed(&mut data)
        .and(&mut mask)
        .par_for_each(|(row, col), value, masked| {
            let (x, y) = grid.transform.pixel_center(col, row);
            let (fc, fr) = transform.geo_to_pixel(x, y);
            let Some((nr, nc)) = containing(fc, fr, rows, cols) else {
                return;
            };
            if source.mask[[nr, nc]] {
                return;
            }
            // Offsets relative to the pixel centres.
            let u = fc - 0.5;
            let v = fr - 0.5;
            let c0 = u.floor();
            let r0 = v.floor();
            let dx = u - c0;
            let dy = v - r0;
            let mut acc = 0.0f64;
            let mut weight = 0.0f64;
            for (dr, dc, w) in [
                (0, 0, (1.0 - dx) * (1.0 - dy)),
                (0, 1, dx * (1.0 - dy)),
                (1, 0, (1.0 - dx) * dy),
                (1, 1, dx * dy),
            ] {
                let r = r0 as i64 + dr;
                let c = c0 as i64 + dc;
                if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
                    continue;
                }
                let (r, c) = (r as usize, c as usize);
                let v = source.data[[r, c]];
                if source.mask[[r, c]] || !v.is_finite() || w <= 0.0 {
                    continue;
                }
                acc += w * f64::from(v);
                weight += w;
            }
            *value = if weight > 0.0 {
                (acc / weight) as f32
            } else {
                source.data[[nr, nc]]
            };
            *masked = false;
        });
    Ok(MaskedRaster { data, mask })
}

/// Resample with `method`, skipping the work when the grids already match.
pub fn resample(
    source: &MaskedRaster<f32>,
    transform: &GeoTransform,
    grid: &Grid,
    method: Resampling,
) -> Result<MaskedRaster<f32>> {
    let (rows, cols) = source.shape();
    let same_grid = rows == grid.height && cols == grid.width && transform.approx_eq(&grid.transform);
    if same_grid {
        return Ok(source.clone());
    }
    debug!(
        "Resampling {}x{} -> {}x{} ({:?})",
        cols, rows, grid.width, grid.height, method
    );
    match method {
        Resampling::Nearest => resample_nearest(source, transform, grid, 0.0),
        Resampling::Bilinear => resample_bilinear(source, transform, grid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{Crs, Envelope};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn grid(res: f64, size: usize) -> Grid {
        let extent = Envelope::new(0.0, 0.0, 40.0, 40.0);
        let g = Grid::from_resolution(&extent, Crs::from_epsg(32631), res).unwrap();
        assert_eq!(g.width, size);
        g
    }

    #[test]
    fn nearest_upsampling_replicates_pixels() {
        let src = MaskedRaster::unmasked(array![[1u8, 2], [3, 4]]);
        let out = resample_nearest(&src, &grid(20.0, 2).transform, &grid(10.0, 4), 0).unwrap();
        assert_eq!(out.data.row(0).to_vec(), vec![1, 1, 2, 2]);
        assert_eq!(out.data.row(3).to_vec(), vec![3, 3, 4, 4]);
        assert_eq!(out.valid_count(), 16);
    }

    #[test]
    fn bilinear_downsampling_averages() {
        let src = MaskedRaster::unmasked(Array2::from_shape_fn((4, 4), |(_, c)| c as f32));
        let out = resample_bilinear(&src, &grid(10.0, 4).transform, &grid(20.0, 2)).unwrap();
        // Target centres fall on source pixel corners: mean of columns 0,1 and 2,3.
        assert_abs_diff_eq!(out.data[[0, 0]], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(out.data[[0, 1]], 2.5, epsilon = 1e-6);
    }

    #[test]
    fn masked_neighbours_are_dropped_and_weights_renormalised() {
        let data = array![[1.0f32, 100.0], [1.0, 1.0]];
        let mask = array![[false, true], [false, false]];
        let src = MaskedRaster::new(data, mask).unwrap();
        let src_transform = grid(20.0, 2).transform;
        let out = resample_bilinear(&src, &src_transform, &grid(10.0, 4)).unwrap();
        // Containing pixel masked -> masked.
        assert!(out.mask[[0, 2]]);
        assert!(out.mask[[0, 3]]);
        // Valid pixels never see the masked 100.
        for ((r, c), v) in out.data.indexed_iter() {
            if !out.mask[[r, c]] {
                assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn outside_source_is_masked() {
        let src = MaskedRaster::unmasked(array![[5.0f32]]);
        let small = GeoTransform::north_up(0.0, 40.0, 20.0, 20.0);
        let out = resample(&src, &small, &grid(10.0, 4), Resampling::Bilinear).unwrap();
        assert_eq!(out.valid_count(), 4);
        assert!(!out.mask[[0, 0]]);
        assert!(out.mask[[3, 3]]);
    }

    #[test]
    fn same_grid_is_a_copy() {
        let src = MaskedRaster::unmasked(Array2::from_elem((4, 4), 2.0f32));
        let g = grid(10.0, 4);
        assert_eq!(resample(&src, &g.transform, &g, Resampling::Bilinear).unwrap(), src);
    }
}
