//! Vector helpers for footprints and cloud masks: polygons, convex hulls,
//! rasterization onto a grid and WGS84 to UTM projection.
use gdal::errors::GdalError as GdalCrateError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::raster::{Crs, Envelope, Grid};
use crate::error::{Error, Result};
use crate::io::GdalError;

const WGS84_EPSG: u32 = 4326;

/// Simple polygon given by its exterior ring (not repeated-closed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(mut exterior: Vec<(f64, f64)>) -> Self {
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        Self { exterior }
    }

    pub fn from_envelope(env: &Envelope) -> Self {
        Polygon::new(env.corners().to_vec())
    }

    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::from_points(&self.exterior)
    }

    pub fn area(&self) -> f64 {
        let n = self.exterior.len();
        let mut s = 0.0;
        for i in 0..n {
            let (x0, y0) = self.exterior[i];
            let (x1, y1) = self.exterior[(i + 1) % n];
            s += x0 * y1 - x1 * y0;
        }
        s.abs() / 2.0
    }

    /// Even-odd rule.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let pts = &self.exterior;
        let n = pts.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = pts[i];
            let (xj, yj) = pts[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Convex hull (monotone chain), counter-clockwise.
pub fn convex_hull(points: &[(f64, f64)]) -> Option<Polygon> {
    let mut pts: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    if pts.len() < 3 {
        return None;
    }
    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };
    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    if lower.len() < 3 {
        return None;
    }
    Some(Polygon::new(lower))
}

/// Cells of `grid` whose centre lies in any polygon.
pub fn rasterize(polygons: &[Polygon], grid: &Grid) -> Array2<bool> {
    let mut out = Array2::from_elem(grid.shape(), false);
    for poly in polygons {
        let Some(env) = poly.envelope() else { continue };
        for ((row, col), cell) in out.indexed_iter_mut() {
            if *cell {
                continue;
            }
            let (x, y) = grid.transform.pixel_center(col, row);
            if x < env.min_x || x > env.max_x || y < env.min_y || y > env.max_y {
                continue;
            }
            *cell = poly.contains(x, y);
        }
    }
    out
}

/// Footprint of the valid cells of a mask: hull of their outer corners, row by row.
pub fn footprint_of_valid(valid: &Array2<bool>, grid: &Grid) -> Option<Polygon> {
    let gt = &grid.transform;
    let corner = |col: f64, row: f64| {
        (
            gt.origin_x + col * gt.pixel_width + row * gt.row_rotation,
            gt.origin_y + col * gt.col_rotation + row * gt.pixel_height,
        )
    };
    let mut pts = Vec::new();
    for (r, row) in valid.outer_iter().enumerate() {
        let first = row.iter().position(|v| *v);
        let last = row.iter().rposition(|v| *v);
        if let (Some(c0), Some(c1)) = (first, last) {
            let (r0, r1) = (r as f64, r as f64 + 1.0);
            pts.push(corner(c0 as f64, r0));
            pts.push(corner(c0 as f64, r1));
            pts.push(corner(c1 as f64 + 1.0, r0));
            pts.push(corner(c1 as f64 + 1.0, r1));
        }
    }
    convex_hull(&pts)
}

/// UTM EPSG code covering a WGS84 position.
pub fn utm_epsg_for(lon: f64, lat: f64) -> u32 {
    let zone = (((lon + 180.0) / 6.0).floor() as i64).rem_euclid(60) as u32 + 1;
    if lat >= 0.0 { 32600 + zone } else { 32700 + zone }
}

fn spatial_ref(crs: &Crs) -> std::result::Result<SpatialRef, GdalCrateError> {
    let mut srs = match crs.epsg() {
        Some(code) => SpatialRef::from_epsg(code)?,
        None => SpatialRef::from_definition(crs.as_str())?,
    };
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

fn from_wgs84(crs: &Crs) -> std::result::Result<CoordTransform, GdalCrateError> {
    let src = spatial_ref(&Crs::from_epsg(WGS84_EPSG))?;
    let dst = spatial_ref(crs)?;
    CoordTransform::new(&src, &dst)
}

/// Project a WGS84 (lon, lat) polygon into `crs`.
pub fn project_wgs84(poly: &Polygon, crs: &Crs) -> Result<Polygon> {
    if crs.is_geographic() {
        return Ok(poly.clone());
    }
    let transform = from_wgs84(crs).map_err(GdalError::from)?;
    let mut xs: Vec<f64> = poly.exterior.iter().map(|p| p.0).collect();
    let mut ys: Vec<f64> = poly.exterior.iter().map(|p| p.1).collect();
    transform
        .transform_coords(&mut xs, &mut ys, &mut [])
        .map_err(GdalError::from)?;
    Ok(Polygon::new(xs.into_iter().zip(ys).collect()))
}

/// UTM CRS of a WGS84 footprint centre, with the projected footprint and its envelope.
pub fn wgs84_to_local_utm(footprint: &Polygon) -> Result<(Crs, Polygon, Envelope)> {
    let env = footprint
        .envelope()
        .ok_or_else(|| Error::invalid_product("empty WGS84 footprint"))?;
    let (lon, lat) = env.center();
    let crs = Crs::from_epsg(utm_epsg_for(lon, lat));
    let projected = project_wgs84(footprint, &crs)?;
    let extent = projected
        .envelope()
        .ok_or_else(|| Error::invalid_product("empty projected footprint"))?;
    Ok((crs, projected, extent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn hull_drops_interior_points() {
        let pts = [(0.0, 0.0), (2.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 2.0)];
        let hull = convex_hull(&pts).unwrap();
        assert_eq!(hull.exterior.len(), 4);
        assert_abs_diff_eq!(hull.area(), 4.0);
    }

    #[test]
    fn utm_zone_lookup() {
        assert_eq!(utm_epsg_for(2.35, 48.85), 32631);
        assert_eq!(utm_epsg_for(-70.6, -33.4), 32719);
    }

    fn project_point(lon: f64, lat: f64, epsg: u32) -> (f64, f64) {
        let poly = Polygon::new(vec![(lon, lat), (lon + 0.1, lat), (lon, lat + 0.1)]);
        project_wgs84(&poly, &Crs::from_epsg(epsg)).unwrap().exterior[0]
    }

    #[test]
    fn utm_projection_on_and_off_the_central_meridian() {
        let (e, n) = project_point(3.0, 45.0, 32631);
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(n, 4_982_950.40, epsilon = 0.01);

        // Western zone edge.
        let (e, n) = project_point(0.0, 0.0, 32631);
        assert_abs_diff_eq!(e, 166_021.44, epsilon = 0.01);
        assert_abs_diff_eq!(n, 0.0, epsilon = 1e-3);

        let (_, n) = project_point(3.0, -45.0, 32731);
        assert_abs_diff_eq!(n, 10_000_000.0 - 4_982_950.40, epsilon = 0.01);
    }

    #[test]
    fn projects_into_non_utm_crs() {
        let (x, y) = project_point(0.0, 0.0, 3857);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
        let (x, _) = project_point(180.0, 0.0, 3857);
        assert_abs_diff_eq!(x, 20_037_508.34, epsilon = 0.01);
    }

    #[test]
    fn rasterize_uses_pixel_centres() {
        let env = Envelope::new(0.0, 0.0, 4.0, 4.0);
        let grid = Grid::from_resolution(&env, Crs::from_epsg(32631), 1.0).unwrap();
        let square = Polygon::from_envelope(&Envelope::new(0.0, 2.0, 2.0, 4.0));
        let mask = rasterize(&[square], &grid);
        assert_eq!(mask.iter().filter(|v| **v).count(), 4);
        assert!(mask[[0, 0]] && mask[[1, 1]] && !mask[[2, 2]]);
    }

    #[test]
    fn footprint_of_valid_is_hull_of_valid_cells() {
        let env = Envelope::new(0.0, 0.0, 3.0, 3.0);
        let grid = Grid::from_resolution(&env, Crs::from_epsg(32631), 1.0).unwrap();
        let valid = array![[false, true, false], [true, true, true], [false, true, false]];
        let fp = footprint_of_valid(&valid, &grid).unwrap();
        assert!(fp.contains(1.5, 1.5));
        assert!(fp.area() < 9.0);
    }
}
