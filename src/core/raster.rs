//! In-memory raster primitives: affine transforms, envelopes, CRS handles,
//! target grids and masked arrays.
use std::fmt;

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DataType;

/// GDAL-ordered affine transform.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-10 && self.col_rotation.abs() < 1e-10
    }

    /// Centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates (col, row) of a map position.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        (
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (-self.col_rotation * dx + self.pixel_width * dy) / det,
        )
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= 1e-6 * a.abs().max(1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x0, y0), rest) = points.split_first()?;
        let mut env = Envelope::new(x0, y0, x0, y0);
        for &(x, y) in rest {
            env.min_x = env.min_x.min(x);
            env.min_y = env.min_y.min(y);
            env.max_x = env.max_x.max(x);
            env.max_y = env.max_y.max(y);
        }
        Some(env)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn buffered(&self, d: f64) -> Self {
        Envelope::new(
            self.min_x - d,
            self.min_y - d,
            self.max_x + d,
            self.max_y + d,
        )
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.max_y),
            (self.max_x, self.max_y),
            (self.max_x, self.min_y),
            (self.min_x, self.min_y),
        ]
    }
}

/// Coordinate reference system, kept as GDAL understands it (`EPSG:n` or WKT).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        Crs(format!("EPSG:{code}"))
    }

    /// Normalise a projection string, reducing WKT to `EPSG:n` when it carries an authority.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::invalid_product("empty coordinate reference system"));
        }
        if let Some(code) = parse_epsg(s) {
            return Ok(Crs::from_epsg(code));
        }
        Ok(Crs(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn epsg(&self) -> Option<u32> {
        parse_epsg(&self.0)
    }

    pub fn is_geographic(&self) -> bool {
        self.epsg() == Some(4326)
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        match (self.epsg(), other.epsg()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0 == other.0,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// EPSG code from `EPSG:n` or from the last `AUTHORITY["EPSG","n"]` of a WKT string.
pub fn parse_epsg(s: &str) -> Option<u32> {
    if let Some(code) = s
        .strip_prefix("EPSG:")
        .or_else(|| s.strip_prefix("epsg:"))
    {
        return code.trim().parse().ok();
    }
    if let Some(code) = s.strip_prefix("urn:ogc:def:crs:EPSG:") {
        return code.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().ok();
    }
    for key in ["AUTHORITY[\"EPSG\",\"", "ID[\"EPSG\","] {
        if let Some(idx) = s.rfind(key) {
            let rest = &s[idx + key.len()..];
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if let Ok(code) = rest[..end].parse() {
                return Some(code);
            }
        }
    }
    None
}

/// The pixel grid every band of a load is collocated on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl Grid {
    /// Square pixels of `resolution` metres anchored on the upper-left corner.
    pub fn from_resolution(extent: &Envelope, crs: Crs, resolution: f64) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::EoReader(format!("invalid resolution {resolution}")));
        }
        let width = (extent.width() / resolution).round().max(1.0) as usize;
        let height = (extent.height() / resolution).round().max(1.0) as usize;
        Ok(Self {
            crs,
            transform: GeoTransform::north_up(extent.min_x, extent.max_y, resolution, resolution),
            width,
            height,
        })
    }

    /// Exactly `width` x `height` pixels covering the extent.
    pub fn from_size(extent: &Envelope, crs: Crs, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EoReader(format!(
                "invalid size {width}x{height}"
            )));
        }
        Ok(Self {
            crs,
            transform: GeoTransform::north_up(
                extent.min_x,
                extent.max_y,
                extent.width() / width as f64,
                extent.height() / height as f64,
            ),
            width,
            height,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn envelope(&self) -> Envelope {
        let (rx, ry) = self.transform.resolution();
        Envelope::new(
            self.transform.origin_x,
            self.transform.origin_y - ry * self.height as f64,
            self.transform.origin_x + rx * self.width as f64,
            self.transform.origin_y,
        )
    }

    pub fn resolution(&self) -> f64 {
        self.transform.resolution().0
    }

    pub fn same_as(&self, other: &Grid) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform)
    }
}

/// A 2-D array with a validity mask; `mask[[r, c]] == true` marks nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRaster<T> {
    pub data: Array2<T>,
    pub mask: Array2<bool>,
}

impl<T: Copy> MaskedRaster<T> {
    pub fn new(data: Array2<T>, mask: Array2<bool>) -> Result<Self> {
        if data.dim() != mask.dim() {
            return Err(Error::EoReader(format!(
                "mask shape {:?} differs from data shape {:?}",
                mask.dim(),
                data.dim()
            )));
        }
        Ok(Self { data, mask })
    }

    pub fn unmasked(data: Array2<T>) -> Self {
        let mask = Array2::from_elem(data.dim(), false);
        Self { data, mask }
    }

    pub fn masked_where(data: Array2<T>, invalid: impl Fn(T) -> bool) -> Self {
        let mask = data.mapv(invalid);
        Self { data, mask }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask[[row, col]]
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }

    /// Dense copy with masked cells replaced by `fill`.
    pub fn filled(&self, fill: T) -> Array2<T> {
        let mut out = self.data.clone();
        Zip::from(&mut out)
            .and(&self.mask)
            .for_each(|v, &m| {
                if m {
                    *v = fill;
                }
            });
        out
    }

    /// Mask additional cells (logical OR).
    pub fn mask_also(&mut self, other: &Array2<bool>) {
        Zip::from(&mut self.mask)
            .and(other)
            .for_each(|m, &o| *m |= o);
    }
}

/// A loaded band: floating point for reflectance, radar, terrain and indices,
/// bytes for cloud masks.
#[derive(Debug, Clone, PartialEq)]
pub enum BandData {
    Float(MaskedRaster<f32>),
    Byte(MaskedRaster<u8>),
}

impl BandData {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            BandData::Float(r) => r.shape(),
            BandData::Byte(r) => r.shape(),
        }
    }

    pub fn mask(&self) -> &Array2<bool> {
        match self {
            BandData::Float(r) => &r.mask,
            BandData::Byte(r) => &r.mask,
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            BandData::Float(_) => DataType::Float32,
            BandData::Byte(_) => DataType::UInt8,
        }
    }

    pub fn as_float(&self) -> Option<&MaskedRaster<f32>> {
        match self {
            BandData::Float(r) => Some(r),
            BandData::Byte(_) => None,
        }
    }

    pub fn as_byte(&self) -> Option<&MaskedRaster<u8>> {
        match self {
            BandData::Byte(r) => Some(r),
            BandData::Float(_) => None,
        }
    }

    pub fn to_float(&self) -> MaskedRaster<f32> {
        match self {
            BandData::Float(r) => r.clone(),
            BandData::Byte(r) => MaskedRaster {
                data: r.data.mapv(f32::from),
                mask: r.mask.clone(),
            },
        }
    }
}

/// Tagged raster description shared by every entry of a load and by written files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMeta {
    pub driver: String,
    pub dtype: DataType,
    pub nodata: f64,
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub crs: Crs,
    pub transform: GeoTransform,
}

impl RasterMeta {
    pub fn for_grid(grid: &Grid, dtype: DataType, nodata: f64, count: usize) -> Self {
        Self {
            driver: "GTiff".to_string(),
            dtype,
            nodata,
            width: grid.width,
            height: grid.height,
            count,
            crs: grid.crs.clone(),
            transform: grid.transform,
        }
    }

    pub fn grid(&self) -> Grid {
        Grid {
            crs: self.crs.clone(),
            transform: self.transform,
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn epsg_from_wkt_authority() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 31N",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],AUTHORITY["EPSG","32631"]]"#;
        assert_eq!(parse_epsg(wkt), Some(32631));
        assert_eq!(Crs::parse(wkt).unwrap(), Crs::from_epsg(32631));
    }

    #[test]
    fn grid_from_resolution_anchors_upper_left() {
        let env = Envelope::new(500_000.0, 4_000_000.0, 500_200.0, 4_000_100.0);
        let grid = Grid::from_resolution(&env, Crs::from_epsg(32631), 20.0).unwrap();
        assert_eq!(grid.shape(), (5, 10));
        assert_abs_diff_eq!(grid.transform.origin_y, 4_000_100.0);
        assert_abs_diff_eq!(grid.transform.pixel_height, -20.0);
        let (x, y) = grid.transform.pixel_center(0, 0);
        assert_abs_diff_eq!(x, 500_010.0);
        assert_abs_diff_eq!(y, 4_000_090.0);
    }

    #[test]
    fn grid_from_size_divides_extent() {
        let env = Envelope::new(0.0, 0.0, 100.0, 50.0);
        let grid = Grid::from_size(&env, Crs::from_epsg(32631), 4, 2).unwrap();
        assert_eq!(grid.transform.resolution(), (25.0, 25.0));
        assert_eq!(grid.envelope(), env);
    }

    #[test]
    fn geo_to_pixel_inverts_pixel_center() {
        let gt = GeoTransform::north_up(100.0, 200.0, 10.0, 10.0);
        let (x, y) = gt.pixel_center(3, 4);
        let (c, r) = gt.geo_to_pixel(x, y);
        assert_abs_diff_eq!(c, 3.5);
        assert_abs_diff_eq!(r, 4.5);
    }

    #[test]
    fn filled_replaces_masked_cells() {
        let r = MaskedRaster::masked_where(array![[1.0f32, 0.0], [2.0, 3.0]], |v| v == 0.0);
        assert_eq!(r.valid_count(), 3);
        assert_eq!(r.filled(-1.0), array![[1.0, -1.0], [2.0, 3.0]]);
    }
}
