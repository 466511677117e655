//! DIMAP v2 very-high-resolution products: Pleiades 1A/1B and SPOT-6/7.
//!
//! Both constellations share the same metadata layout and differ only in
//! their native resolutions.
use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::Path;

use chrono::Datelike;
use ndarray::Array2;
use tracing::debug;

use crate::bands::{Band, CloudBand, OpticalBand};
use crate::core::geometry::Polygon;
use crate::core::raster::{Crs, Envelope};
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::xml::{XmlDoc, XmlElement};
use crate::io::{ProductFiles, RasterIo};
use crate::products::optical::parse_gml_masks;
use crate::products::{
    parse_datetime, unmapped, BandSource, CloudSource, Mtd, OpticalProduct, Product,
    ProductInfo,
};
use crate::types::Sensor;

/// Canonical band, DIMAP band id, raster index in multispectral rasters.
const MS_BANDS: [(OpticalBand, &str, usize); 4] = [
    (OpticalBand::Blue, "B0", 1),
    (OpticalBand::Green, "B1", 2),
    (OpticalBand::Red, "B2", 3),
    (OpticalBand::Nir, "B3", 4),
];

/// (panchromatic, multispectral) resolution in metres.
fn native_resolutions(sensor: Sensor) -> (f64, f64) {
    match sensor {
        Sensor::Spot => (1.5, 6.0),
        _ => (0.5, 2.0),
    }
}

/// Radiometric coefficients of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BandRadiometry {
    gain: f64,
    bias: f64,
    irradiance: Option<f64>,
}

#[derive(Debug)]
pub struct DimapProduct {
    info: ProductInfo,
    files: ProductFiles,
    dim: String,
    raster: String,
    spectral: String,
    crs: Crs,
    extent: Envelope,
    sun_angles: Option<(f64, f64)>,
    radiometry: BTreeMap<String, BandRadiometry>,
}

impl DimapProduct {
    /// `sensor` is either [`Sensor::Pleiades`] or [`Sensor::Spot`].
    pub fn new(path: &Path, files: ProductFiles, sensor: Sensor) -> Result<Self> {
        let pattern = match sensor {
            Sensor::Pleiades => r"(^|/)DIM_PHR1[AB]_[^/]*\.XML$",
            Sensor::Spot => r"(^|/)DIM_SPOT[67]_[^/]*\.XML$",
            other => {
                return Err(Error::InvalidType(format!("{other} is not a DIMAP sensor")))
            }
        };
        let dim = files.find_one(pattern)?;
        let doc = XmlDoc::parse(&files.read_to_string(&dim)?)?;
        let root = &doc.root;

        let date = root.require("IMAGING_DATE")?;
        let time = root.require("IMAGING_TIME")?;
        let datetime = parse_datetime(
            &format!("{date}T{time}"),
            &["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"],
        )?;
        let spectral = root.require("SPECTRAL_PROCESSING")?.to_string();
        let product_type = root
            .text_of("PROCESSING_LEVEL")
            .filter(|t| !t.is_empty())
            .unwrap_or("ORT")
            .to_string();

        let crs_code = root.require("PROJECTED_CRS_CODE").map_err(|_| {
            Error::invalid_product(format!(
                "{} has no projected CRS; only orthorectified products are supported",
                dim
            ))
        })?;
        let crs = Crs::parse(crs_code)?;
        let extent = raster_extent(root)?;

        let base_dir = dim.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let raster_href = root
            .descendants("DATA_FILE_PATH")
            .into_iter()
            .find_map(|el| el.attr("href"))
            .ok_or_else(|| Error::invalid_product(format!("no raster declared in {dim}")))?;
        let raster = if base_dir.is_empty() {
            raster_href.to_string()
        } else {
            format!("{base_dir}/{raster_href}")
        };

        let (pan_res, ms_res) = native_resolutions(sensor);
        let is_pan = spectral == "P";
        let resolution = if is_pan || spectral.starts_with("PMS") {
            pan_res
        } else {
            ms_res
        };
        let mut info = ProductInfo::new(
            path,
            product_name(path),
            sensor,
            datetime,
            &spectral,
            product_type,
            resolution,
        );
        if is_pan {
            info.band_map.insert(Band::Optical(OpticalBand::Pan), "P".to_string());
        } else {
            for (band, id, _) in MS_BANDS {
                info.band_map.insert(Band::Optical(band), id.to_string());
            }
        }

        let sun_angles = sun_angles(root);
        let radiometry = radiometry(root);
        debug!(
            "Opened {} {} product ({} bands at {} m)",
            sensor,
            spectral,
            info.band_map.len(),
            resolution
        );

        Ok(Self {
            info,
            files,
            dim,
            raster,
            spectral,
            crs,
            extent,
            sun_angles,
            radiometry,
        })
    }

    pub fn spectral_processing(&self) -> &str {
        &self.spectral
    }

    fn raster_index(&self, band: Band) -> Option<usize> {
        match band {
            Band::Optical(OpticalBand::Pan) if self.spectral == "P" => Some(1),
            Band::Optical(b) => MS_BANDS.iter().find(|(ob, _, _)| *ob == b).map(|(_, _, i)| *i),
            _ => None,
        }
    }
}

fn raster_extent(root: &XmlElement) -> Result<Envelope> {
    let insert = root
        .find("Geoposition_Insert")
        .ok_or_else(|| Error::invalid_product("missing `Geoposition_Insert` in DIMAP metadata"))?;
    let ulx = insert.require_f64("ULXMAP")?;
    let uly = insert.require_f64("ULYMAP")?;
    let xdim = insert.require_f64("XDIM")?;
    let ydim = insert.require_f64("YDIM")?.abs();
    let dims = root
        .find("Raster_Dimensions")
        .ok_or_else(|| Error::invalid_product("missing `Raster_Dimensions` in DIMAP metadata"))?;
    let ncols = dims.require_f64("NCOLS")?;
    let nrows = dims.require_f64("NROWS")?;
    // ULXMAP/ULYMAP locate the centre of the upper-left pixel.
    let min_x = ulx - xdim / 2.0;
    let max_y = uly + ydim / 2.0;
    Ok(Envelope::new(min_x, max_y - nrows * ydim, min_x + ncols * xdim, max_y))
}

/// Sun (azimuth, zenith) at the scene centre.
fn sun_angles(root: &XmlElement) -> Option<(f64, f64)> {
    let center = root
        .descendants("Located_Geometric_Values")
        .into_iter()
        .find(|el| el.text_of("LOCATION_TYPE") == Some("Center"))?;
    let azimuth: f64 = center.text_of("Solar_Incidences/SUN_AZIMUTH")?.parse().ok()?;
    let elevation: f64 = center.text_of("Solar_Incidences/SUN_ELEVATION")?.parse().ok()?;
    Some((azimuth, 90.0 - elevation))
}

fn radiometry(root: &XmlElement) -> BTreeMap<String, BandRadiometry> {
    let mut out = BTreeMap::new();
    for el in root.descendants("Band_Radiance") {
        let (Some(id), Some(gain), Some(bias)) = (
            el.text_of("BAND_ID"),
            el.text_of("GAIN").and_then(|v| v.parse().ok()),
            el.text_of("BIAS").and_then(|v| v.parse().ok()),
        ) else {
            continue;
        };
        out.insert(
            id.to_string(),
            BandRadiometry {
                gain,
                bias,
                irradiance: None,
            },
        );
    }
    for el in root.descendants("Band_Solar_Irradiance") {
        let id = el.text_of("BAND_ID");
        let value = el.text_of("VALUE").and_then(|v| v.parse::<f64>().ok());
        if let (Some(id), Some(value)) = (id, value) {
            if let Some(r) = out.get_mut(id) {
                r.irradiance = Some(value);
            }
        }
    }
    out
}

/// Earth-sun distance in astronomical units for a day of year.
fn sun_earth_distance(day_of_year: u32) -> f64 {
    1.0 - 0.01672 * (0.9856 * (f64::from(day_of_year) - 4.0)).to_radians().cos()
}

impl DimapProduct {
    fn sun_angles(&self) -> Result<(f64, f64)> {
        self.sun_angles.ok_or_else(|| {
            Error::invalid_product(format!(
                "no mean sun angles at the scene centre of {}",
                self.info.name
            ))
        })
    }
}

impl Product for DimapProduct {
    fn info(&self) -> &ProductInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ProductInfo {
        &mut self.info
    }

    fn files(&self) -> &ProductFiles {
        &self.files
    }

    fn crs(&self) -> Result<Crs> {
        Ok(self.crs.clone())
    }

    fn extent(&self) -> Result<Envelope> {
        Ok(self.extent)
    }

    fn footprint(&self, _io: &dyn RasterIo) -> Result<Polygon> {
        Ok(Polygon::from_envelope(&self.extent))
    }

    fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Xml(XmlDoc::parse(&self.files.read_to_string(&self.dim)?)?))
    }

    fn band_source(&self, band: Band, _resolution: f64) -> Result<BandSource> {
        if !self.info.band_map.contains_key(&band) {
            return Err(unmapped(&self.info, band));
        }
        let index = self
            .raster_index(band)
            .ok_or_else(|| unmapped(&self.info, band))?;
        Ok(BandSource::Native {
            path: self.files.gdal_path(&self.raster),
            index,
        })
    }

    fn cloud_bands(&self) -> &[CloudBand] {
        &[CloudBand::RawClouds, CloudBand::Clouds, CloudBand::AllClouds]
    }

    fn cloud_source(&self, _io: &dyn RasterIo) -> Result<CloudSource> {
        let mask = self.files.find_one(r"(^|/)MASKS/CLD_[^/]*\.GML$")?;
        let polygons: Vec<Polygon> = parse_gml_masks(&self.files.read_to_string(&mask)?)?
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| p.exterior.len() >= 3)
            .collect();
        if polygons.is_empty() {
            return Ok(CloudSource::Clear);
        }
        Ok(CloudSource::Vector {
            opaque: polygons,
            cirrus: Vec::new(),
        })
    }

    /// DN to top-of-atmosphere reflectance through radiance,
    /// `L = DN / gain + bias`, `R = pi * L * d^2 / (E0 * cos(SZA))`.
    fn calibrate(&self, band: Band, data: &mut Array2<f32>, _io: &dyn RasterIo) -> Result<()> {
        let id = self
            .info
            .band_map
            .get(&band)
            .ok_or_else(|| unmapped(&self.info, band))?;
        let coeffs = self.radiometry.get(id).ok_or_else(|| {
            Error::invalid_product(format!(
                "no radiometric coefficients for band {id} in {}",
                self.info.name
            ))
        })?;
        if coeffs.gain == 0.0 {
            return Err(Error::invalid_product(format!("null gain for band {id}")));
        }
        let (gain, bias) = (coeffs.gain as f32, coeffs.bias as f32);
        let e0 = coeffs.irradiance.ok_or_else(|| {
            Error::invalid_product(format!(
                "no solar irradiance for band {id} in {}",
                self.info.name
            ))
        })?;
        let (_, zenith) = self.sun_angles()?;
        let d = sun_earth_distance(self.info.datetime.ordinal());
        let factor = (d * d / (e0 * zenith.to_radians().cos())) as f32;
        data.mapv_inplace(|dn| PI * (dn / gain + bias) * factor);
        Ok(())
    }

    fn as_optical(&self) -> Option<&dyn OpticalProduct> {
        Some(self)
    }
}

impl OpticalProduct for DimapProduct {
    fn get_mean_sun_angles(&self, _io: &dyn RasterIo) -> Result<(f64, f64)> {
        self.sun_angles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::GdalRasterIo;
    use std::fs;

    const DIM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Dimap_Document name="DIM_PHR1A_MS_202005271043178_ORT_5290009101.XML">
  <Processing_Information><Product_Settings>
    <PROCESSING_LEVEL>ORTHO</PROCESSING_LEVEL>
    <SPECTRAL_PROCESSING>MS</SPECTRAL_PROCESSING>
  </Product_Settings></Processing_Information>
  <Dataset_Sources><Source_Identification><Strip_Source>
    <IMAGING_DATE>2020-05-27</IMAGING_DATE>
    <IMAGING_TIME>10:43:17.8Z</IMAGING_TIME>
  </Strip_Source></Source_Identification></Dataset_Sources>
  <Coordinate_Reference_System><Projected_CRS>
    <PROJECTED_CRS_CODE>urn:ogc:def:crs:EPSG::32632</PROJECTED_CRS_CODE>
  </Projected_CRS></Coordinate_Reference_System>
  <Geoposition><Geoposition_Insert>
    <ULXMAP>300001.0</ULXMAP><ULYMAP>5000001.0</ULYMAP><XDIM>2.0</XDIM><YDIM>2.0</YDIM>
  </Geoposition_Insert></Geoposition>
  <Raster_Data>
    <Data_Access><Data_Files><Data_File tile_R="1" tile_C="1">
      <DATA_FILE_PATH href="IMG_PHR1A_MS_202005271043178_ORT_5290009101_R1C1.TIF"/>
    </Data_File></Data_Files></Data_Access>
    <Raster_Dimensions><NROWS>500</NROWS><NCOLS>1000</NCOLS><NBANDS>4</NBANDS></Raster_Dimensions>
  </Raster_Data>
  <Radiometric_Data><Radiometric_Calibration><Instrument_Calibration><Band_Measurement_List>
    <Band_Radiance><BAND_ID>B2</BAND_ID><GAIN>10.0</GAIN><BIAS>0</BIAS></Band_Radiance>
    <Band_Solar_Irradiance><BAND_ID>B2</BAND_ID><VALUE>1500</VALUE></Band_Solar_Irradiance>
  </Band_Measurement_List></Instrument_Calibration></Radiometric_Calibration></Radiometric_Data>
  <Geometric_Data><Use_Area>
    <Located_Geometric_Values>
      <LOCATION_TYPE>Center</LOCATION_TYPE>
      <Solar_Incidences><SUN_AZIMUTH>150.0</SUN_AZIMUTH><SUN_ELEVATION>30.0</SUN_ELEVATION></Solar_Incidences>
    </Located_Geometric_Values>
  </Use_Area></Geometric_Data>
</Dimap_Document>"#;

    const CLD: &str = r#"<ogr:FeatureCollection xmlns:ogr="http://ogr.maptools.org/" xmlns:gml="http://www.opengis.net/gml">
  <gml:featureMember><ogr:mask><ogr:geometryProperty><gml:Polygon><gml:exterior><gml:LinearRing>
    <gml:posList>300100 5000000 300200 5000000 300200 4999900 300100 4999900 300100 5000000</gml:posList>
  </gml:LinearRing></gml:exterior></gml:Polygon></ogr:geometryProperty></ogr:mask></gml:featureMember>
</ogr:FeatureCollection>"#;

    fn open_fake() -> (tempfile::TempDir, DimapProduct) {
        open_with(DIM)
    }

    /// DIM document without the element enclosed by `<tag>...</tag>`.
    fn without(tag: &str) -> String {
        let start = DIM.find(&format!("<{tag}>")).unwrap();
        let end_tag = format!("</{tag}>");
        let end = DIM.find(&end_tag).unwrap() + end_tag.len();
        format!("{}{}", &DIM[..start], &DIM[end..])
    }

    fn open_with(dim: &str) -> (tempfile::TempDir, DimapProduct) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("IMG_PHR1A_MS_001");
        fs::create_dir_all(root.join("MASKS")).unwrap();
        fs::write(root.join("DIM_PHR1A_MS_202005271043178_ORT_5290009101.XML"), dim).unwrap();
        fs::write(root.join("IMG_PHR1A_MS_202005271043178_ORT_5290009101_R1C1.TIF"), b"").unwrap();
        fs::write(root.join("MASKS/CLD_PHR1A_MS_202005271043178_ORT_5290009101_MSK.GML"), CLD).unwrap();
        let files = ProductFiles::new(&root).unwrap();
        let prod = DimapProduct::new(&root, files, Sensor::Pleiades).unwrap();
        (dir, prod)
    }

    #[test]
    fn reads_identity_and_geometry() {
        let (_dir, prod) = open_fake();
        assert_eq!(prod.info().condensed_name, "20200527T104317_PLD_MS_ORTHO");
        assert_eq!(prod.info().resolution, 2.0);
        assert_eq!(prod.crs().unwrap().epsg(), Some(32632));
        let ext = prod.extent().unwrap();
        assert_eq!((ext.min_x, ext.max_y), (300000.0, 5000002.0));
        assert_eq!((ext.width(), ext.height()), (2000.0, 1000.0));
    }

    #[test]
    fn multispectral_bands_share_one_raster() {
        let (_dir, prod) = open_fake();
        match prod.band_source(Band::Optical(OpticalBand::Nir), 2.0).unwrap() {
            BandSource::Native { path, index } => {
                assert_eq!(index, 4);
                assert!(path.to_string_lossy().ends_with("_R1C1.TIF"));
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert!(prod.band_source(Band::Optical(OpticalBand::Pan), 2.0).is_err());
    }

    #[test]
    fn toa_reflectance_from_gain_and_irradiance() {
        let (_dir, prod) = open_fake();
        let (az, zen) = prod.get_mean_sun_angles(&GdalRasterIo).unwrap();
        assert_eq!((az, zen), (150.0, 60.0));

        let mut data = Array2::from_elem((1, 1), 1000.0f32);
        prod.calibrate(Band::Optical(OpticalBand::Red), &mut data, &GdalRasterIo)
            .unwrap();
        let d = sun_earth_distance(148);
        let expected = std::f64::consts::PI * 100.0 * d * d / (1500.0 * 0.5);
        approx::assert_abs_diff_eq!(f64::from(data[[0, 0]]), expected, epsilon = 1e-4);
    }

    #[test]
    fn missing_radiometry_is_an_error_not_raw_dn() {
        let (_dir, prod) = open_with(&without("Radiometric_Data"));
        let mut data = Array2::from_elem((1, 1), 1234.0f32);
        let err = prod
            .calibrate(Band::Optical(OpticalBand::Red), &mut data, &GdalRasterIo)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProduct(_)));
        assert_eq!(data[[0, 0]], 1234.0);
    }

    #[test]
    fn missing_irradiance_is_an_error_not_radiance() {
        let (_dir, prod) = open_with(&without("Band_Solar_Irradiance"));
        let mut data = Array2::from_elem((1, 1), 1000.0f32);
        let err = prod
            .calibrate(Band::Optical(OpticalBand::Red), &mut data, &GdalRasterIo)
            .unwrap_err();
        assert!(err.to_string().contains("irradiance"));
        assert_eq!(data[[0, 0]], 1000.0);
    }

    #[test]
    fn missing_sun_angles_are_reported() {
        let (_dir, prod) = open_with(&without("Solar_Incidences"));
        assert!(matches!(
            prod.get_mean_sun_angles(&GdalRasterIo),
            Err(Error::InvalidProduct(_))
        ));
        let mut data = Array2::from_elem((1, 1), 1000.0f32);
        assert!(prod
            .calibrate(Band::Optical(OpticalBand::Red), &mut data, &GdalRasterIo)
            .is_err());
    }

    #[test]
    fn cloud_mask_polygons() {
        let (_dir, prod) = open_fake();
        match prod.cloud_source(&GdalRasterIo).unwrap() {
            CloudSource::Vector { opaque, cirrus } => {
                assert_eq!(opaque.len(), 1);
                assert!(cirrus.is_empty());
            }
            other => panic!("unexpected cloud source {other:?}"),
        }
    }

    #[test]
    fn sun_earth_distance_is_near_one_au() {
        assert!((sun_earth_distance(4) - 0.98328).abs() < 1e-5);
        assert!((sun_earth_distance(186) - 1.0167).abs() < 1e-3);
    }
}
