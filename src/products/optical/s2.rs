//! Sentinel-2 MSI, Level-1C and Level-2A, in SAFE directories or zip archives.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array2;
use tracing::{debug, warn};

use crate::bands::{Band, CloudBand, OpticalBand};
use crate::core::geometry::{convex_hull, footprint_of_valid, Polygon};
use crate::core::raster::{Crs, Envelope, Grid};
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::xml::{XmlDoc, XmlElement};
use crate::io::{ProductFiles, RasterIo};
use crate::products::optical::parse_gml_masks;
use crate::products::{
    parse_datetime, unmapped, BandSource, CloudSource, Mtd, OpticalProduct, Product,
    ProductInfo, DATETIME_FMT,
};
use crate::types::Sensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2Level {
    L1C,
    L2A,
}

impl S2Level {
    fn as_str(self) -> &'static str {
        match self {
            S2Level::L1C => "L1C",
            S2Level::L2A => "L2A",
        }
    }
}

struct S2Band {
    band: OpticalBand,
    id: &'static str,
    /// Position in the datatake metadata band lists (`band_id` attribute).
    order: usize,
    /// L2A resolution folders holding the band, best first.
    l2a_dirs: &'static [u32],
}

const S2_BANDS: [S2Band; 13] = [
    S2Band { band: OpticalBand::Ca, id: "B01", order: 0, l2a_dirs: &[60] },
    S2Band { band: OpticalBand::Blue, id: "B02", order: 1, l2a_dirs: &[10, 20, 60] },
    S2Band { band: OpticalBand::Green, id: "B03", order: 2, l2a_dirs: &[10, 20, 60] },
    S2Band { band: OpticalBand::Red, id: "B04", order: 3, l2a_dirs: &[10, 20, 60] },
    S2Band { band: OpticalBand::Vre1, id: "B05", order: 4, l2a_dirs: &[20, 60] },
    S2Band { band: OpticalBand::Vre2, id: "B06", order: 5, l2a_dirs: &[20, 60] },
    S2Band { band: OpticalBand::Vre3, id: "B07", order: 6, l2a_dirs: &[20, 60] },
    S2Band { band: OpticalBand::Nir, id: "B08", order: 7, l2a_dirs: &[10] },
    S2Band { band: OpticalBand::NarrowNir, id: "B8A", order: 8, l2a_dirs: &[20, 60] },
    S2Band { band: OpticalBand::Wv, id: "B09", order: 9, l2a_dirs: &[60] },
    S2Band { band: OpticalBand::SwirCirrus, id: "B10", order: 10, l2a_dirs: &[] },
    S2Band { band: OpticalBand::Swir1, id: "B11", order: 11, l2a_dirs: &[20, 60] },
    S2Band { band: OpticalBand::Swir2, id: "B12", order: 12, l2a_dirs: &[20, 60] },
];

const DEFAULT_QUANTIFICATION: f64 = 10_000.0;
const DEFAULT_OFFSET: f64 = -1000.0;
/// Processing baseline from which offsets and raster masks are used.
const BASELINE_04: f64 = 4.0;

fn s2_band(band: OpticalBand) -> Option<&'static S2Band> {
    S2_BANDS.iter().find(|b| b.band == band)
}

/// DN to reflectance conversion parameters.
#[derive(Debug, Clone, PartialEq)]
struct Radiometry {
    quantification: f64,
    offsets: BTreeMap<usize, f64>,
    default_offset: f64,
}

impl Radiometry {
    fn fallback(baseline: f64) -> Self {
        Self {
            quantification: DEFAULT_QUANTIFICATION,
            offsets: BTreeMap::new(),
            default_offset: if baseline >= BASELINE_04 { DEFAULT_OFFSET } else { 0.0 },
        }
    }

    fn parse(doc: &XmlDoc, level: S2Level, baseline: f64) -> Result<Self> {
        let (quantif_tag, offset_tag) = match level {
            S2Level::L1C => ("QUANTIFICATION_VALUE", "RADIO_ADD_OFFSET"),
            S2Level::L2A => ("BOA_QUANTIFICATION_VALUE", "BOA_ADD_OFFSET"),
        };
        let quantification = doc.root.require_f64(quantif_tag)?;
        let mut offsets = BTreeMap::new();
        if baseline >= BASELINE_04 {
            for el in doc.root.descendants(offset_tag) {
                let id = el.attr("band_id").and_then(|v| v.parse::<usize>().ok());
                let value = el.text.trim().parse::<f64>().ok();
                if let (Some(id), Some(value)) = (id, value) {
                    offsets.insert(id, value);
                }
            }
        }
        Ok(Self {
            quantification,
            offsets,
            default_offset: if baseline >= BASELINE_04 { DEFAULT_OFFSET } else { 0.0 },
        })
    }

    fn offset(&self, order: usize) -> f64 {
        self.offsets.get(&order).copied().unwrap_or(self.default_offset)
    }
}

#[derive(Debug)]
pub struct S2Product {
    info: ProductInfo,
    files: ProductFiles,
    level: S2Level,
    tile: String,
    baseline: f64,
    tile_mtd: String,
    crs: Crs,
    extent: Envelope,
    sun_angles: Option<(f64, f64)>,
    radiometry: Radiometry,
}

impl S2Product {
    /// `path` names the product, `files` gives access to its content.
    pub fn new(path: &Path, files: ProductFiles) -> Result<Self> {
        let name = product_name(path);
        let parts: Vec<&str> = name.split('_').filter(|p| !p.is_empty()).collect();
        if parts.len() < 7 {
            return Err(Error::invalid_product(format!(
                "{name} is not a Sentinel-2 product name"
            )));
        }
        let level = match parts[1] {
            "MSIL1C" => S2Level::L1C,
            "MSIL2A" => S2Level::L2A,
            other => {
                return Err(Error::invalid_product(format!(
                    "unsupported Sentinel-2 product type {other}"
                )))
            }
        };
        let baseline = parts[3]
            .get(1..)
            .and_then(|b| b.parse::<f64>().ok())
            .map(|b| b / 100.0)
            .ok_or_else(|| Error::invalid_product(format!("bad processing baseline in {name}")))?;
        let datetime = parse_datetime(parts[2], &[DATETIME_FMT])?;
        let tile = parts[parts.len() - 2].to_string();
        let generation = parts[parts.len() - 1]
            .split('T')
            .nth(1)
            .unwrap_or_default()
            .to_string();

        let tile_mtd = files.find_one(r"GRANULE/[^/]+/MTD_TL\.xml$")?;
        let tile_doc = XmlDoc::parse(&files.read_to_string(&tile_mtd)?)?;
        let crs = Crs::parse(tile_doc.root.require("HORIZONTAL_CS_CODE")?)?;
        let extent = tile_extent(&tile_doc.root)?;
        let sun_angles = sun_angles(&tile_doc.root);

        let radiometry = files
            .find_one(r"(^|/)MTD_MSIL(1C|2A)\.xml$")
            .and_then(|rel| files.read_to_string(&rel))
            .and_then(|text| XmlDoc::parse(&text))
            .and_then(|doc| Radiometry::parse(&doc, level, baseline))
            .unwrap_or_else(|e| {
                warn!("Using default Sentinel-2 radiometry for {}: {}", name, e);
                Radiometry::fallback(baseline)
            });

        let mut info = ProductInfo::new(
            path,
            name,
            Sensor::Sentinel2,
            datetime,
            &tile,
            level.as_str().to_string(),
            10.0,
        );
        if !generation.is_empty() {
            info.extend_condensed_name(&generation);
        }
        for b in &S2_BANDS {
            if level == S2Level::L2A && b.l2a_dirs.is_empty() {
                continue;
            }
            info.band_map.insert(Band::Optical(b.band), b.id.to_string());
        }
        debug!(
            "Opened Sentinel-2 {} tile {} (baseline {:.2})",
            level.as_str(),
            tile,
            baseline
        );

        Ok(Self {
            info,
            files,
            level,
            tile,
            baseline,
            tile_mtd,
            crs,
            extent,
            sun_angles,
            radiometry,
        })
    }

    pub fn level(&self) -> S2Level {
        self.level
    }

    pub fn tile(&self) -> &str {
        &self.tile
    }

    pub fn processing_baseline(&self) -> f64 {
        self.baseline
    }

    fn qi_file(&self, stem: &str, ext: &str) -> Result<String> {
        self.files
            .find_one(&format!(r"GRANULE/[^/]+/QI_DATA/{stem}\.{ext}$"))
    }

    fn optical_band(band: Band) -> Option<&'static S2Band> {
        match band {
            Band::Optical(b) => s2_band(b),
            _ => None,
        }
    }
}

fn tile_extent(root: &XmlElement) -> Result<Envelope> {
    let at_10m = |name: &str| {
        root.descendants(name)
            .into_iter()
            .find(|el| el.attr("resolution") == Some("10"))
            .ok_or_else(|| Error::invalid_product(format!("missing 10 m `{name}` in tile metadata")))
    };
    let geopos = at_10m("Geoposition")?;
    let size = at_10m("Size")?;
    let ulx = geopos.require_f64("ULX")?;
    let uly = geopos.require_f64("ULY")?;
    let nrows = size.require_f64("NROWS")?;
    let ncols = size.require_f64("NCOLS")?;
    Ok(Envelope::new(ulx, uly - nrows * 10.0, ulx + ncols * 10.0, uly))
}

fn sun_angles(root: &XmlElement) -> Option<(f64, f64)> {
    let mean = root.find("Mean_Sun_Angle")?;
    let zenith = mean.text_of("ZENITH_ANGLE")?.parse().ok()?;
    let azimuth = mean.text_of("AZIMUTH_ANGLE")?.parse().ok()?;
    Some((azimuth, zenith))
}

impl Product for S2Product {
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

    /// Convex hull of the detector footprint of the default band.
    fn footprint(&self, io: &dyn RasterIo) -> Result<Polygon> {
        let default = self.get_default_band()?;
        let id = Self::optical_band(default)
            .map(|b| b.id)
            .ok_or_else(|| unmapped(&self.info, default))?;
        let stem = format!("MSK_DETFOO_{id}");
        let hull = if self.baseline >= BASELINE_04 {
            let rel = self.qi_file(&stem, "jp2")?;
            let raster = io.read(&self.files.gdal_path(&rel), 1)?;
            let (height, width) = raster.shape();
            let grid = Grid {
                crs: raster.crs.clone().unwrap_or_else(|| self.crs.clone()),
                transform: raster.transform,
                width,
                height,
            };
            footprint_of_valid(&raster.data.mapv(|v| v != 0.0), &grid)
        } else {
            let rel = self.qi_file(&stem, "gml")?;
            let masks = parse_gml_masks(&self.files.read_to_string(&rel)?)?;
            let points: Vec<(f64, f64)> = masks
                .iter()
                .flat_map(|(_, p)| p.exterior.iter().copied())
                .collect();
            convex_hull(&points)
        };
        Ok(hull.unwrap_or_else(|| {
            warn!("Empty detector footprint for {}, using the tile extent", self.info.name);
            Polygon::from_envelope(&self.extent)
        }))
    }

    fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Xml(XmlDoc::parse(
            &self.files.read_to_string(&self.tile_mtd)?,
        )?))
    }

    fn band_source(&self, band: Band, resolution: f64) -> Result<BandSource> {
        if !self.info.band_map.contains_key(&band) {
            return Err(unmapped(&self.info, band));
        }
        let b = Self::optical_band(band).ok_or_else(|| unmapped(&self.info, band))?;
        let pattern = match self.level {
            S2Level::L1C => format!(r"GRANULE/[^/]+/IMG_DATA/[^/]*_{}\.jp2$", b.id),
            S2Level::L2A => {
                let wanted = resolution.round() as u32;
                let dir = if b.l2a_dirs.contains(&wanted) {
                    wanted
                } else {
                    b.l2a_dirs[0]
                };
                format!(r"GRANULE/[^/]+/IMG_DATA/R{dir}m/[^/]*_{}_{dir}m\.jp2$", b.id)
            }
        };
        let rel = self.files.find_one(&pattern)?;
        Ok(BandSource::Native {
            path: self.files.gdal_path(&rel),
            index: 1,
        })
    }

    fn cloud_bands(&self) -> &[CloudBand] {
        &[
            CloudBand::RawClouds,
            CloudBand::Clouds,
            CloudBand::Cirrus,
            CloudBand::AllClouds,
        ]
    }

    fn cloud_source(&self, _io: &dyn RasterIo) -> Result<CloudSource> {
        if self.baseline >= BASELINE_04 {
            let rel = self.qi_file("MSK_CLASSI_B00", "jp2")?;
            return Ok(CloudSource::Raster {
                path: self.files.gdal_path(&rel),
                opaque: 1,
                cirrus: Some(2),
            });
        }
        let rel = self.qi_file("MSK_CLOUDS_B00", "gml")?;
        let masks = parse_gml_masks(&self.files.read_to_string(&rel)?)?;
        let mut opaque = Vec::new();
        let mut cirrus = Vec::new();
        for (kind, polygon) in masks {
            match kind.as_deref() {
                Some("OPAQUE") => opaque.push(polygon),
                Some("CIRRUS") => cirrus.push(polygon),
                _ => {}
            }
        }
        if opaque.is_empty() && cirrus.is_empty() {
            return Ok(CloudSource::Clear);
        }
        Ok(CloudSource::Vector { opaque, cirrus })
    }

    /// `(DN + offset) / quantification`
    fn calibrate(&self, band: Band, data: &mut Array2<f32>, _io: &dyn RasterIo) -> Result<()> {
        let b = Self::optical_band(band).ok_or_else(|| unmapped(&self.info, band))?;
        let offset = self.radiometry.offset(b.order) as f32;
        let quantification = self.radiometry.quantification as f32;
        data.mapv_inplace(|v| (v + offset) / quantification);
        Ok(())
    }

    fn as_optical(&self) -> Option<&dyn OpticalProduct> {
        Some(self)
    }
}

impl OpticalProduct for S2Product {
    fn get_mean_sun_angles(&self, _io: &dyn RasterIo) -> Result<(f64, f64)> {
        self.sun_angles.ok_or_else(|| {
            Error::invalid_product(format!("no mean sun angles in {}", self.info.name))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bands::Token;
    use crate::io::GdalRasterIo;
    use std::fs;
    use std::path::PathBuf;

    pub(crate) const L2A_NAME: &str =
        "S2B_MSIL2A_20200114T065229_N0213_R020_T40REQ_20200114T094749.SAFE";

    pub(crate) const TILE_MTD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_Tile_ID xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/S2_PDI_Level-2A_Tile_Metadata.xsd">
  <n1:Geometric_Info>
    <Tile_Geocoding metadataLevel="Brief">
      <HORIZONTAL_CS_NAME>WGS84 / UTM zone 40N</HORIZONTAL_CS_NAME>
      <HORIZONTAL_CS_CODE>EPSG:32640</HORIZONTAL_CS_CODE>
      <Size resolution="10"><NROWS>10980</NROWS><NCOLS>10980</NCOLS></Size>
      <Size resolution="20"><NROWS>5490</NROWS><NCOLS>5490</NCOLS></Size>
      <Geoposition resolution="10"><ULX>399960</ULX><ULY>2800020</ULY><XDIM>10</XDIM><YDIM>-10</YDIM></Geoposition>
      <Geoposition resolution="20"><ULX>399960</ULX><ULY>2800020</ULY><XDIM>20</XDIM><YDIM>-20</YDIM></Geoposition>
    </Tile_Geocoding>
    <Tile_Angles>
      <Mean_Sun_Angle>
        <ZENITH_ANGLE unit="deg">48.5</ZENITH_ANGLE>
        <AZIMUTH_ANGLE unit="deg">157.25</AZIMUTH_ANGLE>
      </Mean_Sun_Angle>
    </Tile_Angles>
  </n1:Geometric_Info>
</n1:Level-2A_Tile_ID>"#;

    const DATATAKE_MTD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-2A.xsd">
  <n1:General_Info><Product_Image_Characteristics>
    <QUANTIFICATION_VALUES_LIST>
      <BOA_QUANTIFICATION_VALUE unit="none">10000</BOA_QUANTIFICATION_VALUE>
    </QUANTIFICATION_VALUES_LIST>
  </Product_Image_Characteristics></n1:General_Info>
</n1:Level-2A_User_Product>"#;

    const CLOUDS_GML: &str = r#"<eop:Mask xmlns:eop="http://www.opengis.net/eop/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
  <eop:maskMembers>
    <eop:MaskFeature gml:id="OPAQUE.0">
      <eop:maskType>OPAQUE</eop:maskType>
      <eop:extentOf><gml:Polygon><gml:exterior><gml:LinearRing>
        <gml:posList srsDimension="2">400000 2800000 401000 2800000 401000 2799000 400000 2799000 400000 2800000</gml:posList>
      </gml:LinearRing></gml:exterior></gml:Polygon></eop:extentOf>
    </eop:MaskFeature>
  </eop:maskMembers>
</eop:Mask>"#;

    /// A sparse L2A SAFE directory: metadata, one 10 m band folder and the QI masks.
    pub(crate) fn fake_l2a(root: &Path) -> PathBuf {
        let safe = root.join(L2A_NAME);
        let granule = safe.join("GRANULE/L2A_T40REQ_A014867_20200114T065228");
        let img = granule.join("IMG_DATA");
        for dir in ["R10m", "R20m", "R60m"] {
            fs::create_dir_all(img.join(dir)).unwrap();
        }
        fs::create_dir_all(granule.join("QI_DATA")).unwrap();
        fs::write(safe.join("MTD_MSIL2A.xml"), DATATAKE_MTD).unwrap();
        fs::write(granule.join("MTD_TL.xml"), TILE_MTD).unwrap();
        for (dir, id) in [
            ("R10m", "B02"),
            ("R10m", "B03"),
            ("R10m", "B04"),
            ("R10m", "B08"),
            ("R20m", "B03"),
            ("R20m", "B05"),
            ("R20m", "B8A"),
            ("R20m", "B11"),
            ("R60m", "B01"),
        ] {
            let res = &dir[1..];
            fs::write(img.join(dir).join(format!("T40REQ_20200114T065229_{id}_{res}.jp2")), b"").unwrap();
        }
        fs::write(granule.join("QI_DATA/MSK_CLOUDS_B00.gml"), CLOUDS_GML).unwrap();
        safe
    }

    fn open_fake() -> (tempfile::TempDir, S2Product) {
        let dir = tempfile::tempdir().unwrap();
        let safe = fake_l2a(dir.path());
        let files = ProductFiles::new(&safe).unwrap();
        let prod = S2Product::new(&safe, files).unwrap();
        (dir, prod)
    }

    #[test]
    fn identity_from_name_and_metadata() {
        let (_dir, prod) = open_fake();
        let info = prod.info();
        assert_eq!(info.name, "S2B_MSIL2A_20200114T065229_N0213_R020_T40REQ_20200114T094749");
        assert_eq!(info.condensed_name, "20200114T065229_S2_T40REQ_L2A_094749");
        assert_eq!(prod.level(), S2Level::L2A);
        assert!((prod.processing_baseline() - 2.13).abs() < 1e-9);
        assert_eq!(prod.crs().unwrap().epsg(), Some(32640));
        let ext = prod.extent().unwrap();
        assert_eq!(ext.min_x, 399960.0);
        assert_eq!(ext.max_y, 2800020.0);
        assert_eq!(ext.width(), 109800.0);
    }

    #[test]
    fn nir_is_the_10m_band() {
        let (_dir, prod) = open_fake();
        assert_eq!(
            prod.info().band_map.get(&Band::Optical(OpticalBand::Nir)).map(String::as_str),
            Some("B08")
        );
        assert!(!prod.has_band(Token::Band(Band::Optical(OpticalBand::SwirCirrus))));
    }

    #[test]
    fn l2a_band_folder_follows_resolution() {
        let (_dir, prod) = open_fake();
        let green = Band::Optical(OpticalBand::Green);
        let at = |res: f64| match prod.band_source(green, res).unwrap() {
            BandSource::Native { path, .. } => path,
            other => panic!("unexpected source {other:?}"),
        };
        assert!(at(10.0).to_string_lossy().ends_with("R10m/T40REQ_20200114T065229_B03_10m.jp2"));
        assert!(at(20.0).to_string_lossy().ends_with("R20m/T40REQ_20200114T065229_B03_20m.jp2"));
        // Not a native resolution: best folder, resampled later.
        assert!(at(30.0).to_string_lossy().contains("R10m"));

        let swir = prod.band_source(Band::Optical(OpticalBand::Swir1), 10.0).unwrap();
        assert!(matches!(swir, BandSource::Native { path, .. } if path.to_string_lossy().contains("R20m")));
    }

    #[test]
    fn default_band_and_sun_angles() {
        let (_dir, prod) = open_fake();
        assert_eq!(prod.get_default_band().unwrap(), Band::Optical(OpticalBand::Green));
        let (az, zen) = prod.get_mean_sun_angles(&GdalRasterIo).unwrap();
        assert_eq!((az, zen), (157.25, 48.5));
    }

    #[test]
    fn tile_without_mean_sun_angles() {
        let dir = tempfile::tempdir().unwrap();
        let safe = fake_l2a(dir.path());
        let tile = safe.join("GRANULE/L2A_T40REQ_A014867_20200114T065228/MTD_TL.xml");
        let start = TILE_MTD.find("<Mean_Sun_Angle>").unwrap();
        let end = TILE_MTD.find("</Mean_Sun_Angle>").unwrap() + "</Mean_Sun_Angle>".len();
        fs::write(&tile, format!("{}{}", &TILE_MTD[..start], &TILE_MTD[end..])).unwrap();

        let prod = S2Product::new(&safe, ProductFiles::new(&safe).unwrap()).unwrap();
        let err = prod.get_mean_sun_angles(&GdalRasterIo).unwrap_err();
        assert!(matches!(err, Error::InvalidProduct(_)));
        assert!(err.to_string().contains("no mean sun angles"));
    }

    #[test]
    fn old_baseline_clouds_come_from_gml() {
        let (_dir, prod) = open_fake();
        match prod.cloud_source(&GdalRasterIo).unwrap() {
            CloudSource::Vector { opaque, cirrus } => {
                assert_eq!(opaque.len(), 1);
                assert!(cirrus.is_empty());
            }
            other => panic!("unexpected cloud source {other:?}"),
        }
        assert!(prod.has_band(Token::Band(Band::Cloud(CloudBand::Cirrus))));
    }

    #[test]
    fn reflectance_uses_quantification_without_offset_before_baseline_4() {
        let (_dir, prod) = open_fake();
        let mut data = ndarray::array![[1000.0f32, 2500.0]];
        prod.calibrate(Band::Optical(OpticalBand::Red), &mut data, &GdalRasterIo)
            .unwrap();
        assert_eq!(data, ndarray::array![[0.1f32, 0.25]]);
    }

    #[test]
    fn new_baseline_defaults_to_minus_1000_offset() {
        let r = Radiometry::fallback(4.0);
        assert_eq!(r.offset(3), -1000.0);
        assert_eq!(Radiometry::fallback(2.09).offset(3), 0.0);
    }
}
