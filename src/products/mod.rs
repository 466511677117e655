//! One acquisition behind a uniform contract.
//!
//! Every sensor implements [`Product`]: identity and band map live in the
//! shared [`ProductInfo`] record, geometry and band sources are per sensor.
//! Optical sensors additionally implement [`OpticalProduct`], radar sensors
//! [`SarProduct`]. Implementations are selected by [`crate::reader::Reader`].
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::Serialize;

use crate::bands::{Band, CloudBand, OpticalBand, SarBand, TerrainBand, Token};
use crate::config::GraphKind;
use crate::core::geocode::artifact_path;
use crate::core::geometry::Polygon;
use crate::core::raster::{Crs, Envelope};
use crate::error::{Error, Result};
use crate::io::xml::XmlDoc;
use crate::io::{ProductFiles, RasterIo};
use crate::types::{Sensor, SensorFamily};

pub mod optical;
pub mod sar;

pub use optical::{DimapProduct, S2Product, S3Product};
pub use sar::{CskProduct, Rs2Product, S1Product};

pub const DATETIME_FMT: &str = "%Y%m%dT%H%M%S";

/// Identity and bookkeeping shared by every sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductInfo {
    pub path: PathBuf,
    pub name: String,
    pub condensed_name: String,
    pub datetime: NaiveDateTime,
    pub sensor: Sensor,
    pub product_type: String,
    /// Native default resolution in metres.
    pub resolution: f64,
    /// Where derived artifacts (geocoded bands, DEM crops) are cached.
    pub output_dir: PathBuf,
    /// Canonical band to sensor-native designator.
    pub band_map: BTreeMap<Band, String>,
}

impl ProductInfo {
    /// Condensed name is `{datetime}_{sensor}_{detail}_{type}`, `detail` skipped when empty.
    pub fn new(
        path: &Path,
        name: String,
        sensor: Sensor,
        datetime: NaiveDateTime,
        detail: &str,
        product_type: String,
        resolution: f64,
    ) -> Self {
        let mut parts = vec![datetime.format(DATETIME_FMT).to_string(), sensor.tag().to_string()];
        if !detail.is_empty() {
            parts.push(detail.to_string());
        }
        parts.push(product_type.clone());
        let condensed_name = parts.join("_");
        let output_dir = std::env::temp_dir().join(format!("eobands_{condensed_name}"));
        Self {
            path: path.to_path_buf(),
            name,
            condensed_name,
            datetime,
            sensor,
            product_type,
            resolution,
            output_dir,
            band_map: BTreeMap::new(),
        }
    }

    pub fn datetime_str(&self) -> String {
        self.datetime.format(DATETIME_FMT).to_string()
    }

    /// Append a discriminating suffix to the condensed name (and default output dir).
    pub fn extend_condensed_name(&mut self, suffix: &str) {
        self.condensed_name = format!("{}_{}", self.condensed_name, suffix);
        self.output_dir = std::env::temp_dir().join(format!("eobands_{}", self.condensed_name));
    }
}

/// Parsed product metadata: a markup tree with its namespace, or a flat table.
#[derive(Debug, Clone, PartialEq)]
pub enum Mtd {
    Xml(XmlDoc),
    Table(BTreeMap<String, String>),
}

impl Mtd {
    pub fn as_xml(&self) -> Result<&XmlDoc> {
        match self {
            Mtd::Xml(doc) => Ok(doc),
            Mtd::Table(_) => Err(Error::InvalidType("metadata is a table, not XML".into())),
        }
    }
}

/// Where the pixels of a band come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandSource {
    /// Map-projected raster readable as is; `index` is the 1-based raster band.
    Native { path: PathBuf, index: usize },
    /// Produced by the external processing cache.
    Geocoded,
}

/// What the external processing graph needs to geocode a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodingJob {
    pub graph: GraphKind,
    /// Path handed to the graph's reader.
    pub input: PathBuf,
    /// File stem of each band inside the intermediate `.data` folder.
    pub band_files: BTreeMap<Band, String>,
}

/// Source of the cloud bands: a bit-plane raster or polygons in product CRS.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudSource {
    Raster {
        path: PathBuf,
        opaque: usize,
        cirrus: Option<usize>,
    },
    Vector {
        opaque: Vec<Polygon>,
        cirrus: Vec<Polygon>,
    },
    /// The product declares no clouds.
    Clear,
}

const OPTICAL_DEFAULTS: [OpticalBand; 5] = [
    OpticalBand::Green,
    OpticalBand::Red,
    OpticalBand::Blue,
    OpticalBand::Nir,
    OpticalBand::Pan,
];

pub trait Product: fmt::Debug + Send + Sync {
    fn info(&self) -> &ProductInfo;

    fn info_mut(&mut self) -> &mut ProductInfo;

    fn files(&self) -> &ProductFiles;

    /// Projected, metric CRS the product is loaded in.
    fn crs(&self) -> Result<Crs>;

    fn extent(&self) -> Result<Envelope>;

    /// Valid-data boundary in product CRS.
    fn footprint(&self, io: &dyn RasterIo) -> Result<Polygon>;

    fn read_mtd(&self) -> Result<Mtd>;

    /// Source of an optical or radar band at the wanted resolution.
    fn band_source(&self, band: Band, resolution: f64) -> Result<BandSource>;

    /// External geocoding description for sensors delivered in sensor geometry.
    fn geocoding(&self) -> Option<GeocodingJob> {
        None
    }

    fn cloud_bands(&self) -> &[CloudBand] {
        &[]
    }

    fn cloud_source(&self, _io: &dyn RasterIo) -> Result<CloudSource> {
        Ok(CloudSource::Clear)
    }

    /// Convert raw values (DN, radiance) to physical values in place.
    fn calibrate(&self, _band: Band, _data: &mut Array2<f32>, _io: &dyn RasterIo) -> Result<()> {
        Ok(())
    }

    fn as_optical(&self) -> Option<&dyn OpticalProduct> {
        None
    }

    fn as_sar(&self) -> Option<&dyn SarProduct> {
        None
    }

    fn family(&self) -> SensorFamily {
        self.info().sensor.family()
    }

    fn set_output_dir(&mut self, dir: PathBuf) {
        self.info_mut().output_dir = dir;
    }

    /// Whether the product can, in principle, supply `token`.
    fn has_band(&self, token: Token) -> bool {
        match token {
            Token::Index(index) => index
                .required_bands()
                .into_iter()
                .all(|b| self.has_band(Token::Band(b))),
            Token::Band(band @ (Band::Optical(_) | Band::Sar(_))) => {
                self.info().band_map.contains_key(&band)
            }
            Token::Band(Band::Terrain(TerrainBand::Hillshade)) => {
                self.family() == SensorFamily::Optical
            }
            Token::Band(Band::Terrain(_)) => true,
            Token::Band(Band::Cloud(c)) => self.cloud_bands().contains(&c),
        }
    }

    /// First available of GREEN, RED, BLUE, NIR, PAN for optical products,
    /// of VV, HH, VH, HV (raw before despeckled) for radar products.
    fn get_default_band(&self) -> Result<Band> {
        let map = &self.info().band_map;
        let candidates: Vec<Band> = match self.family() {
            SensorFamily::Optical => OPTICAL_DEFAULTS.iter().map(|b| Band::Optical(*b)).collect(),
            SensorFamily::Sar => SarBand::RAW
                .iter()
                .chain(SarBand::RAW.map(SarBand::despeckled).iter())
                .map(|b| Band::Sar(*b))
                .collect(),
        };
        candidates
            .into_iter()
            .find(|b| map.contains_key(b))
            .ok_or_else(|| {
                Error::invalid_product(format!("{} has no default band", self.info().name))
            })
    }

    /// Band files already on disk: native rasters, plus cached geocoded
    /// artifacts at the default resolution.
    fn get_existing_band_paths(&self) -> Result<BTreeMap<Band, PathBuf>> {
        let info = self.info();
        let mut out = BTreeMap::new();
        for band in info.band_map.keys() {
            match self.band_source(*band, info.resolution)? {
                BandSource::Native { path, .. } => {
                    out.insert(*band, path);
                }
                BandSource::Geocoded => {
                    let path = artifact_path(info, band.name(), info.resolution);
                    if path.is_file() {
                        out.insert(*band, path);
                    }
                }
            }
        }
        Ok(out)
    }
}

pub trait OpticalProduct: Product {
    /// Mean sun (azimuth, zenith) in degrees.
    fn get_mean_sun_angles(&self, io: &dyn RasterIo) -> Result<(f64, f64)>;
}

pub trait SarProduct: Product {
    fn sensor_mode(&self) -> &str;

    fn pol_channels(&self) -> Vec<SarBand>;
}

/// `InvalidBand` for a band the product does not map.
pub(crate) fn unmapped(info: &ProductInfo, band: Band) -> Error {
    Error::invalid_band(band, format!("not available in {}", info.name))
}

/// Parse a datetime with any of the given formats.
pub(crate) fn parse_datetime(text: &str, formats: &[&str]) -> Result<NaiveDateTime> {
    formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text.trim(), f).ok())
        .ok_or_else(|| Error::invalid_product(format!("unparseable date {text:?}")))
}
