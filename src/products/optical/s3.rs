//! Sentinel-3 level-1 products: OLCI full resolution (EFR) and SLSTR
//! radiances (RBT).
//!
//! Radiances come in sensor geometry and are reprojected by the external
//! graph; geometry is taken from the manifest footprint.
use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::debug;

use crate::bands::{Band, OpticalBand};
use crate::config::{Config, GraphKind};
use crate::core::geometry::{wgs84_to_local_utm, Polygon};
use crate::core::raster::{Crs, Envelope};
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::xml::XmlDoc;
use crate::io::{ProductFiles, RasterIo};
use crate::products::{
    parse_datetime, unmapped, BandSource, GeocodingJob, Mtd, OpticalProduct, Product,
    ProductInfo, DATETIME_FMT,
};
use crate::types::Sensor;

const MANIFEST: &str = "xfdumanifest.xml";
const OLCI_INSTRUMENT_FILE: &str = "instrument_data.nc";
const OLCI_GEOMETRY_FILE: &str = "tie_geometries.nc";
const SLSTR_GEOMETRY_FILE: &str = "geometry_tn.nc";
pub const OLCI_DEFAULT_RESOLUTION: f64 = 300.0;
pub const SLSTR_DEFAULT_RESOLUTION: f64 = 500.0;

const OLCI_BANDS: [(OpticalBand, &str); 9] = [
    (OpticalBand::Blue, "Oa03"),
    (OpticalBand::Green, "Oa06"),
    (OpticalBand::Red, "Oa08"),
    (OpticalBand::Vre1, "Oa11"),
    (OpticalBand::Vre2, "Oa12"),
    (OpticalBand::Vre3, "Oa16"),
    (OpticalBand::Nir, "Oa17"),
    (OpticalBand::NarrowNir, "Oa17"),
    (OpticalBand::Wv, "Oa19"),
];

// Thermal channels S7 to S9 have no canonical band.
const SLSTR_BANDS: [(OpticalBand, &str); 7] = [
    (OpticalBand::Green, "S1"),
    (OpticalBand::Red, "S2"),
    (OpticalBand::Nir, "S3"),
    (OpticalBand::NarrowNir, "S3"),
    (OpticalBand::SwirCirrus, "S4"),
    (OpticalBand::Swir1, "S5"),
    (OpticalBand::Swir2, "S6"),
];

/// Instrument of a Sentinel-3 product, read from the product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Instrument {
    Olci,
    Slstr,
}

impl S3Instrument {
    /// `S3A_OL_1_EFR____...` or `S3B_SL_1_RBT____...`, split on `_`.
    fn from_name(parts: &[&str]) -> Option<Self> {
        match (parts.get(1), parts.get(3)) {
            (Some(&"OL"), Some(&"EFR")) => Some(S3Instrument::Olci),
            (Some(&"SL"), Some(&"RBT")) => Some(S3Instrument::Slstr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            S3Instrument::Olci => "OLCI",
            S3Instrument::Slstr => "SLSTR",
        }
    }

    pub fn product_type(self) -> &'static str {
        match self {
            S3Instrument::Olci => "EFR",
            S3Instrument::Slstr => "RBT",
        }
    }

    fn default_resolution(self) -> f64 {
        match self {
            S3Instrument::Olci => OLCI_DEFAULT_RESOLUTION,
            S3Instrument::Slstr => SLSTR_DEFAULT_RESOLUTION,
        }
    }

    fn bands(self) -> &'static [(OpticalBand, &'static str)] {
        match self {
            S3Instrument::Olci => &OLCI_BANDS,
            S3Instrument::Slstr => &SLSTR_BANDS,
        }
    }

    fn graph(self) -> GraphKind {
        match self {
            S3Instrument::Olci => GraphKind::S3Geocoding,
            S3Instrument::Slstr => GraphKind::SlstrGeocoding,
        }
    }

    /// Radiance variable of channel `id`; SLSTR channels are read on the nadir stripe.
    fn radiance(self, id: &str) -> String {
        match self {
            S3Instrument::Olci => format!("{id}_radiance"),
            S3Instrument::Slstr => format!("{id}_radiance_an"),
        }
    }

    /// (file, azimuth variable, zenith variable) of the solar angles.
    fn sun_angle_source(self) -> (&'static str, &'static str, &'static str) {
        match self {
            S3Instrument::Olci => (OLCI_GEOMETRY_FILE, "SAA", "SZA"),
            S3Instrument::Slstr => (SLSTR_GEOMETRY_FILE, "solar_azimuth_tn", "solar_zenith_tn"),
        }
    }
}

#[derive(Debug)]
pub struct S3Product {
    info: ProductInfo,
    files: ProductFiles,
    instrument: S3Instrument,
    manifest: String,
    crs: Crs,
    extent: Envelope,
    footprint: Polygon,
}

impl S3Product {
    pub fn new(path: &Path, files: ProductFiles, config: &Config) -> Result<Self> {
        let name = product_name(path);
        let parts: Vec<&str> = name.split('_').filter(|p| !p.is_empty()).collect();
        let instrument = match S3Instrument::from_name(&parts) {
            Some(instrument) if parts.len() >= 5 => instrument,
            _ => {
                return Err(Error::invalid_product(format!(
                    "{name} is neither a Sentinel-3 OLCI EFR nor an SLSTR RBT product"
                )))
            }
        };

        let manifest = files.find_one(&format!(r"(^|/){}$", regex::escape(MANIFEST)))?;
        let doc = XmlDoc::parse(&files.read_to_string(&manifest)?)?;
        let datetime = match doc.root.text_of("startTime") {
            Some(text) => parse_datetime(text, &["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.f"])?,
            None => parse_datetime(parts[4], &[DATETIME_FMT])?,
        };

        let pos = doc
            .root
            .find("posList")
            .ok_or_else(|| Error::invalid_product("no footprint in the Sentinel-3 manifest"))?;
        let values = pos
            .text
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::invalid_product(format!("bad manifest footprint: {e}")))?;
        // `lat lon` pairs
        let wgs84 = Polygon::new(values.chunks_exact(2).map(|c| (c[1], c[0])).collect());
        let (crs, footprint, extent) = wgs84_to_local_utm(&wgs84)?;

        let resolution = config
            .s3_default_resolution
            .unwrap_or(instrument.default_resolution());
        let mut info = ProductInfo::new(
            path,
            name,
            Sensor::Sentinel3,
            datetime,
            instrument.name(),
            instrument.product_type().to_string(),
            resolution,
        );
        for (band, id) in instrument.bands() {
            info.band_map.insert(Band::Optical(*band), id.to_string());
        }
        debug!("Opened Sentinel-3 {} product in {}", instrument.name(), crs);

        Ok(Self {
            info,
            files,
            instrument,
            manifest,
            crs,
            extent,
            footprint,
        })
    }

    pub fn instrument(&self) -> S3Instrument {
        self.instrument
    }

    fn netcdf(&self, file: &str, variable: &str) -> Result<PathBuf> {
        let rel = self
            .files
            .find_one(&format!(r"(^|/){}$", regex::escape(file)))?;
        Ok(PathBuf::from(format!(
            "NETCDF:\"{}\":{}",
            self.files.gdal_path(&rel).display(),
            variable
        )))
    }

    fn mean_of(&self, io: &dyn RasterIo, file: &str, variable: &str) -> Result<f64> {
        let raster = io.read(&self.netcdf(file, variable)?, 1)?;
        mean_valid(&raster.data, raster.nodata).ok_or_else(|| {
            Error::invalid_product(format!("{variable} in {file} has no valid value"))
        })
    }

    fn band_id(&self, band: Band) -> Result<&'static str> {
        match band {
            Band::Optical(b) => self
                .instrument
                .bands()
                .iter()
                .find(|(ob, _)| *ob == b)
                .map(|(_, id)| *id)
                .ok_or_else(|| unmapped(&self.info, band)),
            _ => Err(unmapped(&self.info, band)),
        }
    }

    /// Mean extraterrestrial solar flux of channel `id`.
    fn solar_flux(&self, id: &str, io: &dyn RasterIo) -> Result<f64> {
        match self.instrument {
            S3Instrument::Olci => {
                let number: usize = id[2..]
                    .parse()
                    .map_err(|_| Error::invalid_product(format!("bad OLCI channel {id}")))?;
                let flux = io.read(&self.netcdf(OLCI_INSTRUMENT_FILE, "solar_flux")?, 1)?;
                // One row per channel.
                let row = number - 1;
                if row >= flux.data.nrows() {
                    return Err(Error::invalid_product(format!("no solar flux for {id}")));
                }
                mean_valid(&flux.data.slice(ndarray::s![row..=row, ..]).to_owned(), flux.nodata)
                    .ok_or_else(|| Error::invalid_product(format!("no valid solar flux for {id}")))
            }
            S3Instrument::Slstr => self.mean_of(
                io,
                &format!("{id}_quality_an.nc"),
                &format!("{id}_solar_irradiance_an"),
            ),
        }
    }
}

fn mean_valid(data: &Array2<f32>, nodata: Option<f64>) -> Option<f64> {
    let (sum, count) = data
        .iter()
        .filter(|v| v.is_finite() && nodata.is_none_or(|nd| f64::from(**v) != nd))
        .fold((0.0f64, 0usize), |(s, c), v| (s + f64::from(*v), c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl Product for S3Product {
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
        Ok(self.footprint.clone())
    }

    fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Xml(XmlDoc::parse(
            &self.files.read_to_string(&self.manifest)?,
        )?))
    }

    fn band_source(&self, band: Band, _resolution: f64) -> Result<BandSource> {
        if self.info.band_map.contains_key(&band) {
            Ok(BandSource::Geocoded)
        } else {
            Err(unmapped(&self.info, band))
        }
    }

    fn geocoding(&self) -> Option<GeocodingJob> {
        let input = match &self.files {
            ProductFiles::Dir(_) => self.files.gdal_path(&self.manifest),
            ProductFiles::Zip(path) => path.clone(),
        };
        let band_files: BTreeMap<Band, String> = self
            .info
            .band_map
            .iter()
            .map(|(band, id)| (*band, self.instrument.radiance(id)))
            .collect();
        Some(GeocodingJob {
            graph: self.instrument.graph(),
            input,
            band_files,
        })
    }

    /// Radiance to top-of-atmosphere reflectance:
    /// `pi * L / (E0 * cos(SZA))` with the mean solar flux of the band.
    fn calibrate(&self, band: Band, data: &mut Array2<f32>, io: &dyn RasterIo) -> Result<()> {
        let id = self.band_id(band)?;
        let flux = self.solar_flux(id, io)?;
        let (_, sza) = self.get_mean_sun_angles(io)?;
        let denominator = (flux * sza.to_radians().cos()) as f32;
        if denominator <= 0.0 {
            return Err(Error::invalid_product(format!(
                "sun below horizon (SZA {sza:.2}) for {}",
                self.info.name
            )));
        }
        data.mapv_inplace(|rad| PI * rad / denominator);
        Ok(())
    }

    fn as_optical(&self) -> Option<&dyn OpticalProduct> {
        Some(self)
    }
}

impl OpticalProduct for S3Product {
    fn get_mean_sun_angles(&self, io: &dyn RasterIo) -> Result<(f64, f64)> {
        let (file, azimuth, zenith) = self.instrument.sun_angle_source();
        let az = self.mean_of(io, file, azimuth)?;
        let zen = self.mean_of(io, file, zenith)?;
        Ok((az.rem_euclid(360.0), zen))
    }
}
