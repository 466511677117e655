//! Radar sensors: Sentinel-1, RADARSAT-2 and COSMO-SkyMed.
//!
//! All three are delivered in sensor geometry. Their bands are produced by the
//! external geocoding graph, on a UTM grid derived from the WGS84 footprint.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::bands::{Band, SarBand};
use crate::config::{Config, GraphKind};
use crate::core::geometry::{wgs84_to_local_utm, Polygon};
use crate::core::raster::{Crs, Envelope};
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::xml::XmlDoc;
use crate::io::ProductFiles;
use crate::products::{unmapped, BandSource, GeocodingJob, Mtd, ProductInfo};
use crate::types::Sensor;

pub mod csk;
pub mod rs2;
pub mod s1;

pub use csk::CskProduct;
pub use rs2::Rs2Product;
pub use s1::S1Product;

/// What a radar reader extracts before the shared state is assembled.
#[derive(Debug, Clone)]
pub(crate) struct SarIdentity {
    pub datetime: NaiveDateTime,
    pub mode: String,
    pub product_type: String,
    pub native_resolution: f64,
    pub pols: Vec<SarBand>,
    /// WGS84 (lon, lat) footprint.
    pub footprint: Polygon,
    /// Relative path of the main metadata file.
    pub mtd: String,
    /// What the geocoding graph reads.
    pub graph_input: PathBuf,
}

/// State shared by every radar product.
#[derive(Debug)]
pub(crate) struct SarCore {
    pub info: ProductInfo,
    pub files: ProductFiles,
    pub mode: String,
    pub pols: Vec<SarBand>,
    pub crs: Crs,
    pub extent: Envelope,
    pub footprint: Polygon,
    pub mtd: String,
    pub graph_input: PathBuf,
}

impl SarCore {
    pub fn new(
        path: &Path,
        files: ProductFiles,
        sensor: Sensor,
        id: SarIdentity,
        config: &Config,
    ) -> Result<Self> {
        if id.pols.is_empty() {
            return Err(Error::invalid_product(format!(
                "{} declares no polarization",
                path.display()
            )));
        }
        let (crs, footprint, extent) = wgs84_to_local_utm(&id.footprint)?;
        let resolution = config
            .sar_default_resolution
            .unwrap_or(id.native_resolution);
        let mut info = ProductInfo::new(
            path,
            product_name(path),
            sensor,
            id.datetime,
            &id.mode,
            id.product_type,
            resolution,
        );
        for pol in &id.pols {
            for band in [*pol, pol.despeckled()] {
                info.band_map.insert(Band::Sar(band), pol.name().to_string());
            }
        }
        debug!(
            "Opened {} {} product with {:?} in {}",
            sensor, id.mode, id.pols, crs
        );
        Ok(Self {
            info,
            files,
            mode: id.mode,
            pols: id.pols,
            crs,
            extent,
            footprint,
            mtd: id.mtd,
            graph_input: id.graph_input,
        })
    }

    pub fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Xml(XmlDoc::parse(&self.files.read_to_string(&self.mtd)?)?))
    }

    pub fn band_source(&self, band: Band) -> Result<BandSource> {
        if self.info.band_map.contains_key(&band) {
            Ok(BandSource::Geocoded)
        } else {
            Err(unmapped(&self.info, band))
        }
    }

    /// Calibrated, terrain-corrected backscatter is written as `Sigma0_{POL}`.
    pub fn geocoding(&self) -> GeocodingJob {
        let band_files: BTreeMap<Band, String> = self
            .info
            .band_map
            .iter()
            .filter(|(band, _)| matches!(band, Band::Sar(b) if !b.is_despeckled()))
            .map(|(band, pol)| (*band, format!("Sigma0_{pol}")))
            .collect();
        GeocodingJob {
            graph: GraphKind::SarGeocoding,
            input: self.graph_input.clone(),
            band_files,
        }
    }
}

/// Polarization from a channel label such as `HH`, `vv` or `V/H`.
pub(crate) fn parse_pol(text: &str) -> Option<SarBand> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();
    SarBand::RAW.into_iter().find(|b| b.name() == cleaned)
}

/// Implements [`crate::products::Product`] and [`crate::products::SarProduct`]
/// for a wrapper whose `core` field is a [`SarCore`].
macro_rules! delegate_sar_product {
    ($ty:ty) => {
        impl $crate::products::Product for $ty {
            fn info(&self) -> &$crate::products::ProductInfo {
                &self.core.info
            }

            fn info_mut(&mut self) -> &mut $crate::products::ProductInfo {
                &mut self.core.info
            }

            fn files(&self) -> &$crate::io::ProductFiles {
                &self.core.files
            }

            fn crs(&self) -> $crate::error::Result<$crate::core::raster::Crs> {
                Ok(self.core.crs.clone())
            }

            fn extent(&self) -> $crate::error::Result<$crate::core::raster::Envelope> {
                Ok(self.core.extent)
            }

            fn footprint(
                &self,
                _io: &dyn $crate::io::RasterIo,
            ) -> $crate::error::Result<$crate::core::geometry::Polygon> {
                Ok(self.core.footprint.clone())
            }

            fn read_mtd(&self) -> $crate::error::Result<$crate::products::Mtd> {
                self.core.read_mtd()
            }

            fn band_source(
                &self,
                band: $crate::bands::Band,
                _resolution: f64,
            ) -> $crate::error::Result<$crate::products::BandSource> {
                self.core.band_source(band)
            }

            fn geocoding(&self) -> Option<$crate::products::GeocodingJob> {
                Some(self.core.geocoding())
            }

            fn as_sar(&self) -> Option<&dyn $crate::products::SarProduct> {
                Some(self)
            }
        }

        impl $crate::products::SarProduct for $ty {
            fn sensor_mode(&self) -> &str {
                &self.core.mode
            }

            fn pol_channels(&self) -> Vec<$crate::bands::SarBand> {
                self.core.pols.clone()
            }
        }
    };
}

pub(crate) use delegate_sar_product;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarization_labels() {
        assert_eq!(parse_pol("HH"), Some(SarBand::Hh));
        assert_eq!(parse_pol("v/h"), Some(SarBand::Vh));
        assert_eq!(parse_pol("XX"), None);
    }
}
