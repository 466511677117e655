//! COSMO-SkyMed products: a folder (or archive) holding one HDF5 image and
//! its `.h5.xml` metadata.
use std::path::Path;

use tracing::warn;

use super::{delegate_sar_product, parse_pol, SarCore, SarIdentity};
use crate::bands::SarBand;
use crate::config::Config;
use crate::core::geometry::Polygon;
use crate::error::{Error, Result};
use crate::io::xml::{XmlDoc, XmlElement};
use crate::io::ProductFiles;
use crate::products::parse_datetime;
use crate::types::Sensor;

const MODES: [&str; 5] = ["HI", "PP", "WR", "HR", "S2"];
const PRODUCT_TYPES: [&str; 5] = ["RAW", "SCS", "DGM", "GEC", "GTC"];

/// Ground pixel spacing of detected products per mode.
fn mode_resolution(mode: &str) -> f64 {
    match mode {
        "S2" => 0.5,
        "PP" => 10.0,
        "WR" => 15.0,
        "HR" => 50.0,
        _ => 2.5,
    }
}

/// Channels of a polarization field, PingPong combinations included.
fn channels(field: &str) -> Vec<SarBand> {
    match field {
        "CO" => vec![SarBand::Hh, SarBand::Vv],
        "CH" => vec![SarBand::Hh, SarBand::Hv],
        "CV" => vec![SarBand::Vv, SarBand::Vh],
        other => parse_pol(other).into_iter().collect(),
    }
}

/// `lat lon [alt]` corner to (lon, lat).
fn corner(root: &XmlElement, tag: &str) -> Result<(f64, f64)> {
    let text = root.require(tag)?;
    let values: Vec<f64> = text
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect();
    match values.as_slice() {
        [lat, lon, ..] => Ok((*lon, *lat)),
        _ => Err(Error::invalid_product(format!("bad corner {tag}: {text:?}"))),
    }
}

#[derive(Debug)]
pub struct CskProduct {
    core: SarCore,
}

impl CskProduct {
    pub fn new(path: &Path, files: ProductFiles, config: &Config) -> Result<Self> {
        let image = files.find_one(r"(^|/)CSKS[1-4]_[^/]*\.h5$")?;
        let stem = image
            .rsplit('/')
            .next()
            .and_then(|f| f.strip_suffix(".h5"))
            .unwrap_or(&image)
            .to_string();
        let parts: Vec<&str> = stem.split('_').filter(|p| !p.is_empty()).collect();
        if parts.len() < 9 {
            return Err(Error::invalid_product(format!(
                "{stem} is not a COSMO-SkyMed image name"
            )));
        }
        let product_type = parts[1].to_string();
        if !PRODUCT_TYPES.contains(&product_type.as_str()) {
            return Err(Error::invalid_product(format!(
                "unknown COSMO-SkyMed product type {product_type}"
            )));
        }
        if product_type != "DGM" {
            warn!(
                "COSMO-SkyMed {} products are untested, use them at your own risk",
                product_type
            );
        }
        let mode = MODES
            .iter()
            .find(|m| parts[3].contains(**m))
            .ok_or_else(|| Error::invalid_product(format!("invalid COSMO-SkyMed mode in {stem}")))?
            .to_string();
        let pols = channels(parts[5]);
        let datetime = parse_datetime(parts[8], &["%Y%m%d%H%M%S"])?;

        let mtd = files.find_one(&format!(r"(^|/){}\.h5\.xml$", regex::escape(&stem)))?;
        let doc = XmlDoc::parse(&files.read_to_string(&mtd)?)?;
        let definition = doc.root.find("ProductDefinitionData").unwrap_or(&doc.root);
        let footprint = Polygon::new(vec![
            corner(definition, "GeoCoordTopLeft")?,
            corner(definition, "GeoCoordTopRight")?,
            corner(definition, "GeoCoordBottomRight")?,
            corner(definition, "GeoCoordBottomLeft")?,
        ]);

        let id = SarIdentity {
            datetime,
            native_resolution: mode_resolution(&mode),
            mode,
            product_type,
            pols,
            footprint,
            mtd,
            graph_input: files.gdal_path(&image),
        };
        Ok(Self {
            core: SarCore::new(path, files, Sensor::CosmoSkymed, id, config)?,
        })
    }
}

delegate_sar_product!(CskProduct);
