//! RADARSAT-2 products (`product.xml` + `product.kml`).
use std::path::Path;

use tracing::{debug, warn};

use super::{delegate_sar_product, parse_pol, SarCore, SarIdentity};
use crate::bands::SarBand;
use crate::config::Config;
use crate::core::geometry::Polygon;
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::xml::{XmlDoc, XmlElement};
use crate::io::ProductFiles;
use crate::products::parse_datetime;
use crate::types::Sensor;

/// Beam mode codes and the label used in `acquisitionType`.
const MODES: [(&str, &str); 21] = [
    ("S", "Standard"),
    ("W", "Wide"),
    ("F", "Fine"),
    ("WF", "Wide Fine"),
    ("MF", "Multi-Look Fine"),
    ("WMF", "Wide Multi-Look Fine"),
    ("XF", "Extra-Fine"),
    ("U", "Ultra-Fine"),
    ("WU", "Wide Ultra-Fine"),
    ("EH", "Extended High"),
    ("EL", "Extended Low"),
    ("SQ", "Standard Quad-Pol"),
    ("WSQ", "Wide Standard Quad-Pol"),
    ("FQ", "Fine Quad-Pol"),
    ("WFQ", "Wide Fine Quad-Pol"),
    ("SCN", "ScanSAR Narrow"),
    ("SCW", "ScanSAR Wide"),
    ("OSVN", "Ocean Surveillance"),
    ("DVWF", "Ship Detection"),
    ("SLA", "Spotlight"),
    ("WQ", "Wide Quad-Pol"),
];

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Mode code of an `acquisitionType` label. Labels vary between
/// processors, so spelling and word order differences are tolerated.
pub fn mode_code(label: &str) -> Option<&'static str> {
    let wanted = normalize(label);
    if let Some((code, _)) = MODES.iter().find(|(_, l)| normalize(l) == wanted) {
        return Some(code);
    }
    let mut words: Vec<String> = label.split([' ', '-']).map(normalize).collect();
    words.sort();
    MODES
        .iter()
        .find(|(_, l)| {
            let mut w: Vec<String> = l.split([' ', '-']).map(normalize).collect();
            w.sort();
            w == words
        })
        .map(|(code, _)| *code)
}

/// Pixel spacing by mode when the metadata does not give it.
fn fallback_resolution(mode: &str, product_type: &str) -> Result<f64> {
    let sgx = product_type == "SGX";
    let res = match mode {
        "SLA" => if sgx { 1.0 } else { 0.5 },
        "U" | "WU" => if sgx { 1.0 } else { 1.56 },
        "MF" | "WMF" | "F" | "WF" => if sgx { 3.13 } else { 6.25 },
        "XF" => if sgx { 2.0 } else { 3.13 },
        "S" | "EH" => if sgx { 8.0 } else { 12.5 },
        "W" | "EL" => if sgx { 10.0 } else { 12.5 },
        "FQ" | "WQ" | "WFQ" => 3.13,
        "SCN" => 25.0,
        "SCW" => 50.0,
        "DVWF" => if product_type == "SCF" { 40.0 } else { 20.0 },
        other => {
            return Err(Error::InvalidType(format!(
                "no square pixel spacing known for RADARSAT-2 mode {other}"
            )))
        }
    };
    Ok(res)
}

/// `Polygon Outline` placemark of `product.kml`, as WGS84 (lon, lat).
fn kml_outline(doc: &XmlDoc) -> Result<Polygon> {
    let placemark = doc
        .root
        .descendants("Placemark")
        .into_iter()
        .find(|p| p.text_of("name") == Some("Polygon Outline"))
        .ok_or_else(|| Error::invalid_product("no `Polygon Outline` in product.kml"))?;
    let coords = placemark.require("coordinates")?;
    let points = coords
        .split_whitespace()
        .map(|tuple| {
            let mut it = tuple.split(',').map(str::parse::<f64>);
            match (it.next(), it.next()) {
                (Some(Ok(lon)), Some(Ok(lat))) => Ok((lon, lat)),
                _ => Err(Error::invalid_product(format!("bad KML coordinate {tuple:?}"))),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(points))
}

fn pixel_spacing(root: &XmlElement) -> Option<f64> {
    root.text_of("imageAttributes/rasterAttributes/sampledPixelSpacing")?
        .parse()
        .ok()
}

#[derive(Debug)]
pub struct Rs2Product {
    core: SarCore,
}

impl Rs2Product {
    pub fn new(path: &Path, files: ProductFiles, config: &Config) -> Result<Self> {
        let name = product_name(path);
        let parts: Vec<&str> = name.split('_').filter(|p| !p.is_empty()).collect();
        if parts.len() < 8 || parts[0] != "RS2" {
            return Err(Error::invalid_product(format!(
                "{name} is not a RADARSAT-2 product name"
            )));
        }
        let datetime = parse_datetime(&format!("{}T{}", parts[5], parts[6]), &["%Y%m%dT%H%M%S"])?;
        let product_type = parts[parts.len() - 1].to_string();
        if product_type != "SGF" {
            warn!(
                "RADARSAT-2 {} products are untested, use them at your own risk",
                product_type
            );
        }

        let mtd = files.find_one(r"(^|/)product\.xml$")?;
        let doc = XmlDoc::parse(&files.read_to_string(&mtd)?)?;
        let label = doc.root.require("sourceAttributes/radarParameters/acquisitionType")?;
        let mode = mode_code(label)
            .ok_or_else(|| Error::InvalidType(format!("invalid RADARSAT-2 mode {label:?}")))?
            .to_string();
        let native_resolution = match pixel_spacing(&doc.root) {
            Some(res) => res,
            None => fallback_resolution(&mode, &product_type)?,
        };

        let pol_text = doc
            .root
            .text_of("sourceAttributes/radarParameters/polarizations")
            .unwrap_or(parts[7]);
        let pols: Vec<SarBand> = pol_text.split_whitespace().filter_map(parse_pol).collect();

        let kml = files.find_one(r"(^|/)product\.kml$")?;
        let footprint = kml_outline(&XmlDoc::parse(&files.read_to_string(&kml)?)?)?;
        debug!("RADARSAT-2 acquisition type {:?} mapped to {}", label, mode);

        let graph_input = match &files {
            ProductFiles::Dir(_) => files.gdal_path(&mtd),
            ProductFiles::Zip(zip) => zip.clone(),
        };
        let id = SarIdentity {
            datetime,
            mode,
            product_type,
            native_resolution,
            pols,
            footprint,
            mtd,
            graph_input,
        };
        Ok(Self {
            core: SarCore::new(path, files, Sensor::Radarsat2, id, config)?,
        })
    }
}

delegate_sar_product!(Rs2Product);
