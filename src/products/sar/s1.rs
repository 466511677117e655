//! Sentinel-1 ground-range detected (GRD) products in SAFE format.
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use super::{delegate_sar_product, parse_pol, SarCore, SarIdentity};
use crate::bands::SarBand;
use crate::config::Config;
use crate::core::geometry::Polygon;
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::ProductFiles;
use crate::products::{parse_datetime, DATETIME_FMT};
use crate::types::Sensor;

/// Fields read from `manifest.safe`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct S1Manifest {
    pub mode: Option<String>,
    pub product_type: Option<String>,
    pub start_time: Option<String>,
    pub polarizations: Vec<String>,
    /// `lat,lon` pairs of the footprint.
    pub coordinates: Option<String>,
}

impl S1Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);
        let mut meta = S1Manifest::default();
        let mut curr = String::new();
        let mut in_platform = false;
        let mut in_acquisition_period = false;
        let mut in_product_info = false;
        let mut in_footprint = false;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    match tag.as_str() {
                        "platform" => in_platform = true,
                        "acquisitionPeriod" => in_acquisition_period = true,
                        "standAloneProductInformation" => in_product_info = true,
                        "footPrint" => in_footprint = true,
                        _ => {}
                    }
                    curr = tag;
                }
                Event::End(ref e) => {
                    match e.local_name().as_ref() {
                        b"platform" => in_platform = false,
                        b"acquisitionPeriod" => in_acquisition_period = false,
                        b"standAloneProductInformation" => in_product_info = false,
                        b"footPrint" => in_footprint = false,
                        _ => {}
                    }
                    curr.clear();
                }
                Event::Text(e) => {
                    let txt = e.unescape()?.trim().to_string();
                    match curr.as_str() {
                        "mode" if in_platform => meta.mode = Some(txt),
                        "startTime" if in_acquisition_period => meta.start_time = Some(txt),
                        "productType" if in_product_info => meta.product_type = Some(txt),
                        "transmitterReceiverPolarisation" if in_product_info => {
                            meta.polarizations.push(txt)
                        }
                        "coordinates" if in_footprint => meta.coordinates = Some(txt),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(meta)
    }

    /// Footprint as a WGS84 (lon, lat) polygon.
    pub fn footprint(&self) -> Result<Polygon> {
        let coords = self
            .coordinates
            .as_deref()
            .ok_or_else(|| Error::invalid_product("no footprint in manifest.safe"))?;
        let points = coords
            .split_whitespace()
            .map(|pair| {
                let (lat, lon) = pair
                    .split_once(',')
                    .ok_or_else(|| Error::invalid_product(format!("bad coordinate {pair:?}")))?;
                let lat: f64 = lat.parse().map_err(|_| Error::invalid_product(format!("bad latitude {lat:?}")))?;
                let lon: f64 = lon.parse().map_err(|_| Error::invalid_product(format!("bad longitude {lon:?}")))?;
                Ok((lon, lat))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(points))
    }
}

/// Pixel spacing of GRD products by mode and resolution class.
fn grd_resolution(mode: &str, class: char) -> f64 {
    match (mode, class) {
        (_, 'F') => 10.0,
        (_, 'M') => 40.0,
        ("EW", _) => 25.0,
        _ => 10.0,
    }
}

#[derive(Debug)]
pub struct S1Product {
    core: SarCore,
}

impl S1Product {
    pub fn new(path: &Path, files: ProductFiles, config: &Config) -> Result<Self> {
        let name = product_name(path);
        let parts: Vec<&str> = name.split('_').filter(|p| !p.is_empty()).collect();
        if parts.len() < 5 || !parts[2].starts_with("GRD") {
            return Err(Error::invalid_product(format!(
                "{name} is not a Sentinel-1 GRD product"
            )));
        }
        let class = parts[2].chars().nth(3).unwrap_or('H');

        let mtd = files.find_one(r"(^|/)manifest\.safe$")?;
        let manifest = S1Manifest::parse(&files.read_to_string(&mtd)?)?;
        let mode = manifest.mode.clone().unwrap_or_else(|| parts[1].to_string());
        let datetime = match manifest.start_time.as_deref() {
            Some(t) => parse_datetime(t, &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"])?,
            None => parse_datetime(parts[4], &[DATETIME_FMT])?,
        };
        let mut pols: Vec<SarBand> = Vec::new();
        for label in &manifest.polarizations {
            match parse_pol(label) {
                Some(pol) if !pols.contains(&pol) => pols.push(pol),
                Some(_) => {}
                None => warn!("Ignoring unknown polarization {:?} in {}", label, name),
            }
        }

        let graph_input = match &files {
            ProductFiles::Dir(_) => files.gdal_path(&mtd),
            ProductFiles::Zip(zip) => zip.clone(),
        };
        let id = SarIdentity {
            datetime,
            native_resolution: grd_resolution(&mode, class),
            mode,
            product_type: "GRD".to_string(),
            pols,
            footprint: manifest.footprint()?,
            mtd,
            graph_input,
        };
        Ok(Self {
            core: SarCore::new(path, files, Sensor::Sentinel1, id, config)?,
        })
    }
}

delegate_sar_product!(S1Product);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bands::Band;
    use crate::config::GraphKind;
    use crate::products::{BandSource, Product, SarProduct};
    use std::fs;
    use std::path::PathBuf;

    pub(crate) const NAME: &str =
        "S1A_IW_GRDH_1SDV_20191215T060906_20191215T060931_030355_037878_6A6C.SAFE";

    pub(crate) const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xfdu:XFDU xmlns:xfdu="urn:ccsds:schema:xfdu:1" xmlns:safe="http://www.esa.int/safe/sentinel-1.0" xmlns:s1sarl1="http://www.esa.int/safe/sentinel-1.0/sentinel-1/sar/level-1" xmlns:gml="http://www.opengis.net/gml">
  <metadataSection>
    <metadataObject ID="platform"><metadataWrap><xmlData>
      <safe:platform>
        <safe:familyName>SENTINEL-1</safe:familyName>
        <safe:instrument><safe:extension><s1sarl1:instrumentMode><s1sarl1:mode>IW</s1sarl1:mode></s1sarl1:instrumentMode></safe:extension></safe:instrument>
      </safe:platform>
    </xmlData></metadataWrap></metadataObject>
    <metadataObject ID="acquisitionPeriod"><metadataWrap><xmlData>
      <safe:acquisitionPeriod><safe:startTime>2019-12-15T06:09:06.123456</safe:startTime></safe:acquisitionPeriod>
    </xmlData></metadataWrap></metadataObject>
    <metadataObject ID="generalProductInformation"><metadataWrap><xmlData>
      <s1sarl1:standAloneProductInformation>
        <s1sarl1:productType>GRD</s1sarl1:productType>
        <s1sarl1:transmitterReceiverPolarisation>VV</s1sarl1:transmitterReceiverPolarisation>
        <s1sarl1:transmitterReceiverPolarisation>VH</s1sarl1:transmitterReceiverPolarisation>
      </s1sarl1:standAloneProductInformation>
    </xmlData></metadataWrap></metadataObject>
    <metadataObject ID="measurementFrameSet"><metadataWrap><xmlData>
      <safe:frameSet><safe:frame><safe:footPrint>
        <gml:coordinates>44.0,3.0 44.0,4.0 45.0,4.0 45.0,3.0</gml:coordinates>
      </safe:footPrint></safe:frame></safe:frameSet>
    </xmlData></metadataWrap></metadataObject>
  </metadataSection>
</xfdu:XFDU>"#;

    pub(crate) fn fake_s1(root: &Path) -> PathBuf {
        let safe = root.join(NAME);
        fs::create_dir_all(safe.join("measurement")).unwrap();
        fs::write(safe.join("manifest.safe"), MANIFEST).unwrap();
        safe
    }

    #[test]
    fn manifest_fields() {
        let m = S1Manifest::parse(MANIFEST).unwrap();
        assert_eq!(m.mode.as_deref(), Some("IW"));
        assert_eq!(m.polarizations, vec!["VV", "VH"]);
        let fp = m.footprint().unwrap();
        assert_eq!(fp.exterior[0], (3.0, 44.0));
    }

    #[test]
    fn opens_as_geocoded_radar_product() {
        let dir = tempfile::tempdir().unwrap();
        let safe = fake_s1(dir.path());
        let prod = S1Product::new(&safe, ProductFiles::new(&safe).unwrap(), &Config::default()).unwrap();
        assert_eq!(prod.info().condensed_name, "20191215T060906_S1_IW_GRD");
        assert_eq!(prod.info().resolution, 10.0);
        assert_eq!(prod.sensor_mode(), "IW");
        assert_eq!(prod.pol_channels(), vec![SarBand::Vv, SarBand::Vh]);
        assert_eq!(prod.get_default_band().unwrap(), Band::Sar(SarBand::Vv));
        assert_eq!(
            prod.band_source(Band::Sar(SarBand::VhDspk), 10.0).unwrap(),
            BandSource::Geocoded
        );
        assert!(prod.band_source(Band::Sar(SarBand::Hh), 10.0).is_err());

        let job = prod.geocoding().unwrap();
        assert_eq!(job.graph, GraphKind::SarGeocoding);
        assert_eq!(job.band_files.len(), 2);
        assert_eq!(job.band_files[&Band::Sar(SarBand::Vv)], "Sigma0_VV");
        assert!(job.input.ends_with("manifest.safe"));
        assert_eq!(prod.crs().unwrap().epsg(), Some(32631));
    }

    #[test]
    fn configured_default_resolution_wins() {
        let dir = tempfile::tempdir().unwrap();
        let safe = fake_s1(dir.path());
        let cfg = Config {
            sar_default_resolution: Some(20.0),
            ..Default::default()
        };
        let prod = S1Product::new(&safe, ProductFiles::new(&safe).unwrap(), &cfg).unwrap();
        assert_eq!(prod.info().resolution, 20.0);
    }
}
