//! Product factory: tells which sensor a path belongs to and builds it.
//!
//! Candidates are tried in preference order, first on the product name, then
//! (when no name matches) on metadata files listed inside the directory or
//! archive. Exactly one sensor must match.
use std::path::Path;

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::archive::product_name;
use crate::io::ProductFiles;
use crate::products::{
    CskProduct, DimapProduct, Product, Rs2Product, S1Product, S2Product, S3Product,
};
use crate::types::Sensor;

/// Sensors in the order they are tried.
pub const PREFERENCE: [Sensor; 7] = [
    Sensor::Sentinel2,
    Sensor::Sentinel3,
    Sensor::Sentinel1,
    Sensor::Radarsat2,
    Sensor::CosmoSkymed,
    Sensor::Pleiades,
    Sensor::Spot,
];

/// (product name, metadata file) patterns of a sensor.
fn patterns(sensor: Sensor) -> (&'static str, &'static str) {
    match sensor {
        Sensor::Sentinel2 => (
            r"^S2[AB]_MSIL(1C|2A)_\d{8}T\d{6}_N\d{4}_R\d{3}_T\w{5}_\d{8}T\d{6}$",
            r"(^|/)MTD_MSIL(1C|2A)\.xml$",
        ),
        Sensor::Sentinel3 => (
            r"^S3[AB]_(OL_1_EFR|SL_1_RBT)_{4}\d{8}T\d{6}_\d{8}T\d{6}_\d{8}T\d{6}_",
            r"(^|/)xfdumanifest\.xml$",
        ),
        Sensor::Sentinel1 => (
            r"^S1[AB]_(IW|EW|SM|WV|S[1-6])_GRD[HMF]_1S[SDHV][HV]_\d{8}T\d{6}_\d{8}T\d{6}_\d{6}_[0-9A-F]{6}_[0-9A-F]{4}$",
            r"(^|/)annotation/s1[ab]-[^/]*-grd-[^/]*\.xml$",
        ),
        Sensor::Radarsat2 => (
            r"^RS2_(OK\d+_PK\d+_DK\d+_)?[A-Z0-9]+_\d{8}_\d{6}_[HV]{2}(_[HV]{2})*_S[A-Z]{2}$",
            r"(^|/)product\.xml$",
        ),
        Sensor::CosmoSkymed => (
            r"^CSKS[1-4]_(RAW|SCS|DGM|GEC|GTC)_[UB]_(HI|PP|WR|HR|S2)_",
            r"(^|/)CSKS[1-4]_[^/]*\.h5$",
        ),
        Sensor::Pleiades => (
            r"^IMG_PHR1[AB]_(P|MS|PMS|MS-FS|PMS-FS|MS-N|PMS-N)_\d{3}$",
            r"(^|/)DIM_PHR1[AB]_[^/]*\.XML$",
        ),
        Sensor::Spot => (
            r"^IMG_SPOT[67]_(P|MS|PMS|MS-FS|PMS-FS|MS-N|PMS-N)_\d{3}$",
            r"(^|/)DIM_SPOT[67]_[^/]*\.XML$",
        ),
    }
}

#[derive(Debug)]
struct Candidate {
    sensor: Sensor,
    name: Regex,
    mtd: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::EoReader(format!("bad pattern {pattern}: {e}")))
}

/// Stateless dispatcher from a path to a [`Product`].
#[derive(Debug)]
pub struct Reader {
    config: Config,
    candidates: Vec<Candidate>,
}

static GLOBAL: OnceCell<Reader> = OnceCell::new();

impl Reader {
    pub fn new(config: Config) -> Result<Self> {
        let candidates = PREFERENCE
            .iter()
            .map(|sensor| {
                let (name, mtd) = patterns(*sensor);
                Ok(Candidate {
                    sensor: *sensor,
                    name: compile(name)?,
                    mtd: compile(mtd)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, candidates })
    }

    /// Process-wide reader configured from the environment.
    pub fn global() -> Result<&'static Reader> {
        GLOBAL.get_or_try_init(|| Reader::new(Config::from_env()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn candidate(&self, sensor: Sensor) -> Result<&Candidate> {
        self.candidates
            .iter()
            .find(|c| c.sensor == sensor)
            .ok_or_else(|| Error::InvalidType(format!("no reader for {sensor}")))
    }

    /// Whether the product name (archive and container suffix stripped) fits `sensor`.
    pub fn valid_name(&self, path: &Path, sensor: Sensor) -> Result<bool> {
        Ok(self.candidate(sensor)?.name.is_match(&product_name(path)))
    }

    /// Whether `files` holds the metadata file of `sensor`.
    pub fn valid_mtd(&self, files: &ProductFiles, sensor: Sensor) -> Result<bool> {
        Ok(!files.find(&self.candidate(sensor)?.mtd)?.is_empty())
    }

    /// Sensors recognised for `path`: by name when any matches, else by metadata.
    pub fn identify(&self, path: &Path, files: &ProductFiles) -> Result<Vec<Sensor>> {
        let name = product_name(path);
        let by_name: Vec<Sensor> = self
            .candidates
            .iter()
            .filter(|c| c.name.is_match(&name))
            .map(|c| c.sensor)
            .collect();
        if !by_name.is_empty() {
            debug!("{} recognised by name as {:?}", name, by_name);
            return Ok(by_name);
        }
        let listing = files.list()?;
        let by_mtd: Vec<Sensor> = self
            .candidates
            .iter()
            .filter(|c| listing.iter().any(|f| c.mtd.is_match(f)))
            .map(|c| c.sensor)
            .collect();
        debug!("{} recognised by metadata as {:?}", name, by_mtd);
        Ok(by_mtd)
    }

    /// Open the product at `path`.
    ///
    /// `archive_path` is the zip holding the product when `path` only names it;
    /// `output_path` replaces the default directory of derived artifacts.
    pub fn open(
        &self,
        path: &Path,
        archive_path: Option<&Path>,
        output_path: Option<&Path>,
    ) -> Result<Box<dyn Product>> {
        let files = ProductFiles::new(archive_path.unwrap_or(path))?;
        let matched = self.identify(path, &files)?;
        let sensor = match matched.as_slice() {
            [] => {
                return Err(Error::invalid_product(format!(
                    "{} is not a recognised product",
                    path.display()
                )))
            }
            [one] => *one,
            many => {
                return Err(Error::Ambiguous {
                    path: path.to_path_buf(),
                    candidates: many
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
        };
        let mut product = self.build(sensor, path, files)?;
        if let Some(dir) = output_path {
            product.set_output_dir(dir.to_path_buf());
        }
        info!(
            "Opened {} as {} ({})",
            product.info().name,
            sensor,
            product.info().condensed_name
        );
        Ok(product)
    }

    fn build(&self, sensor: Sensor, path: &Path, files: ProductFiles) -> Result<Box<dyn Product>> {
        let cfg = &self.config;
        Ok(match sensor {
            Sensor::Sentinel2 => Box::new(S2Product::new(path, files)?),
            Sensor::Sentinel3 => Box::new(S3Product::new(path, files, cfg)?),
            Sensor::Sentinel1 => Box::new(S1Product::new(path, files, cfg)?),
            Sensor::Radarsat2 => Box::new(Rs2Product::new(path, files, cfg)?),
            Sensor::CosmoSkymed => Box::new(CskProduct::new(path, files, cfg)?),
            Sensor::Pleiades | Sensor::Spot => Box::new(DimapProduct::new(path, files, sensor)?),
        })
    }
}
