//! External processing cache.
//!
//! Bands delivered in sensor geometry are geocoded by an external graph and
//! exported to GeoTIFF under the product's output directory. The file name is
//! deterministic, so an existing file is a cache hit and the tool is not run
//! again. Despeckling is a second pass over the geocoded raster.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bands::Band;
use crate::config::GraphKind;
use crate::core::context::Context;
use crate::error::{Error, Result};
use crate::io::tools::{gdal_translate_args, gpt_args};
use crate::products::{BandSource, Product, ProductInfo};

/// Degrees per metre at the equator, scaled for the graph's `res_deg` parameter.
const DEG_PER_10M: f64 = 8.983152841195215e-5;

/// Nodata of exported geocoded bands.
const GEOCODED_NODATA: f64 = 0.0;

/// Resolution as used in file names: `10m`, `12-5m`.
pub fn res_str(resolution: f64) -> String {
    let text = if resolution.fract() == 0.0 {
        format!("{}", resolution as i64)
    } else {
        format!("{resolution}").replace('.', "-")
    };
    format!("{text}m")
}

/// `{output_dir}/{condensed}_{name}_{res}.tif`
pub fn artifact_path(info: &ProductInfo, name: &str, resolution: f64) -> PathBuf {
    info.output_dir.join(format!(
        "{}_{}_{}.tif",
        info.condensed_name,
        name,
        res_str(resolution)
    ))
}

/// Where a band's pixels were found, and whether finding them ran a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Map-projected file delivered with the product.
    Native { path: PathBuf, index: usize },
    /// Derived file already on disk.
    Cached(PathBuf),
    /// Derived file written by this call.
    Produced(PathBuf),
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match self {
            Artifact::Native { path, .. } | Artifact::Cached(path) | Artifact::Produced(path) => path,
        }
    }

    /// 1-based raster band holding the data.
    pub fn index(&self) -> usize {
        match self {
            Artifact::Native { index, .. } => *index,
            _ => 1,
        }
    }

    pub fn was_produced(&self) -> bool {
        matches!(self, Artifact::Produced(_))
    }
}

/// Geocoded rasters of `bands` at `resolution`, running the external graph
/// for whatever is missing.
pub fn ensure_geocoded(
    product: &dyn Product,
    bands: &[Band],
    resolution: f64,
    ctx: &Context,
) -> Result<BTreeMap<Band, Artifact>> {
    let info = product.info();
    let job = product.geocoding().ok_or_else(|| match bands.first() {
        Some(band) => Error::invalid_band(band, format!("{} needs no geocoding", info.name)),
        None => Error::EoReader(format!("{} needs no geocoding", info.name)),
    })?;

    // Despeckled bands are filtered from their geocoded raw counterpart.
    let raw_of = |band: Band| -> Result<Band> {
        let raw = match band {
            Band::Sar(s) => Band::Sar(s.speckled()),
            other => other,
        };
        if job.band_files.contains_key(&raw) {
            Ok(raw)
        } else {
            Err(Error::invalid_band(band, format!("not produced by geocoding {}", info.name)))
        }
    };
    for band in bands {
        raw_of(*band)?;
    }

    let mut out = BTreeMap::new();

    if let Some(dir) = &ctx.config.test_band_dir {
        for band in bands {
            let wanted = artifact_path(info, band.name(), resolution);
            let file_name = wanted
                .file_name()
                .ok_or_else(|| Error::EoReader(format!("bad artifact path {}", wanted.display())))?;
            let path = dir.join(file_name);
            if !ctx.io.exists(&path) {
                return Err(Error::EoReader(format!(
                    "test mode: {} not found in {}",
                    path.display(),
                    dir.display()
                )));
            }
            debug!("Test band {} -> {:?}", band, path);
            out.insert(*band, Artifact::Cached(path));
        }
        return Ok(out);
    }

    let mut missing_raw: BTreeSet<Band> = BTreeSet::new();
    let mut missing_dspk: Vec<Band> = Vec::new();
    for band in bands {
        let path = artifact_path(info, band.name(), resolution);
        if ctx.io.exists(&path) {
            info!("Cache hit for {}: {}", band, path.display());
            out.insert(*band, Artifact::Cached(path));
            continue;
        }
        let raw = raw_of(*band)?;
        if raw == *band {
            missing_raw.insert(raw);
        } else {
            missing_dspk.push(*band);
            if !ctx.io.exists(&artifact_path(info, raw.name(), resolution)) {
                missing_raw.insert(raw);
            }
        }
    }
    if missing_raw.is_empty() && missing_dspk.is_empty() {
        return Ok(out);
    }
    fs::create_dir_all(&info.output_dir)?;

    if !missing_raw.is_empty() {
        let crs = product.crs()?;
        let tmp = tempfile::Builder::new()
            .prefix("geocoding_")
            .tempdir_in(&info.output_dir)?;
        let dim = tmp.path().join(format!("{}.dim", info.condensed_name));
        let data_dir = tmp.path().join(format!("{}.data", info.condensed_name));

        let mut params = BTreeMap::new();
        params.insert("input".to_string(), job.input.to_string_lossy().into_owned());
        params.insert("output".to_string(), dim.to_string_lossy().into_owned());
        params.insert("res_m".to_string(), resolution.to_string());
        params.insert("res_deg".to_string(), (resolution / 10.0 * DEG_PER_10M).to_string());
        params.insert("crs".to_string(), crs.to_string());

        info!(
            "Geocoding {} at {} m ({} band(s) missing)",
            info.name,
            resolution,
            missing_raw.len()
        );
        let graph = ctx.config.graph(job.graph);
        ctx.tool.run(&ctx.config.gpt_program(), &gpt_args(&graph, &params))?;

        // Export every band of the run so later requests hit the cache.
        for (band, file) in &job.band_files {
            let target = artifact_path(info, band.name(), resolution);
            if ctx.io.exists(&target) {
                debug!("{} already exported to {}", band, target.display());
                continue;
            }
            let src = data_dir.join(format!("{file}.img"));
            ctx.tool.run("gdal_translate", &gdal_translate_args(&src, &target, GEOCODED_NODATA))?;
            if missing_raw.contains(band) && bands.contains(band) {
                out.insert(*band, Artifact::Produced(target));
            }
        }
    }

    for band in missing_dspk {
        let raw = raw_of(band)?;
        let input = artifact_path(info, raw.name(), resolution);
        let target = artifact_path(info, band.name(), resolution);
        let mut params = BTreeMap::new();
        params.insert("input".to_string(), input.to_string_lossy().into_owned());
        params.insert("output".to_string(), target.to_string_lossy().into_owned());
        info!("Despeckling {} of {}", raw, info.name);
        let graph = ctx.config.graph(GraphKind::Despeckle);
        ctx.tool.run(&ctx.config.gpt_program(), &gpt_args(&graph, &params))?;
        out.insert(band, Artifact::Produced(target));
    }
    Ok(out)
}

/// Source of every band: native files as they are, geocoded ones through the cache.
pub fn get_band_paths(
    product: &dyn Product,
    bands: &[Band],
    resolution: f64,
    ctx: &Context,
) -> Result<BTreeMap<Band, Artifact>> {
    let mut out = BTreeMap::new();
    let mut to_geocode = Vec::new();
    for band in bands {
        match product.band_source(*band, resolution)? {
            BandSource::Native { path, index } => {
                out.insert(*band, Artifact::Native { path, index });
            }
            BandSource::Geocoded => to_geocode.push(*band),
        }
    }
    if !to_geocode.is_empty() {
        out.extend(ensure_geocoded(product, &to_geocode, resolution, ctx)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_strings() {
        assert_eq!(res_str(10.0), "10m");
        assert_eq!(res_str(12.5), "12-5m");
        assert_eq!(res_str(0.5), "0-5m");
    }
}
