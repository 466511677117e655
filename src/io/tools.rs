//! Out-of-process tools: the SNAP graph processor (`gpt`) and the GDAL
//! command-line utilities. Invocations are blocking and have no timeout.
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::core::raster::{Crs, Envelope};
use crate::error::{Error, Result};
use crate::types::Resampling;

/// Runs an external program to completion.
pub trait ExternalTool: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<()>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandRunner;

impl ExternalTool for CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<()> {
        debug!("Running: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args.iter().map(|s| s.as_str()))
            .output()
            .map_err(|e| Error::Tool {
                program: program.to_string(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::Tool {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!("{} finished", program);
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `gpt <graph> -P<key>=<value>...`
pub fn gpt_args(graph: &Path, params: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = vec![path_arg(graph)];
    args.extend(params.iter().map(|(k, v)| format!("-P{}={}", k, v)));
    args
}

/// Export one raster to GeoTIFF with a fixed nodata value.
pub fn gdal_translate_args(src: &Path, dst: &Path, nodata: f64) -> Vec<String> {
    vec![
        "-of".into(),
        "GTiff".into(),
        "-a_nodata".into(),
        nodata.to_string(),
        path_arg(src),
        path_arg(dst),
    ]
}

/// Warp a raster onto `crs` and `extent` at `resolution`.
pub fn gdalwarp_args(
    src: &Path,
    dst: &Path,
    crs: &Crs,
    extent: &Envelope,
    resolution: f64,
    method: Resampling,
    dst_nodata: f64,
) -> Vec<String> {
    vec![
        "-of".into(),
        "GTiff".into(),
        "-overwrite".into(),
        "-t_srs".into(),
        crs.to_string(),
        "-te".into(),
        extent.min_x.to_string(),
        extent.min_y.to_string(),
        extent.max_x.to_string(),
        extent.max_y.to_string(),
        "-tr".into(),
        resolution.to_string(),
        resolution.to_string(),
        "-r".into(),
        method.gdal_name().into(),
        "-dstnodata".into(),
        dst_nodata.to_string(),
        path_arg(src),
        path_arg(dst),
    ]
}
