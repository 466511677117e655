//! In-memory collaborators: a raster store, a recording tool runner that
//! fabricates the files real tools would produce, and two minimal products.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use ndarray::Array2;

use eobands::bands::{Band, CloudBand, OpticalBand, SarBand};
use eobands::config::{Config, GraphKind};
use eobands::core::geometry::Polygon;
use eobands::core::raster::{Crs, Envelope, Grid, RasterMeta};
use eobands::io::{ExternalTool, ProductFiles, RasterIo, RasterOutput, SourceRaster};
use eobands::products::{
    BandSource, CloudSource, GeocodingJob, Mtd, OpticalProduct, Product, ProductInfo, SarProduct,
};
use eobands::{Context, DataType, Error, Result, Sensor};

pub const EPSG: u32 = 32631;

pub fn extent() -> Envelope {
    Envelope::new(0.0, 0.0, 40.0, 40.0)
}

pub fn grid(resolution: f64) -> Grid {
    Grid::from_resolution(&extent(), Crs::from_epsg(EPSG), resolution).unwrap()
}

pub fn raster(grid: &Grid, data: Array2<f32>, nodata: f64) -> RasterOutput {
    RasterOutput::single_f32(
        RasterMeta::for_grid(grid, DataType::Float32, nodata, 1),
        data,
        "band",
    )
}

#[derive(Default)]
pub struct MemoryIo {
    rasters: Mutex<HashMap<PathBuf, RasterOutput>>,
    reads: AtomicUsize,
}

impl MemoryIo {
    pub fn put(&self, path: impl Into<PathBuf>, raster: RasterOutput) {
        self.rasters.lock().unwrap().insert(path.into(), raster);
    }

    pub fn get(&self, path: &Path) -> Option<RasterOutput> {
        self.rasters.lock().unwrap().get(path).cloned()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RasterIo for MemoryIo {
    fn read(&self, path: &Path, band: usize) -> Result<SourceRaster> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rasters = self.rasters.lock().unwrap();
        let raster = rasters
            .get(path)
            .ok_or_else(|| Error::EoReader(format!("no raster at {}", path.display())))?;
        if band == 0 || band > raster.meta.count {
            return Err(Error::EoReader(format!("no band {band} in {}", path.display())));
        }
        Ok(raster.to_source(band - 1))
    }

    fn write(&self, path: &Path, raster: &RasterOutput) -> Result<()> {
        self.put(path, raster.clone());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.rasters.lock().unwrap().contains_key(path)
    }
}

/// Records every invocation and writes what the real program would leave behind.
pub struct FakeTool {
    io: Arc<MemoryIo>,
    /// Written by `gdal_translate` for every exported band.
    pub geocoded: RasterOutput,
    /// Written by `gdalwarp`.
    pub dem: RasterOutput,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeTool {
    pub fn new(io: Arc<MemoryIo>, geocoded: RasterOutput, dem: RasterOutput) -> Self {
        Self {
            io,
            geocoded,
            dem,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|(p, _)| p == program).count()
    }

    fn param<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
        let prefix = format!("-P{key}=");
        args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }
}

impl ExternalTool for FakeTool {
    fn run(&self, program: &str, args: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        let last = args.last().map(PathBuf::from);
        match program {
            "gdal_translate" => {
                if let Some(dst) = last {
                    self.io.put(dst, self.geocoded.clone());
                }
            }
            "gdalwarp" => {
                if let Some(dst) = last {
                    self.io.put(dst, self.dem.clone());
                }
            }
            _ => {
                // Despeckling reads a GeoTIFF and writes one; geocoding writes BEAM-DIMAP.
                if let (Some(input), Some(output)) =
                    (Self::param(args, "input"), Self::param(args, "output"))
                {
                    if output.ends_with(".tif") {
                        let src = self.io.get(Path::new(input)).ok_or_else(|| Error::Tool {
                            program: program.to_string(),
                            status: "exit status: 1".to_string(),
                            stderr: format!("cannot read {input}"),
                        })?;
                        self.io.put(output, src);
                    }
                }
            }
        }
        Ok(())
    }
}

/// A tool that always fails, for error propagation.
pub struct BrokenTool;

impl ExternalTool for BrokenTool {
    fn run(&self, program: &str, _args: &[String]) -> Result<()> {
        Err(Error::Tool {
            program: program.to_string(),
            status: "exit status: 1".to_string(),
            stderr: "graph failed".to_string(),
        })
    }
}

pub fn context(config: Config, tool: Arc<dyn ExternalTool>, io: Arc<MemoryIo>) -> Context {
    Context::new(config, tool, io)
}

fn info(path: &Path, sensor: Sensor, detail: &str, product_type: &str, output_dir: &Path) -> ProductInfo {
    let datetime = NaiveDate::from_ymd_opt(2020, 5, 27)
        .and_then(|d| d.and_hms_opt(10, 43, 17))
        .unwrap();
    let mut info = ProductInfo::new(
        path,
        "FAKE".to_string(),
        sensor,
        datetime,
        detail,
        product_type.to_string(),
        10.0,
    );
    info.output_dir = output_dir.to_path_buf();
    info
}

const FAKE_CLOUDS: [CloudBand; 3] = [CloudBand::RawClouds, CloudBand::Clouds, CloudBand::AllClouds];

/// Map-projected optical product whose bands live in a [`MemoryIo`].
#[derive(Debug)]
pub struct FakeOptical {
    info: ProductInfo,
    files: ProductFiles,
    sources: BTreeMap<Band, PathBuf>,
    pub clouds: Vec<Polygon>,
    /// Mean (azimuth, zenith) of the sun, if the metadata has them.
    pub sun: Option<(f64, f64)>,
}

impl FakeOptical {
    pub fn new(output_dir: &Path) -> Self {
        let path = PathBuf::from("/products/fake_optical");
        Self {
            info: info(&path, Sensor::Pleiades, "", "ORT", output_dir),
            files: ProductFiles::Dir(path),
            sources: BTreeMap::new(),
            clouds: Vec::new(),
            sun: Some((135.0, 45.0)),
        }
    }

    /// Register `band`, stored in `io` as `raster`.
    pub fn with_band(mut self, io: &MemoryIo, band: OpticalBand, raster: RasterOutput) -> Self {
        let path = PathBuf::from(format!("/products/fake_optical/{}.tif", band.name()));
        io.put(path.clone(), raster);
        self.info.band_map.insert(Band::Optical(band), band.name().to_string());
        self.sources.insert(Band::Optical(band), path);
        self
    }
}

impl Product for FakeOptical {
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
        Ok(Crs::from_epsg(EPSG))
    }

    fn extent(&self) -> Result<Envelope> {
        Ok(extent())
    }

    fn footprint(&self, _io: &dyn RasterIo) -> Result<Polygon> {
        Ok(Polygon::from_envelope(&extent()))
    }

    fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Table(BTreeMap::new()))
    }

    fn band_source(&self, band: Band, _resolution: f64) -> Result<BandSource> {
        self.sources
            .get(&band)
            .map(|path| BandSource::Native {
                path: path.clone(),
                index: 1,
            })
            .ok_or_else(|| Error::invalid_band(band, "not in fake product"))
    }

    fn cloud_bands(&self) -> &[CloudBand] {
        &FAKE_CLOUDS
    }

    fn cloud_source(&self, _io: &dyn RasterIo) -> Result<CloudSource> {
        Ok(CloudSource::Vector {
            opaque: self.clouds.clone(),
            cirrus: Vec::new(),
        })
    }

    fn as_optical(&self) -> Option<&dyn OpticalProduct> {
        Some(self)
    }
}

impl OpticalProduct for FakeOptical {
    fn get_mean_sun_angles(&self, _io: &dyn RasterIo) -> Result<(f64, f64)> {
        self.sun
            .ok_or_else(|| Error::invalid_product("no mean sun angles in fake product"))
    }
}

/// Radar product in sensor geometry: every band goes through geocoding.
#[derive(Debug)]
pub struct FakeSar {
    info: ProductInfo,
    files: ProductFiles,
    pols: Vec<SarBand>,
}

impl FakeSar {
    pub fn new(output_dir: &Path, pols: &[SarBand]) -> Self {
        let path = PathBuf::from("/products/fake_sar.SAFE");
        let mut info = info(&path, Sensor::Sentinel1, "IW", "GRD", output_dir);
        for pol in pols {
            info.band_map.insert(Band::Sar(*pol), pol.name().to_string());
            info.band_map
                .insert(Band::Sar(pol.despeckled()), pol.name().to_string());
        }
        Self {
            info,
            files: ProductFiles::Dir(path),
            pols: pols.to_vec(),
        }
    }
}

impl Product for FakeSar {
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
        Ok(Crs::from_epsg(EPSG))
    }

    fn extent(&self) -> Result<Envelope> {
        Ok(extent())
    }

    fn footprint(&self, _io: &dyn RasterIo) -> Result<Polygon> {
        Ok(Polygon::from_envelope(&extent()))
    }

    fn read_mtd(&self) -> Result<Mtd> {
        Ok(Mtd::Table(BTreeMap::new()))
    }

    fn band_source(&self, band: Band, _resolution: f64) -> Result<BandSource> {
        if self.info.band_map.contains_key(&band) {
            Ok(BandSource::Geocoded)
        } else {
            Err(Error::invalid_band(band, "not in fake product"))
        }
    }

    fn geocoding(&self) -> Option<GeocodingJob> {
        Some(GeocodingJob {
            graph: GraphKind::SarGeocoding,
            input: self.info.path.join("manifest.safe"),
            band_files: self
                .pols
                .iter()
                .map(|p| (Band::Sar(*p), format!("Sigma0_{}", p.name())))
                .collect(),
        })
    }

    fn as_sar(&self) -> Option<&dyn SarProduct> {
        Some(self)
    }
}

impl SarProduct for FakeSar {
    fn sensor_mode(&self) -> &str {
        "IW"
    }

    fn pol_channels(&self) -> Vec<SarBand> {
        self.pols.clone()
    }
}
