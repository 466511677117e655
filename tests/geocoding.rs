mod common;

use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{grid, raster, BrokenTool, FakeSar, FakeTool, MemoryIo};
use eobands::api::Session;
use eobands::bands::{Band, SarBand, FLOAT_NODATA};
use eobands::core::geocode::{artifact_path, get_band_paths, Artifact};
use eobands::{load, Config, Context, Error, LoadRequest, Product};

fn sigma0() -> Array2<f32> {
    let mut data = Array2::from_elem((4, 4), 0.05f32);
    data[[0, 0]] = 0.0;
    data
}

fn setup() -> (tempfile::TempDir, Arc<MemoryIo>, Arc<FakeTool>, FakeSar) {
    let dir = tempfile::tempdir().unwrap();
    let io = Arc::new(MemoryIo::default());
    let g = grid(10.0);
    let tool = Arc::new(FakeTool::new(
        io.clone(),
        raster(&g, sigma0(), 0.0),
        raster(&g, Array2::zeros(g.shape()), FLOAT_NODATA),
    ));
    let product = FakeSar::new(dir.path(), &[SarBand::Hh]);
    (dir, io, tool, product)
}

fn programs(tool: &FakeTool) -> Vec<String> {
    tool.calls().into_iter().map(|(p, _)| p).collect()
}

#[test]
fn geocodes_then_despeckles_and_caches() {
    let (_dir, io, tool, product) = setup();
    let ctx = Context::new(Config::default(), tool.clone(), io.clone());
    let request = LoadRequest::new(&["HH", "HH_DSPK"]);

    let result = load(&product, &request, &ctx).unwrap();
    assert_eq!(programs(&tool), vec!["gpt", "gdal_translate", "gpt"]);

    let calls = tool.calls();
    let geocoding = &calls[0].1;
    assert!(geocoding.iter().any(|a| a.ends_with("sar_geocoding.xml")));
    assert!(geocoding.iter().any(|a| a == "-Pres_m=10"));
    assert!(geocoding.iter().any(|a| a == "-Pcrs=EPSG:32631"));
    let translate = &calls[1].1;
    assert!(translate.iter().any(|a| a.ends_with("Sigma0_HH.img")));
    let hh_path = artifact_path(product.info(), "HH", 10.0);
    assert_eq!(translate.last().map(PathBuf::from), Some(hh_path.clone()));
    assert!(calls[2].1.iter().any(|a| a.ends_with("sar_despeckle.xml")));

    for band in [SarBand::Hh, SarBand::HhDspk] {
        let data = result.get(Band::Sar(band)).unwrap().as_float().unwrap();
        assert!(data.mask[[0, 0]], "{band:?}");
        assert_abs_diff_eq!(data.data[[2, 3]], 0.05, epsilon = 1e-7);
    }
    assert_eq!(result.meta.nodata, 0.0);

    let before = tool.calls().len();
    load(&product, &request, &ctx).unwrap();
    assert_eq!(tool.calls().len(), before);
}

#[test]
fn cached_raw_band_only_needs_despeckling() {
    let (_dir, io, tool, product) = setup();
    let ctx = Context::new(Config::default(), tool.clone(), io.clone());
    load(&product, &LoadRequest::new(&["HH"]), &ctx).unwrap();
    assert_eq!(programs(&tool), vec!["gpt", "gdal_translate"]);

    load(&product, &LoadRequest::new(&["HH_DSPK"]), &ctx).unwrap();
    assert_eq!(programs(&tool), vec!["gpt", "gdal_translate", "gpt"]);
}

#[test]
fn exported_bands_are_not_overwritten() {
    let (dir, io, tool, _) = setup();
    let product = FakeSar::new(dir.path(), &[SarBand::Vv, SarBand::Vh]);
    let vh_path = artifact_path(product.info(), "VH", 10.0);
    io.put(vh_path.clone(), raster(&grid(10.0), Array2::from_elem((4, 4), 0.7), 0.0));
    let ctx = Context::new(Config::default(), tool.clone(), io.clone());

    load(&product, &LoadRequest::new(&["VV"]), &ctx).unwrap();
    assert_eq!(programs(&tool), vec!["gpt", "gdal_translate"]);
    let translate = &tool.calls()[1].1;
    assert!(translate.iter().any(|a| a.ends_with("Sigma0_VV.img")));

    let result = load(&product, &LoadRequest::new(&["VH"]), &ctx).unwrap();
    assert_eq!(tool.calls().len(), 2);
    let vh = result.get(Band::Sar(SarBand::Vh)).unwrap().as_float().unwrap();
    assert_abs_diff_eq!(vh.data[[1, 1]], 0.7, epsilon = 1e-7);
}

#[test]
fn every_resolution_has_its_own_artifact() {
    let (_dir, io, tool, product) = setup();
    let ctx = Context::new(Config::default(), tool.clone(), io.clone());
    let paths = get_band_paths(&product, &[Band::Sar(SarBand::Hh)], 10.0, &ctx).unwrap();
    assert!(matches!(paths[&Band::Sar(SarBand::Hh)], Artifact::Produced(_)));
    let again = get_band_paths(&product, &[Band::Sar(SarBand::Hh)], 10.0, &ctx).unwrap();
    assert!(matches!(again[&Band::Sar(SarBand::Hh)], Artifact::Cached(_)));

    let coarse = get_band_paths(&product, &[Band::Sar(SarBand::Hh)], 20.0, &ctx).unwrap();
    assert!(coarse[&Band::Sar(SarBand::Hh)].path().ends_with(
        format!("{}_HH_20m.tif", product.info().condensed_name)
    ));
    assert_eq!(tool.count("gpt"), 2);
}

#[test]
fn test_band_directory_replaces_the_tools() {
    let (dir, io, tool, product) = setup();
    let bands = dir.path().join("test_bands");
    let name = format!("{}_HH_10m.tif", product.info().condensed_name);
    io.put(bands.join(&name), raster(&grid(10.0), sigma0(), 0.0));
    let config = Config {
        test_band_dir: Some(bands.clone()),
        ..Config::default()
    };
    let ctx = Context::new(config, tool.clone(), io.clone());

    let result = load(&product, &LoadRequest::new(&["HH"]), &ctx).unwrap();
    assert_eq!(result.len(), 1);
    assert!(tool.calls().is_empty());

    let err = load(&product, &LoadRequest::new(&["HH_DSPK"]), &ctx).unwrap_err();
    assert!(err.to_string().contains("test mode"));
}

#[test]
fn tool_failures_surface_with_their_output() {
    let (_dir, io, _tool, product) = setup();
    let ctx = Context::new(Config::default(), Arc::new(BrokenTool), io.clone());
    let err = load(&product, &LoadRequest::new(&["HH"]), &ctx).unwrap_err();
    let Error::Tool { program, stderr, .. } = err else {
        panic!("expected a tool error, got {err}");
    };
    assert_eq!(program, "gpt");
    assert_eq!(stderr, "graph failed");
    assert_eq!(io.reads(), 0);
}

#[test]
fn radar_requests_are_checked_first() {
    let (_dir, io, tool, product) = setup();
    let ctx = Context::new(Config::default(), tool.clone(), io.clone());
    let cases: [&[&str]; 4] = [&["VV"], &["NDVI"], &["HILLSHADE"], &["CLOUDS"]];
    for bands in cases {
        assert!(load(&product, &LoadRequest::new(bands), &ctx).is_err(), "{bands:?}");
    }
    assert!(tool.calls().is_empty());
    assert_eq!(io.reads(), 0);
}

#[test]
fn session_summary_and_band_files() {
    let (dir, io, tool, product) = setup();
    let ctx = Context::new(Config::default(), tool, io.clone());
    let session = Session::with_context(Box::new(product), ctx);

    let summary = session.summary().unwrap();
    assert_eq!(summary.default_band.as_deref(), Some("HH"));
    assert_eq!(summary.bands, vec!["HH", "HH_DSPK", "DEM", "SLOPE"]);
    assert!(summary.indices.is_empty());

    let result = session.load(&LoadRequest::new(&["HH"])).unwrap();
    let out = dir.path().join("bands");
    let written = session.write_bands(&result, &out).unwrap();
    assert_eq!(written.len(), 1);
    let hh = io.get(&written[0]).unwrap();
    assert_eq!(hh.descriptions, vec!["HH"]);
    assert_eq!(hh.meta.nodata, 0.0);
}
