#![doc = r#"
eobands: sensor-agnostic band loading for optical and SAR satellite products.

This crate opens Sentinel-2, Sentinel-3 OLCI and SLSTR, Sentinel-1 GRD, RADARSAT-2,
COSMO-SkyMed, Pleiades and SPOT-6/7 products behind one contract, resolves
canonical band and index names (`GREEN`, `VV_DSPK`, `NDVI`, `CLOUDS`,
`HILLSHADE`) to sensor files, geocodes radar and Sentinel-3 bands through an
external graph processor with an on-disk cache, and returns every requested
band collocated on one grid with consistent nodata masks.

Requirements
------------
- GDAL development headers and runtime available on your system.
- SNAP's `gpt` on `PATH` (or `EOBANDS_GPT`) for products that need geocoding.
- GDAL command-line utilities for DEM cropping and reprojection.
- Rust 2024 edition toolchain.

Quick start: load an index
--------------------------
```rust,no_run
use std::path::Path;
use eobands::{api, LoadRequest};

fn main() -> eobands::Result<()> {
    let product = api::open(Path::new("/data/S2B_MSIL2A_20200114T065229_N0213_R020_T40REQ_20200114T094749.SAFE"))?;
    let request = LoadRequest::new(&["NDVI", "GREEN", "CLOUDS"]).with_resolution(20.0);
    let result = api::load(product.as_ref(), &request)?;
    println!("{} bands on a {}x{} grid", result.len(), result.meta.width, result.meta.height);
    Ok(())
}
```

Stack to a quantized GeoTIFF
----------------------------
```rust,no_run
use std::path::Path;
use eobands::{api, LoadRequest};

fn main() -> eobands::Result<()> {
    let product = api::open(Path::new("/data/S1A_IW_GRDH_1SDV_20191215T060906_20191215T060931_030355_037878_6A6C.SAFE"))?;
    let request = LoadRequest::new(&["VV", "VV_DSPK"]);
    api::stack(product.as_ref(), &request, Some(Path::new("/out/stack.tif")), true)?;
    Ok(())
}
```

Error handling
--------------
All public functions return `eobands::Result<T>`. Request errors (unknown or
unavailable bands, indices with missing inputs) are raised before any file is
read or any tool runs.

```rust,no_run
use std::path::Path;
use eobands::{api, Error, LoadRequest};

fn main() {
    let product = match api::open(Path::new("/data/product.SAFE")) {
        Ok(p) => p,
        Err(e) => return eprintln!("cannot open: {e}"),
    };
    match api::load(product.as_ref(), &LoadRequest::new(&["NDVI"])) {
        Ok(_) => {}
        Err(Error::InvalidIndex { index, missing }) => eprintln!("{index} needs {missing}"),
        Err(Error::Tool { program, stderr, .. }) => eprintln!("{program} failed: {stderr}"),
        Err(other) => eprintln!("{other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points and [`api::Session`].
- [`bands`]: band vocabulary, index registry and nodata policy.
- [`products`]: the [`products::Product`] contract and sensor implementations.
- [`reader`]: product identification.
- [`core`]: grids, the geocoding cache, loading, terrain and stacking.
- [`io`]: product files, GDAL raster I/O, writers and external tools.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod bands;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod products;
pub mod reader;
pub mod types;

// Curated public API surface
pub use bands::{resolve, Band, BandClass, CloudBand, Index, OpticalBand, SarBand, TerrainBand, Token};
pub use config::Config;
pub use core::context::Context;
pub use core::params::{LoadRequest, StackRequest};
pub use core::processing::{build_stack, load, stack, LoadResult};
pub use error::{Error, Result};
pub use products::{OpticalProduct, Product, ProductInfo, SarProduct};
pub use reader::Reader;
pub use types::{DataType, Resampling, Sensor};
