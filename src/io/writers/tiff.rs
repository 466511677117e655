use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use std::path::Path;
use tracing::info;

use super::metadata::embed_tags;
use crate::io::gdal::GdalError;
use crate::io::raster::{OutputBands, RasterOutput};

/// Write a multi-band GeoTIFF with georeferencing, nodata, band names and tags.
pub fn write_geotiff(output: &Path, raster: &RasterOutput) -> Result<(), GdalError> {
    let mut ds = match &raster.bands {
        OutputBands::Float32(a) => write_bands(output, a, raster)?,
        OutputBands::Int16(a) => write_bands(output, a, raster)?,
        OutputBands::UInt8(a) => write_bands(output, a, raster)?,
    };
    ds.set_geo_transform(&raster.meta.transform.to_gdal())?;
    let srs = SpatialRef::from_definition(raster.meta.crs.as_str())?;
    ds.set_spatial_ref(&srs)?;
    embed_tags(&mut ds, &raster.tags)?;
    info!(
        "Wrote {}x{}x{} {} GeoTIFF: {:?}",
        raster.meta.count, raster.meta.height, raster.meta.width, raster.meta.dtype, output
    );
    Ok(())
}

fn write_bands<T: GdalType + Copy>(
    output: &Path,
    data: &Array3<T>,
    raster: &RasterOutput,
) -> Result<Dataset, GdalError> {
    let (count, rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<T, _>(output, cols, rows, count)?;
    for (i, plane) in data.axis_iter(Axis(0)).enumerate() {
        let mut band = ds.rasterband(i + 1)?;
        band.set_no_data_value(Some(raster.meta.nodata))?;
        if let Some(name) = raster.descriptions.get(i) {
            band.set_description(name)?;
        }
        let mut buf = Buffer::new((cols, rows), plane.iter().copied().collect());
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}
