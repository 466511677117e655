//! I/O layer: product file access (directories and zip archives), metadata
//! XML, GDAL-backed raster reading and GeoTIFF writing, and the external
//! command-line tools used for geocoding and warping.
pub mod archive;
pub use archive::ProductFiles;

pub mod gdal;
pub use self::gdal::{GdalError, GdalMetadata, GdalReader};

pub mod raster;
pub use raster::{GdalRasterIo, OutputBands, RasterIo, RasterOutput, SourceRaster};

pub mod tools;
pub use tools::{CommandRunner, ExternalTool};

pub mod writers;
pub mod xml;
