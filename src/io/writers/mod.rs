//! GeoTIFF writing and dataset metadata tags.
pub mod metadata;
pub mod tiff;
