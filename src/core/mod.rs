//! Core building blocks: raster primitives and geometry, the processing
//! context, the geocoding cache, request parameters, and the loading,
//! terrain and stacking steps consumed by the high-level `api` module.
pub mod context;
pub mod geocode;
pub mod geometry;
pub mod params;
pub mod processing;
pub mod raster;
