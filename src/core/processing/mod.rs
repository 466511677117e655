//! Pixel work: masking and index evaluation, resampling onto a grid,
//! terrain derivation, the loading pipeline and stacking.
pub mod ops;
pub mod pipeline;
pub mod resample;
pub mod stack;
pub mod terrain;

pub use pipeline::{load, LoadResult};
pub use stack::{build_stack, stack};
