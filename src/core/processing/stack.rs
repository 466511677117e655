//! Stacking a load into one multi-band raster, optionally quantized to i16.
use ndarray::{Array3, Axis, Zip};
use tracing::{info, warn};

use super::pipeline::{load, LoadResult};
use crate::bands::{classify, policy, BandClass, Token, FLOAT_NODATA};
use crate::core::context::Context;
use crate::core::params::StackRequest;
use crate::core::raster::{BandData, RasterMeta};
use crate::error::{Error, Result};
use crate::io::writers::metadata::{stack_tags, write_json_sidecar};
use crate::io::{OutputBands, RasterOutput};
use crate::products::{Product, ProductInfo};
use crate::types::DataType;

/// Multiplier applied to reflectance-like bands in integer stacks.
pub const SCALE_FACTOR: f64 = 10_000.0;

/// Nodata of integer stacks.
pub const INT_NODATA: i16 = i16::MIN;

/// Terrain and cloud bands keep their own units in integer stacks.
pub fn is_unscaled(token: Token) -> bool {
    matches!(classify(token), BandClass::Terrain | BandClass::Cloud)
}

/// Scaled and rounded value, and whether it had to be clamped to the i16 range.
fn quantize(value: f32, scale: f64) -> (i16, bool) {
    let scaled = (f64::from(value) * scale).round();
    let clamped = scaled.clamp(f64::from(INT_NODATA) + 1.0, f64::from(i16::MAX));
    (clamped as i16, clamped != scaled)
}

/// Concatenate the entries of `result` in order.
pub fn build_stack(info: &ProductInfo, result: &LoadResult, as_int: bool) -> Result<RasterOutput> {
    if result.is_empty() {
        return Err(Error::EoReader("nothing to stack".into()));
    }
    let grid = result.grid();
    let (rows, cols) = grid.shape();
    let count = result.len();
    let names: Vec<String> = result.tokens().iter().map(|t| t.name().to_string()).collect();

    let (bands, meta, scale) = if as_int {
        let mut out = Array3::from_elem((count, rows, cols), INT_NODATA);
        for (i, (token, data)) in result.entries.iter().enumerate() {
            let scale = if is_unscaled(*token) { 1.0 } else { SCALE_FACTOR };
            let raster = data.to_float();
            let mut saturated = 0usize;
            Zip::from(out.index_axis_mut(Axis(0), i))
                .and(&raster.data)
                .and(&raster.mask)
                .for_each(|o, &v, &masked| {
                    if !masked {
                        let (q, clamped) = quantize(v, scale);
                        *o = q;
                        saturated += usize::from(clamped);
                    }
                });
            if saturated > 0 {
                warn!(
                    "{} value(s) of {} saturated the i16 range (scale {})",
                    saturated, token, scale
                );
            }
        }
        let meta = RasterMeta::for_grid(&grid, DataType::Int16, f64::from(INT_NODATA), count);
        (OutputBands::Int16(out), meta, Some(SCALE_FACTOR))
    } else {
        let mut out = Array3::from_elem((count, rows, cols), FLOAT_NODATA as f32);
        for (i, (_, data)) in result.entries.iter().enumerate() {
            let raster = data.to_float();
            out.index_axis_mut(Axis(0), i)
                .assign(&raster.filled(FLOAT_NODATA as f32));
        }
        let meta = RasterMeta::for_grid(&grid, DataType::Float32, FLOAT_NODATA, count);
        (OutputBands::Float32(out), meta, None)
    };

    let mut tags = stack_tags(info, &names, scale);
    if as_int {
        let unscaled: Vec<&str> = result
            .tokens()
            .into_iter()
            .filter(|t| is_unscaled(*t))
            .map(|t| t.name())
            .collect();
        if !unscaled.is_empty() {
            tags.insert("UNSCALED_BANDS".to_string(), unscaled.join(","));
        }
    }
    Ok(RasterOutput {
        meta,
        bands,
        descriptions: names,
        tags,
    })
}

/// Load, stack and optionally write.
pub fn stack(product: &dyn Product, request: &StackRequest, ctx: &Context) -> Result<RasterOutput> {
    let result = load(product, &request.load, ctx)?;
    let raster = build_stack(product.info(), &result, request.as_int)?;
    if let Some(path) = &request.output {
        info!(
            "Writing {}-band stack of {} to {}",
            raster.meta.count,
            product.info().name,
            path.display()
        );
        ctx.io.write(path, &raster)?;
        if request.sidecar {
            write_json_sidecar(path, &raster.tags)?;
        }
    }
    Ok(raster)
}

/// Entry `i` of a load as a single-band raster in its class's encoding.
pub fn band_output(result: &LoadResult, i: usize) -> Result<RasterOutput> {
    let (token, data) = result
        .entries
        .get(i)
        .ok_or_else(|| Error::EoReader(format!("no entry {i} in load result")))?;
    let grid = result.grid();
    let class = policy(classify(*token));
    let meta = RasterMeta::for_grid(&grid, class.dtype, class.nodata, 1);
    let bands = match data {
        BandData::Byte(r) => {
            OutputBands::UInt8(r.filled(class.nodata as u8).insert_axis(Axis(0)))
        }
        BandData::Float(r) => {
            OutputBands::Float32(r.filled(class.nodata as f32).insert_axis(Axis(0)))
        }
    };
    Ok(RasterOutput {
        meta,
        bands,
        descriptions: vec![token.name().to_string()],
        tags: Default::default(),
    })
}
