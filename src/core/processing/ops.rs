use std::collections::BTreeMap;

use ndarray::{Array2, Zip};

use crate::bands::{Band, CloudBand, Index, IndexInputs, CLOUD_NODATA};
use crate::core::raster::{BandData, MaskedRaster};
use crate::error::{Error, Result};

/// Mask cells equal to the class nodata, to the source's own nodata, or NaN.
pub fn mask_invalid(data: Array2<f32>, class_nodata: f64, source_nodata: Option<f64>) -> MaskedRaster<f32> {
    let class_nodata = class_nodata as f32;
    let source_nodata = source_nodata.map(|v| v as f32);
    MaskedRaster::masked_where(data, |v| {
        v.is_nan() || v == class_nodata || source_nodata.is_some_and(|nd| v == nd)
    })
}

/// Logical OR of masks of equal shape.
pub fn union_mask<'a>(masks: impl IntoIterator<Item = &'a Array2<bool>>) -> Option<Array2<bool>> {
    let mut iter = masks.into_iter();
    let mut out = iter.next()?.clone();
    for m in iter {
        Zip::from(&mut out).and(m).for_each(|o, &x| *o |= x);
    }
    Some(out)
}

/// Evaluate an index over collocated bands. The result is masked wherever any
/// input is masked or the formula is not finite (division by zero).
pub fn evaluate_index(index: Index, bands: &BTreeMap<Band, BandData>) -> Result<MaskedRaster<f32>> {
    let mut inputs = IndexInputs::new();
    let mut masks = Vec::new();
    for band in index.required_bands() {
        let data = bands
            .get(&band)
            .ok_or_else(|| Error::InvalidIndex {
                index: index.name().to_string(),
                missing: band.name().to_string(),
            })?;
        let (Band::Optical(optical), BandData::Float(raster)) = (band, data) else {
            return Err(Error::invalid_band(band, "not a reflectance band"));
        };
        inputs.insert(optical, raster.data.view());
        masks.push(&raster.mask);
    }
    let data = index.evaluate(&inputs)?;
    let mut mask = union_mask(masks).unwrap_or_else(|| Array2::from_elem(data.dim(), false));
    Zip::from(&mut mask).and(&data).for_each(|m, v| *m |= !v.is_finite());
    MaskedRaster::new(data, mask)
}

/// Cloud band from opaque and cirrus coverage; `invalid` marks product nodata.
///
/// `RAW_CLOUDS` is a bit field (1 opaque, 2 cirrus); the others are 0/1.
pub fn cloud_band(
    kind: CloudBand,
    opaque: &Array2<bool>,
    cirrus: &Array2<bool>,
    invalid: &Array2<bool>,
) -> MaskedRaster<u8> {
    let mut data = Array2::zeros(opaque.dim());
    Zip::from(&mut data)
        .and(opaque)
        .and(cirrus)
        .and(invalid)
        .for_each(|v, &o, &c, &nd| {
            *v = if nd {
                CLOUD_NODATA
            } else {
                match kind {
                    CloudBand::RawClouds => u8::from(o) | (u8::from(c) << 1),
                    CloudBand::Clouds => u8::from(o),
                    CloudBand::Cirrus => u8::from(c),
                    CloudBand::AllClouds => u8::from(o || c),
                }
            };
        });
    MaskedRaster {
        data,
        mask: invalid.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::OpticalBand;
    use ndarray::array;

    #[test]
    fn invalid_values_are_masked() {
        let m = mask_invalid(array![[0.0f32, 1.0, f32::NAN, 7.0]], 0.0, Some(7.0));
        assert_eq!(m.mask, array![[true, false, true, true]]);
    }

    #[test]
    fn index_mask_is_union_of_inputs_plus_division_by_zero() {
        let nir = MaskedRaster::new(
            array![[0.5f32, 0.6, 0.0]],
            array![[false, true, false]],
        )
        .unwrap();
        let red = MaskedRaster::new(
            array![[0.1f32, 0.1, 0.0]],
            array![[false, false, false]],
        )
        .unwrap();
        let mut bands = BTreeMap::new();
        bands.insert(Band::Optical(OpticalBand::Nir), BandData::Float(nir));
        bands.insert(Band::Optical(OpticalBand::Red), BandData::Float(red));
        let ndvi = evaluate_index(Index::Ndvi, &bands).unwrap();
        assert_eq!(ndvi.mask, array![[false, true, true]]);
        approx::assert_abs_diff_eq!(ndvi.data[[0, 0]], 0.4 / 0.6, epsilon = 1e-6);
    }

    #[test]
    fn missing_input_is_an_index_error() {
        let bands = BTreeMap::new();
        assert!(matches!(
            evaluate_index(Index::Ndvi, &bands),
            Err(Error::InvalidIndex { .. })
        ));
    }

    #[test]
    fn cloud_encodings() {
        let opaque = array![[true, false, true, false]];
        let cirrus = array![[false, true, true, false]];
        let invalid = array![[false, false, false, true]];
        let raw = cloud_band(CloudBand::RawClouds, &opaque, &cirrus, &invalid);
        assert_eq!(raw.data, array![[1u8, 2, 3, 255]]);
        let all = cloud_band(CloudBand::AllClouds, &opaque, &cirrus, &invalid);
        assert_eq!(all.data, array![[1u8, 1, 1, 255]]);
        assert_eq!(all.mask, invalid);
        let clouds = cloud_band(CloudBand::Clouds, &opaque, &cirrus, &invalid);
        assert_eq!(clouds.data, array![[1u8, 0, 1, 255]]);
    }
}
