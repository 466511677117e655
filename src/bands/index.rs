//! Spectral index registry.
//!
//! Each index is one [`IndexDefinition`] entry: a name, the reflectance bands it
//! reads and a closed-form formula. Formulas work on plain arrays and return NaN
//! wherever the expression is undefined (zero denominators); masking of the
//! inputs is applied by the caller.
use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use super::{Band, OpticalBand};
use crate::error::{Error, Result};

use OpticalBand::*;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Index {
    Rgi,
    Ndvi,
    Tcbri,
    Tcgre,
    Tcwet,
    Ndre2,
    Ndre3,
    Gli,
    Gndvi,
    Ri,
    Ndgri,
    Cig,
    Ndmi,
    Dswi,
    Srswir,
    Rdi,
    Ndwi,
    Bai,
    Nbr,
    Mndwi,
    AweiNsh,
    AweiSh,
    Wi,
    Afri1600,
    Afri2100,
    Bsi,
}

type Formula = fn(&IndexInputs<'_>) -> Result<Array2<f32>>;

pub struct IndexDefinition {
    pub index: Index,
    pub name: &'static str,
    pub bands: &'static [OpticalBand],
    formula: Formula,
}

impl fmt::Debug for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("name", &self.name)
            .field("bands", &self.bands)
            .finish()
    }
}

macro_rules! def {
    ($index:ident, $name:literal, [$($band:ident),+], $formula:expr) => {
        IndexDefinition {
            index: Index::$index,
            name: $name,
            bands: &[$($band),+],
            formula: $formula,
        }
    };
}

static REGISTRY: [IndexDefinition; 26] = [
    def!(Rgi, "RGI", [Red, Green], |b| ratio(b.get(Red)?, b.get(Green)?)),
    def!(Ndvi, "NDVI", [Nir, Red], |b| norm_diff(b.get(Nir)?, b.get(Red)?)),
    def!(Tcbri, "TCBRI", [Blue, Green, Red, Nir, Swir1, Swir2], |b| {
        b.linear(
            0.0,
            &[
                (0.3037, Blue),
                (0.2793, Green),
                (0.4743, Red),
                (0.5585, Nir),
                (0.5082, Swir1),
                (0.1863, Swir2),
            ],
        )
    }),
    def!(Tcgre, "TCGRE", [Blue, Green, Red, Nir, Swir1, Swir2], |b| {
        b.linear(
            0.0,
            &[
                (-0.2848, Blue),
                (-0.2435, Green),
                (-0.5436, Red),
                (0.7243, Nir),
                (0.0840, Swir1),
                (-0.1800, Swir2),
            ],
        )
    }),
    def!(Tcwet, "TCWET", [Blue, Green, Red, Nir, Swir1, Swir2], |b| {
        b.linear(
            0.0,
            &[
                (0.1509, Blue),
                (0.1973, Green),
                (0.3279, Red),
                (0.3406, Nir),
                (-0.7112, Swir1),
                (-0.4572, Swir2),
            ],
        )
    }),
    def!(Ndre2, "NDRE2", [Nir, Vre1], |b| norm_diff(b.get(Nir)?, b.get(Vre1)?)),
    def!(Ndre3, "NDRE3", [Nir, Vre2], |b| norm_diff(b.get(Nir)?, b.get(Vre2)?)),
    def!(Gli, "GLI", [Green, Red, Blue], |b| {
        let num = b.linear(0.0, &[(2.0, Green), (-2.0, Red), (-2.0, Blue)])?;
        let den = b.linear(0.0, &[(2.0, Green), (2.0, Red), (2.0, Blue)])?;
        ratio(num.view(), den.view())
    }),
    def!(Gndvi, "GNDVI", [Nir, Green], |b| norm_diff(b.get(Nir)?, b.get(Green)?)),
    def!(Ri, "RI", [Vre1, Green], |b| norm_diff(b.get(Vre1)?, b.get(Green)?)),
    def!(Ndgri, "NDGRI", [Green, Red], |b| norm_diff(b.get(Green)?, b.get(Red)?)),
    def!(Cig, "CIG", [Nir, Green], |b| {
        Ok(ratio(b.get(Nir)?, b.get(Green)?)? - 1.0)
    }),
    def!(Ndmi, "NDMI", [Nir, Swir1], |b| norm_diff(b.get(Nir)?, b.get(Swir1)?)),
    def!(Dswi, "DSWI", [Nir, Green, Swir1, Red], |b| {
        let num = b.linear(0.0, &[(1.0, Nir), (1.0, Green)])?;
        let den = b.linear(0.0, &[(1.0, Swir1), (1.0, Red)])?;
        ratio(num.view(), den.view())
    }),
    def!(Srswir, "SRSWIR", [Swir1, Swir2], |b| ratio(b.get(Swir1)?, b.get(Swir2)?)),
    def!(Rdi, "RDI", [Swir2, NarrowNir], |b| ratio(b.get(Swir2)?, b.get(NarrowNir)?)),
    def!(Ndwi, "NDWI", [Green, Nir], |b| norm_diff(b.get(Green)?, b.get(Nir)?)),
    def!(Bai, "BAI", [Red, Nir], |b| {
        let mut out = Array2::zeros(b.get(Red)?.dim());
        Zip::from(&mut out)
            .and(b.get(Red)?)
            .and(b.get(Nir)?)
            .for_each(|o, &red, &nir| {
                let d = (0.1 - red).powi(2) + (0.06 - nir).powi(2);
                *o = if d.abs() > f32::EPSILON { 1.0 / d } else { f32::NAN };
            });
        Ok(out)
    }),
    def!(Nbr, "NBR", [NarrowNir, Swir2], |b| norm_diff(b.get(NarrowNir)?, b.get(Swir2)?)),
    def!(Mndwi, "MNDWI", [Green, Swir1], |b| norm_diff(b.get(Green)?, b.get(Swir1)?)),
    def!(AweiNsh, "AWEInsh", [Green, Swir1, Nir, Swir2], |b| {
        b.linear(
            0.0,
            &[(4.0, Green), (-4.0, Swir1), (-0.25, Nir), (-2.75, Swir2)],
        )
    }),
    def!(AweiSh, "AWEIsh", [Blue, Green, Nir, Swir1, Swir2], |b| {
        b.linear(
            0.0,
            &[
                (1.0, Blue),
                (2.5, Green),
                (-1.5, Nir),
                (-1.5, Swir1),
                (-0.25, Swir2),
            ],
        )
    }),
    def!(Wi, "WI", [Green, Red, Nir, Swir1, Swir2], |b| {
        b.linear(
            1.7204,
            &[
                (171.0, Green),
                (3.0, Red),
                (-70.0, Nir),
                (-45.0, Swir1),
                (-71.0, Swir2),
            ],
        )
    }),
    def!(Afri1600, "AFRI_1_6", [Nir, Swir1], |b| {
        let swir = b.get(Swir1)?.mapv(|v| 0.66 * v);
        norm_diff(b.get(Nir)?, swir.view())
    }),
    def!(Afri2100, "AFRI_2_1", [Nir, Swir2], |b| {
        let swir = b.get(Swir2)?.mapv(|v| 0.5 * v);
        norm_diff(b.get(Nir)?, swir.view())
    }),
    def!(Bsi, "BSI", [Red, Swir1, Nir, Blue], |b| {
        let a = b.linear(0.0, &[(1.0, Red), (1.0, Swir1)])?;
        let c = b.linear(0.0, &[(1.0, Nir), (1.0, Blue)])?;
        norm_diff(a.view(), c.view())
    }),
];

impl Index {
    pub const ALL: [Index; 26] = [
        Index::Rgi,
        Index::Ndvi,
        Index::Tcbri,
        Index::Tcgre,
        Index::Tcwet,
        Index::Ndre2,
        Index::Ndre3,
        Index::Gli,
        Index::Gndvi,
        Index::Ri,
        Index::Ndgri,
        Index::Cig,
        Index::Ndmi,
        Index::Dswi,
        Index::Srswir,
        Index::Rdi,
        Index::Ndwi,
        Index::Bai,
        Index::Nbr,
        Index::Mndwi,
        Index::AweiNsh,
        Index::AweiSh,
        Index::Wi,
        Index::Afri1600,
        Index::Afri2100,
        Index::Bsi,
    ];

    pub fn definition(self) -> &'static IndexDefinition {
        // The registry is laid out in declaration order.
        &REGISTRY[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn required_bands(self) -> Vec<Band> {
        self.definition()
            .bands
            .iter()
            .map(|b| Band::Optical(*b))
            .collect()
    }

    /// Evaluate the formula; fails with `InvalidIndex` when an input is absent.
    pub fn evaluate(self, inputs: &IndexInputs<'_>) -> Result<Array2<f32>> {
        let def = self.definition();
        let missing: Vec<&str> = def
            .bands
            .iter()
            .filter(|b| !inputs.bands.contains_key(b))
            .map(|b| b.name())
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidIndex {
                index: def.name.to_string(),
                missing: missing.join(", "),
            });
        }
        (def.formula)(inputs)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enumerate the whole registry.
pub fn all_definitions() -> &'static [IndexDefinition] {
    &REGISTRY
}

/// Collocated reflectance arrays handed to a formula.
#[derive(Default)]
pub struct IndexInputs<'a> {
    bands: BTreeMap<OpticalBand, ArrayView2<'a, f32>>,
}

impl<'a> IndexInputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, band: OpticalBand, data: ArrayView2<'a, f32>) {
        self.bands.insert(band, data);
    }

    fn get(&self, band: OpticalBand) -> Result<ArrayView2<'a, f32>> {
        self.bands.get(&band).copied().ok_or_else(|| {
            Error::invalid_band(band, "not provided to index evaluation")
        })
    }

    fn linear(&self, constant: f32, terms: &[(f32, OpticalBand)]) -> Result<Array2<f32>> {
        let (_, first) = terms
            .first()
            .ok_or_else(|| Error::EoReader("empty linear combination".into()))?;
        let mut out = Array2::from_elem(self.get(*first)?.dim(), constant);
        for (coef, band) in terms {
            let data = self.get(*band)?;
            check_shape(&out.view(), &data)?;
            Zip::from(&mut out).and(data).for_each(|o, &v| *o += coef * v);
        }
        Ok(out)
    }
}

fn check_shape(a: &ArrayView2<'_, f32>, b: &ArrayView2<'_, f32>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(Error::EoReader(format!(
            "index inputs are not collocated: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    Ok(())
}

/// (a - b) / (a + b), NaN where the sum vanishes.
pub fn norm_diff(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    check_shape(&a, &b)?;
    let mut out = Array2::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|o, &x, &y| {
        let sum = x + y;
        *o = if sum.abs() > f32::EPSILON {
            (x - y) / sum
        } else {
            f32::NAN
        };
    });
    Ok(out)
}

/// a / b, NaN where b vanishes.
pub fn ratio(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    check_shape(&a, &b)?;
    let mut out = Array2::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|o, &x, &y| {
        *o = if y.abs() > f32::EPSILON { x / y } else { f32::NAN };
    });
    Ok(out)
}
