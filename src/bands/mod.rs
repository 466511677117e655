//! Canonical band vocabulary shared by every sensor.
//!
//! A request names bands and indices with plain strings (`"NDVI"`, `"VV_DSPK"`,
//! `"CLOUDS"`). [`resolve`] turns those into typed [`Token`]s, [`classify`]
//! sorts them into a [`BandClass`], and [`policy`] maps a class to its nodata
//! value and resampling kernel. Nothing here touches the filesystem.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DataType, Resampling};

pub mod index;
pub use index::{Index, IndexDefinition, IndexInputs};

/// Reflectance bands, named after their spectral role rather than a sensor band number.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum OpticalBand {
    Ca,
    Blue,
    Green,
    Red,
    Vre1,
    Vre2,
    Vre3,
    Nir,
    NarrowNir,
    Wv,
    SwirCirrus,
    Swir1,
    Swir2,
    Pan,
}

/// Radar polarizations and their despeckled companions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum SarBand {
    Vv,
    VvDspk,
    Hh,
    HhDspk,
    Vh,
    VhDspk,
    Hv,
    HvDspk,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum TerrainBand {
    Dem,
    Slope,
    Hillshade,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum CloudBand {
    RawClouds,
    Clouds,
    Cirrus,
    AllClouds,
}

/// Any band that can be read or derived from a product, as opposed to an index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Band {
    Optical(OpticalBand),
    Sar(SarBand),
    Terrain(TerrainBand),
    Cloud(CloudBand),
}

/// A resolved request item.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Token {
    Band(Band),
    Index(Index),
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BandClass {
    Optical,
    Sar,
    Terrain,
    Cloud,
    Index,
}

impl OpticalBand {
    pub const ALL: [OpticalBand; 14] = [
        OpticalBand::Ca,
        OpticalBand::Blue,
        OpticalBand::Green,
        OpticalBand::Red,
        OpticalBand::Vre1,
        OpticalBand::Vre2,
        OpticalBand::Vre3,
        OpticalBand::Nir,
        OpticalBand::NarrowNir,
        OpticalBand::Wv,
        OpticalBand::SwirCirrus,
        OpticalBand::Swir1,
        OpticalBand::Swir2,
        OpticalBand::Pan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpticalBand::Ca => "CA",
            OpticalBand::Blue => "BLUE",
            OpticalBand::Green => "GREEN",
            OpticalBand::Red => "RED",
            OpticalBand::Vre1 => "VRE_1",
            OpticalBand::Vre2 => "VRE_2",
            OpticalBand::Vre3 => "VRE_3",
            OpticalBand::Nir => "NIR",
            OpticalBand::NarrowNir => "NARROW_NIR",
            OpticalBand::Wv => "WV",
            OpticalBand::SwirCirrus => "SWIR_CIRRUS",
            OpticalBand::Swir1 => "SWIR_1",
            OpticalBand::Swir2 => "SWIR_2",
            OpticalBand::Pan => "PAN",
        }
    }
}

impl SarBand {
    pub const ALL: [SarBand; 8] = [
        SarBand::Vv,
        SarBand::VvDspk,
        SarBand::Hh,
        SarBand::HhDspk,
        SarBand::Vh,
        SarBand::VhDspk,
        SarBand::Hv,
        SarBand::HvDspk,
    ];

    /// Raw polarizations, in default-band preference order.
    pub const RAW: [SarBand; 4] = [SarBand::Vv, SarBand::Hh, SarBand::Vh, SarBand::Hv];

    pub fn name(self) -> &'static str {
        match self {
            SarBand::Vv => "VV",
            SarBand::VvDspk => "VV_DSPK",
            SarBand::Hh => "HH",
            SarBand::HhDspk => "HH_DSPK",
            SarBand::Vh => "VH",
            SarBand::VhDspk => "VH_DSPK",
            SarBand::Hv => "HV",
            SarBand::HvDspk => "HV_DSPK",
        }
    }

    pub fn is_despeckled(self) -> bool {
        matches!(
            self,
            SarBand::VvDspk | SarBand::HhDspk | SarBand::VhDspk | SarBand::HvDspk
        )
    }

    pub fn despeckled(self) -> SarBand {
        match self {
            SarBand::Vv | SarBand::VvDspk => SarBand::VvDspk,
            SarBand::Hh | SarBand::HhDspk => SarBand::HhDspk,
            SarBand::Vh | SarBand::VhDspk => SarBand::VhDspk,
            SarBand::Hv | SarBand::HvDspk => SarBand::HvDspk,
        }
    }

    pub fn speckled(self) -> SarBand {
        match self {
            SarBand::Vv | SarBand::VvDspk => SarBand::Vv,
            SarBand::Hh | SarBand::HhDspk => SarBand::Hh,
            SarBand::Vh | SarBand::VhDspk => SarBand::Vh,
            SarBand::Hv | SarBand::HvDspk => SarBand::Hv,
        }
    }
}

impl TerrainBand {
    pub const ALL: [TerrainBand; 3] = [TerrainBand::Dem, TerrainBand::Slope, TerrainBand::Hillshade];

    pub fn name(self) -> &'static str {
        match self {
            TerrainBand::Dem => "DEM",
            TerrainBand::Slope => "SLOPE",
            TerrainBand::Hillshade => "HILLSHADE",
        }
    }
}

impl CloudBand {
    pub const ALL: [CloudBand; 4] = [
        CloudBand::RawClouds,
        CloudBand::Clouds,
        CloudBand::Cirrus,
        CloudBand::AllClouds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CloudBand::RawClouds => "RAW_CLOUDS",
            CloudBand::Clouds => "CLOUDS",
            CloudBand::Cirrus => "CIRRUS",
            CloudBand::AllClouds => "ALL_CLOUDS",
        }
    }
}

impl Band {
    /// Every band identifier, in registry order.
    pub fn all() -> impl Iterator<Item = Band> {
        OpticalBand::ALL
            .into_iter()
            .map(Band::Optical)
            .chain(SarBand::ALL.into_iter().map(Band::Sar))
            .chain(TerrainBand::ALL.into_iter().map(Band::Terrain))
            .chain(CloudBand::ALL.into_iter().map(Band::Cloud))
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Optical(b) => b.name(),
            Band::Sar(b) => b.name(),
            Band::Terrain(b) => b.name(),
            Band::Cloud(b) => b.name(),
        }
    }

    pub fn class(self) -> BandClass {
        match self {
            Band::Optical(_) => BandClass::Optical,
            Band::Sar(_) => BandClass::Sar,
            Band::Terrain(_) => BandClass::Terrain,
            Band::Cloud(_) => BandClass::Cloud,
        }
    }
}

impl Token {
    pub fn name(self) -> &'static str {
        match self {
            Token::Band(b) => b.name(),
            Token::Index(i) => i.name(),
        }
    }

    /// The band behind this token; indices are never bands.
    pub fn as_band(self) -> Result<Band> {
        match self {
            Token::Band(b) => Ok(b),
            Token::Index(i) => Err(Error::InvalidType(format!(
                "{} is an index, not a band",
                i.name()
            ))),
        }
    }

    pub fn as_index(self) -> Result<Index> {
        match self {
            Token::Index(i) => Ok(i),
            Token::Band(b) => Err(Error::InvalidType(format!(
                "{} is a band, not an index",
                b.name()
            ))),
        }
    }
}

macro_rules! display_by_name {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        })*
    };
}

display_by_name!(OpticalBand, SarBand, TerrainBand, CloudBand, Band, Token);

impl From<Band> for Token {
    fn from(b: Band) -> Self {
        Token::Band(b)
    }
}

impl From<Index> for Token {
    fn from(i: Index) -> Self {
        Token::Index(i)
    }
}

impl From<OpticalBand> for Band {
    fn from(b: OpticalBand) -> Self {
        Band::Optical(b)
    }
}

impl From<SarBand> for Band {
    fn from(b: SarBand) -> Self {
        Band::Sar(b)
    }
}

impl From<TerrainBand> for Band {
    fn from(b: TerrainBand) -> Self {
        Band::Terrain(b)
    }
}

impl From<CloudBand> for Band {
    fn from(b: CloudBand) -> Self {
        Band::Cloud(b)
    }
}

impl TryFrom<Band> for SarBand {
    type Error = Error;

    fn try_from(b: Band) -> Result<Self> {
        match b {
            Band::Sar(s) => Ok(s),
            other => Err(Error::InvalidType(format!("{other} is not a SAR band"))),
        }
    }
}

impl TryFrom<Band> for OpticalBand {
    type Error = Error;

    fn try_from(b: Band) -> Result<Self> {
        match b {
            Band::Optical(o) => Ok(o),
            other => Err(Error::InvalidType(format!("{other} is not an optical band"))),
        }
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_uppercase().replace('-', "_");
        if let Some(b) = Band::all().find(|b| b.name() == key) {
            return Ok(Token::Band(b));
        }
        if let Some(i) = Index::ALL.iter().find(|i| i.name().eq_ignore_ascii_case(&key)) {
            return Ok(Token::Index(*i));
        }
        Err(Error::UnknownBand(s.to_string()))
    }
}

impl FromStr for Band {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Token>()?.as_band()
    }
}

/// Anything a caller may hand to [`resolve`]: canonical names or typed values.
pub trait AsToken {
    fn as_token(&self) -> Result<Token>;
}

impl AsToken for str {
    fn as_token(&self) -> Result<Token> {
        self.parse()
    }
}

impl AsToken for String {
    fn as_token(&self) -> Result<Token> {
        self.parse()
    }
}

impl AsToken for Token {
    fn as_token(&self) -> Result<Token> {
        Ok(*self)
    }
}

impl AsToken for Band {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Band(*self))
    }
}

impl AsToken for Index {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Index(*self))
    }
}

impl AsToken for OpticalBand {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Band(Band::Optical(*self)))
    }
}

impl AsToken for SarBand {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Band(Band::Sar(*self)))
    }
}

impl AsToken for TerrainBand {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Band(Band::Terrain(*self)))
    }
}

impl AsToken for CloudBand {
    fn as_token(&self) -> Result<Token> {
        Ok(Token::Band(Band::Cloud(*self)))
    }
}

pub fn resolve<T: AsToken + ?Sized>(token: &T) -> Result<Token> {
    token.as_token()
}

/// Resolve a list, dropping duplicates while keeping first-seen order.
pub fn resolve_all<T: AsToken>(tokens: &[T]) -> Result<Vec<Token>> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for t in tokens {
        let token = resolve(t)?;
        if !out.contains(&token) {
            out.push(token);
        }
    }
    Ok(out)
}

pub fn classify(token: Token) -> BandClass {
    match token {
        Token::Band(b) => b.class(),
        Token::Index(_) => BandClass::Index,
    }
}

pub fn name_of(token: Token) -> &'static str {
    token.name()
}

pub fn despeckled_of(band: Band) -> Result<Band> {
    match band {
        Band::Sar(s) => Ok(Band::Sar(s.despeckled())),
        other => Err(Error::invalid_band(other, "only SAR bands can be despeckled")),
    }
}

pub fn speckled_of(band: Band) -> Result<Band> {
    match band {
        Band::Sar(s) => Ok(Band::Sar(s.speckled())),
        other => Err(Error::invalid_band(other, "only SAR bands have a speckled variant")),
    }
}

/// Per-class conventions consulted wherever pixels are masked, resampled or written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPolicy {
    /// Value marking invalid pixels in sources and outputs of this class.
    pub nodata: f64,
    pub resampling: Resampling,
    pub dtype: DataType,
}

pub const FLOAT_NODATA: f64 = -9999.0;
pub const CLOUD_NODATA: u8 = 255;

pub fn policy(class: BandClass) -> ClassPolicy {
    match class {
        BandClass::Optical | BandClass::Sar => ClassPolicy {
            nodata: 0.0,
            resampling: Resampling::Bilinear,
            dtype: DataType::Float32,
        },
        BandClass::Cloud => ClassPolicy {
            nodata: CLOUD_NODATA as f64,
            resampling: Resampling::Nearest,
            dtype: DataType::UInt8,
        },
        BandClass::Terrain | BandClass::Index => ClassPolicy {
            nodata: FLOAT_NODATA,
            resampling: Resampling::Bilinear,
            dtype: DataType::Float32,
        },
    }
}
