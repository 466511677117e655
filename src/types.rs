//! Shared enums used across the crate: sensors and their families, pixel data
//! types and resampling kernels.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Platforms the reader knows how to open, in identification preference order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum Sensor {
    #[value(name = "s2")]
    Sentinel2,
    #[value(name = "s3")]
    Sentinel3,
    #[value(name = "s1")]
    Sentinel1,
    #[value(name = "rs2")]
    Radarsat2,
    #[value(name = "csk")]
    CosmoSkymed,
    #[value(name = "pld")]
    Pleiades,
    #[value(name = "spot")]
    Spot,
}

impl Sensor {
    pub const ALL: [Sensor; 7] = [
        Sensor::Sentinel2,
        Sensor::Sentinel3,
        Sensor::Sentinel1,
        Sensor::Radarsat2,
        Sensor::CosmoSkymed,
        Sensor::Pleiades,
        Sensor::Spot,
    ];

    /// Short tag used inside condensed product names.
    pub fn tag(self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "S2",
            Sensor::Sentinel3 => "S3",
            Sensor::Sentinel1 => "S1",
            Sensor::Radarsat2 => "RS2",
            Sensor::CosmoSkymed => "CSK",
            Sensor::Pleiades => "PLD",
            Sensor::Spot => "SPOT",
        }
    }

    pub fn family(self) -> SensorFamily {
        match self {
            Sensor::Sentinel1 | Sensor::Radarsat2 | Sensor::CosmoSkymed => SensorFamily::Sar,
            _ => SensorFamily::Optical,
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sensor::Sentinel2 => "Sentinel-2",
            Sensor::Sentinel3 => "Sentinel-3",
            Sensor::Sentinel1 => "Sentinel-1",
            Sensor::Radarsat2 => "RADARSAT-2",
            Sensor::CosmoSkymed => "COSMO-SkyMed",
            Sensor::Pleiades => "Pleiades",
            Sensor::Spot => "SPOT",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SensorFamily {
    Optical,
    Sar,
}

/// Pixel type of a loaded or written raster.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Int16,
    Float32,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::Float32 => "float32",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, ValueEnum, Debug, Serialize, Deserialize)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

impl Resampling {
    /// Name understood by `gdalwarp -r`.
    pub fn gdal_name(self) -> &'static str {
        match self {
            Resampling::Nearest => "near",
            Resampling::Bilinear => "bilinear",
        }
    }
}
