use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "eobands", version, about = "Load and stack bands of satellite products")]
pub struct CliArgs {
    /// Product directory or archive
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for per-band GeoTIFFs and derived artifacts
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Zip archive holding the product, when --input only names it
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Bands and indices, comma separated (e.g. NDVI,GREEN,CLOUDS)
    #[arg(short, long, value_delimiter = ',')]
    pub bands: Vec<String>,

    /// Target resolution in metres (takes precedence over --size)
    #[arg(short, long)]
    pub resolution: Option<f64>,

    /// Target size in pixels, WIDTHxHEIGHT
    #[arg(long)]
    pub size: Option<String>,

    /// Write all bands as one multi-band GeoTIFF to this path
    #[arg(long)]
    pub stack: Option<PathBuf>,

    /// Quantize the stack to 16-bit integers (scale factor 10000)
    #[arg(long, default_value_t = false)]
    pub as_int: bool,

    /// Write a JSON sidecar with the stack tags
    #[arg(long, default_value_t = false)]
    pub sidecar: bool,

    /// Print a JSON summary of the product and exit
    #[arg(long, default_value_t = false)]
    pub info: bool,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
