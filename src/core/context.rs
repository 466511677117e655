use std::sync::Arc;

use crate::config::Config;
use crate::io::{CommandRunner, ExternalTool, GdalRasterIo, RasterIo};

/// Collaborators a load runs against: configuration, the external tool
/// runner and raster I/O.
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub tool: Arc<dyn ExternalTool>,
    pub io: Arc<dyn RasterIo>,
}

impl Context {
    pub fn new(config: Config, tool: Arc<dyn ExternalTool>, io: Arc<dyn RasterIo>) -> Self {
        Self { config, tool, io }
    }

    /// Environment configuration, real processes and GDAL.
    pub fn from_env() -> Self {
        Self::new(
            Config::from_env(),
            Arc::new(CommandRunner),
            Arc::new(GdalRasterIo),
        )
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
