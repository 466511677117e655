//! Crate-level error type and `Result` alias.
//! Wraps I/O, GDAL, XML and archive errors, and carries the semantic variants
//! used by band resolution, product identification and external processing.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown band or index: {0}")]
    UnknownBand(String),

    #[error("Invalid band {band}: {reason}")]
    InvalidBand { band: String, reason: String },

    #[error("Invalid index {index}: missing bands {missing}")]
    InvalidIndex { index: String, missing: String },

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Ambiguous product {path:?}: matches {candidates}")]
    Ambiguous { path: PathBuf, candidates: String },

    #[error("External tool `{program}` failed ({status}): {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    EoReader(String),
}

impl Error {
    pub fn invalid_band(band: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::InvalidBand {
            band: band.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_product(msg: impl Into<String>) -> Self {
        Error::InvalidProduct(msg.into())
    }

    /// True for the variants raised while validating a request, before any I/O.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownBand(_)
                | Error::InvalidBand { .. }
                | Error::InvalidIndex { .. }
                | Error::InvalidType(_)
                | Error::InvalidRequest(_)
        )
    }
}
