//! Error types for KML/KMZ conversion.

use thiserror::Error;

/// Errors that terminate a conversion request.
///
/// Display strings are the user-facing status messages.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The KMZ archive has no member ending in `.kml`.
    #[error("No KML file found inside KMZ")]
    MissingKmlMember,

    /// The input is not well-formed XML.
    #[error("Invalid KML format")]
    MalformedXml(String),

    /// Extraction finished without producing a single record.
    #[error("No placemarks found in file")]
    NoGeometryFound,

    /// The selected file name has neither a `.kml` nor a `.kmz` suffix.
    #[error("Please select a .kmz or .kml file")]
    UnrecognizedExtension(String),

    /// The KMZ bytes are not a readable zip archive.
    #[error("Invalid KMZ archive: {0}")]
    Archive(String),

    /// I/O error reading input or saving output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ConvertError {
    /// Create a malformed XML error.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedXml(detail.into())
    }

    /// Create an archive error.
    pub fn archive(detail: impl Into<String>) -> Self {
        Self::Archive(detail.into())
    }
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;
