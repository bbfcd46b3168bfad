//! Error types for pdfeditz library.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pdfeditz operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while processing documents.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as a PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The request itself is unusable (wrong file type, empty upload, bad tier).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The upload exceeds the configured size ceiling.
    #[error("File is too large ({size} bytes). Maximum size is {limit} bytes")]
    OversizedInput { size: u64, limit: u64 },

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Low-level PDF object error.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The document cannot be decoded at all.
    #[error("Cannot decode document: {0}")]
    FatalDecode(String),

    /// A single page or image could not be transformed.
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    Image(String),

    /// Every compression attempt failed.
    #[error("Compression failed after {} attempt(s): {}", attempts.len(), attempts.join("; "))]
    CompressionFailed { attempts: Vec<String> },

    /// An external tool could not be started.
    #[error("{tool} is not available: {message}")]
    ToolUnavailable { tool: String, message: String },

    /// An external tool ran but did not produce a document.
    #[error("{tool} conversion failed: {message}")]
    ConversionFailed { tool: String, message: String },

    /// A bounded operation did not finish in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller mistake; never retried.
    InvalidInput,
    /// Rejected before any processing.
    OversizedInput,
    /// A single unit failed; normally recovered locally.
    TransformFailure,
    /// The document cannot be parsed at any tier.
    FatalDecodeFailure,
    /// Converter or rasterizer subprocess failure.
    ExternalToolFailure,
    /// A bounded operation expired.
    Timeout,
    /// Filesystem failure.
    Io,
    /// Configuration or internal fault.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownFormat | Error::UnsupportedVersion(_) | Error::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Error::OversizedInput { .. } => ErrorKind::OversizedInput,
            Error::Transform(_) | Error::Image(_) => ErrorKind::TransformFailure,
            Error::Encrypted
            | Error::PdfParse(_)
            | Error::FatalDecode(_)
            | Error::CompressionFailed { .. } => ErrorKind::FatalDecodeFailure,
            Error::ToolUnavailable { .. } | Error::ConversionFailed { .. } => {
                ErrorKind::ExternalToolFailure
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidConfig(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error should be shown to the client as their mistake.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::OversizedInput
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Encrypted;
        assert_eq!(err.to_string(), "Document is encrypted");

        let err = Error::OversizedInput {
            size: 20,
            limit: 10,
        };
        assert_eq!(
            err.to_string(),
            "File is too large (20 bytes). Maximum size is 10 bytes"
        );
    }

    #[test]
    fn test_compression_failed_lists_attempts() {
        let err = Error::CompressionFailed {
            attempts: vec!["medium: bad xref".into(), "low: bad xref".into()],
        };
        assert_eq!(
            err.to_string(),
            "Compression failed after 2 attempt(s): medium: bad xref; low: bad xref"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::UnknownFormat.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            Error::FatalDecode("x".into()).kind(),
            ErrorKind::FatalDecodeFailure
        );
        assert_eq!(
            Error::ToolUnavailable {
                tool: "soffice".into(),
                message: "not found".into()
            }
            .kind(),
            ErrorKind::ExternalToolFailure
        );
        assert!(Error::OversizedInput { size: 2, limit: 1 }.is_client_error());
        assert!(!Error::Transform("x".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
