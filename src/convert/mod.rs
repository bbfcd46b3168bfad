//! Document converter module: pluggable converters that turn other formats
//! into PDF.
//!
//! Converters are registered by the extensions they accept and dispatched
//! on the input's extension. The shipped converter, [`OfficeConverter`],
//! runs LibreOffice headless to turn `.docx` files into PDF.
//!
//! # Example
//!
//! ```no_run
//! use pdfeditz::convert::{ConverterRegistry, ConvertOptions, OfficeConverter};
//! use std::sync::Arc;
//! use std::path::Path;
//!
//! fn main() -> pdfeditz::Result<()> {
//!     let mut registry = ConverterRegistry::new();
//!     registry.register(Arc::new(OfficeConverter::new()));
//!
//!     let result = registry.convert(Path::new("letter.docx"), &ConvertOptions::default())?;
//!     std::fs::write(&result.output_name, &result.output)?;
//!     Ok(())
//! }
//! ```

mod office;

pub use office::{OfficeConverter, DEFAULT_CONVERT_TIMEOUT};

use crate::detect::extension_of;
use crate::error::{Error, Result};
use crate::staging::DEFAULT_IO_TIMEOUT;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Options for document conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Overrides the converter's own time limit
    pub timeout: Option<Duration>,

    /// Decode the produced PDF before returning it
    pub verify_output: bool,

    /// Limit for reading the input and the produced PDF
    pub io_timeout: Duration,
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time limit for one conversion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the limit for each file read.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Enable or disable output verification.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_output = verify;
        self
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            verify_output: true,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Result of document conversion.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// PDF bytes
    pub output: Vec<u8>,

    /// Download name for the output (`<stem>.pdf`)
    pub output_name: String,

    /// Pages in the output, when verified
    pub page_count: Option<u32>,

    /// Converter that produced the output
    pub converter: String,

    /// MIME type of the output
    pub mime_type: &'static str,
}

impl ConvertResult {
    /// Create a new conversion result.
    pub fn new(output: Vec<u8>, output_name: String, converter: impl Into<String>) -> Self {
        Self {
            output,
            output_name,
            page_count: None,
            converter: converter.into(),
            mime_type: "application/pdf",
        }
    }

    /// Set the verified page count.
    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }

    /// Get output length in bytes.
    pub fn output_len(&self) -> usize {
        self.output.len()
    }
}

/// `<stem>.pdf` for an input filename.
pub fn pdf_name_for(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    format!("{}.pdf", stem)
}

/// Trait for document converters.
///
/// Implement this trait to add support for a new input format.
pub trait DocumentConverter: Send + Sync {
    /// Get the supported file extensions for this converter.
    ///
    /// Extensions should be lowercase without the leading dot (e.g., `["docx"]`).
    fn supported_extensions(&self) -> &[&str];

    /// Get the name of this converter.
    fn name(&self) -> &str;

    /// Convert a file at the given path.
    fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult>;

    /// Convert from bytes. `filename` names the input for extension checks
    /// and the output name.
    fn convert_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ConvertOptions,
    ) -> Result<ConvertResult> {
        let scratch = tempfile::Builder::new()
            .prefix("pdfeditz-convert-in-")
            .tempdir()?;
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let path = scratch.path().join(base);
        std::fs::write(&path, bytes)?;
        self.convert(&path, options)
    }

    /// Check if this converter supports the given extension.
    fn supports_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.supported_extensions().iter().any(|e| *e == ext_lower)
    }
}

/// Registry for document converters.
///
/// The registry maps file extensions to converters and provides
/// convenient methods for converting documents.
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn DocumentConverter>>,
    by_name: HashMap<String, Arc<dyn DocumentConverter>>,
}

impl ConverterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Create a registry with default converters (Word via LibreOffice).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OfficeConverter::new()));
        registry
    }

    /// Register a converter.
    ///
    /// The converter will be registered for all its supported extensions.
    pub fn register(&mut self, converter: Arc<dyn DocumentConverter>) {
        for ext in converter.supported_extensions() {
            self.converters.insert(ext.to_lowercase(), converter.clone());
        }
        self.by_name.insert(converter.name().to_lowercase(), converter);
    }

    /// Get a converter by file extension.
    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn DocumentConverter>> {
        self.converters.get(&ext.to_lowercase()).cloned()
    }

    /// Get a converter by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn DocumentConverter>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    /// Check if an extension is supported.
    pub fn supports(&self, ext: &str) -> bool {
        self.converters.contains_key(&ext.to_lowercase())
    }

    /// Get all supported extensions.
    pub fn supported_extensions(&self) -> Vec<&str> {
        self.converters.keys().map(|s| s.as_str()).collect()
    }

    /// Convert a file using the appropriate converter.
    pub fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput("File has no name".into()))?;
        self.converter_for(name)?.convert(path, options)
    }

    /// Convert bytes, choosing the converter from `filename`'s extension.
    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ConvertOptions,
    ) -> Result<ConvertResult> {
        self.converter_for(filename)?
            .convert_bytes(bytes, filename, options)
    }

    fn converter_for(&self, filename: &str) -> Result<Arc<dyn DocumentConverter>> {
        let ext = extension_of(filename)
            .ok_or_else(|| Error::InvalidInput(format!("{} has no extension", filename)))?;
        if ext == "doc" {
            return Err(Error::InvalidInput(
                "Old .doc format not supported. Save your file as .docx in Word first.".into(),
            ));
        }
        self.get_by_extension(&ext)
            .ok_or_else(|| Error::InvalidInput(format!("No converter for extension: {}", ext)))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_options_builder() {
        let options = ConvertOptions::new()
            .with_timeout(Duration::from_secs(3))
            .with_verification(false);

        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert!(!options.verify_output);
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ConverterRegistry::with_defaults();
        assert!(registry.supports("docx"));
        assert!(registry.supports("DOCX"));
        assert!(!registry.supports("pdf"));
    }

    #[test]
    fn test_registry_get_by_name() {
        let registry = ConverterRegistry::with_defaults();
        let converter = registry.get_by_name("LibreOffice");
        assert!(converter.is_some());
        assert_eq!(converter.unwrap().name(), "libreoffice");
    }

    #[test]
    fn test_registry_rejects_legacy_doc() {
        let registry = ConverterRegistry::with_defaults();
        let err = registry
            .convert_bytes(b"data", "old.doc", &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains(".docx")));
    }

    #[test]
    fn test_registry_unknown_extension() {
        let registry = ConverterRegistry::new();
        let err = registry
            .convert_bytes(b"data", "sheet.xlsx", &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(registry
            .convert_bytes(b"data", "noext", &ConvertOptions::default())
            .is_err());
    }

    #[test]
    fn test_pdf_name_for() {
        assert_eq!(pdf_name_for("letter.docx"), "letter.pdf");
        assert_eq!(pdf_name_for("dir/a.b.docx"), "a.b.pdf");
        assert_eq!(pdf_name_for("README"), "README.pdf");
        assert_eq!(pdf_name_for(".docx"), ".docx.pdf");
    }
}
