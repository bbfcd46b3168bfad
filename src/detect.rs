//! Input format detection and validation.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// PDF format information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// Kind of document accepted at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format
    Pdf,
    /// Office Open XML word processing document
    Docx,
}

impl DocumentKind {
    /// File extension (lowercase, without dot).
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
        }
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MAGIC_LEN: usize = 5;
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// ZIP local file header, the container of every .docx.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Legacy OLE2 compound file header (.doc).
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Detect PDF format from a file path.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<PdfFormat> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut header = [0u8; 16];
    let read = reader.read(&mut header)?;
    detect_format_from_bytes(&header[..read])
}

/// Detect PDF format from bytes.
///
/// # Returns
/// * `Ok(PdfFormat)` if the data starts with valid PDF header
/// * `Err(Error::UnknownFormat)` if the data is not a PDF
pub fn detect_format_from_bytes(data: &[u8]) -> Result<PdfFormat> {
    if data.len() < PDF_MAGIC_LEN + VERSION_LEN {
        return Err(Error::UnknownFormat);
    }

    if !data.starts_with(PDF_MAGIC) {
        return Err(Error::UnknownFormat);
    }

    let version_bytes = &data[PDF_MAGIC_LEN..PDF_MAGIC_LEN + VERSION_LEN];
    let version = String::from_utf8_lossy(version_bytes).to_string();

    if !is_valid_version(&version) {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok(PdfFormat { version })
}

/// Check if a version string is valid.
fn is_valid_version(version: &str) -> bool {
    if version.len() != 3 {
        return false;
    }

    let chars: Vec<char> = version.chars().collect();
    chars[0].is_ascii_digit() && chars[1] == '.' && chars[2].is_ascii_digit()
}

/// Check if bytes represent a valid PDF.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}

/// Check if bytes look like a .docx container.
pub fn is_docx_bytes(data: &[u8]) -> bool {
    data.starts_with(ZIP_MAGIC)
}

/// Lowercased extension of a client-supplied filename.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Check whether a filename carries the extension for `kind`.
pub fn allowed_file(filename: &str, kind: DocumentKind) -> bool {
    extension_of(filename).as_deref() == Some(kind.extension())
}

/// Validate an upload's name and bytes against the expected kind.
pub fn validate_upload(filename: &str, data: &[u8], kind: DocumentKind) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(Error::InvalidInput("No file selected".into()));
    }
    if data.is_empty() {
        return Err(Error::InvalidInput(format!("{} is empty", filename)));
    }

    match kind {
        DocumentKind::Pdf => {
            if !allowed_file(filename, kind) {
                return Err(Error::InvalidInput(
                    "Please select a valid PDF file".into(),
                ));
            }
            detect_format_from_bytes(data).map(|_| ())
        }
        DocumentKind::Docx => {
            if extension_of(filename).as_deref() == Some("doc") || data.starts_with(OLE_MAGIC) {
                return Err(Error::InvalidInput(
                    "Old .doc format not supported. Save your file as .docx in Word first.".into(),
                ));
            }
            if !allowed_file(filename, kind) {
                return Err(Error::InvalidInput(
                    "Invalid file type. Please upload a .docx file.".into(),
                ));
            }
            if !is_docx_bytes(data) {
                return Err(Error::InvalidInput(format!(
                    "{} is not a Word document",
                    filename
                )));
            }
            Ok(())
        }
    }
}
