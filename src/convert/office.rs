//! Word to PDF through LibreOffice.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{pdf_name_for, ConvertOptions, ConvertResult, DocumentConverter};
use crate::detect::{is_pdf_bytes, validate_upload, DocumentKind};
use crate::error::{Error, Result};
use crate::parser::PdfParser;
use crate::staging::read_bounded;
use crate::timeout::run_tool;

/// Default limit for one conversion.
pub const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(120);

/// Converts `.docx` files with `soffice --headless --convert-to pdf`.
///
/// Every conversion runs with its own LibreOffice profile directory, so
/// concurrent conversions do not contend for the user profile lock.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binary: PathBuf,
    timeout: Duration,
}

impl OfficeConverter {
    /// Use `soffice` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("soffice"),
            timeout: DEFAULT_CONVERT_TIMEOUT,
        }
    }

    /// Use a specific LibreOffice binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the default time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Binary this converter runs.
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConverter for OfficeConverter {
    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }

    fn name(&self) -> &str {
        "libreoffice"
    }

    fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput("File has no name".into()))?;
        let data = read_bounded(path, u64::MAX, options.io_timeout)?;
        validate_upload(filename, &data, DocumentKind::Docx)?;

        let scratch = tempfile::Builder::new()
            .prefix("pdfeditz-convert-")
            .tempdir()?;
        let outdir = scratch.path().join("out");
        let profile = scratch.path().join("profile");
        std::fs::create_dir_all(&outdir)?;

        let mut command = Command::new(&self.binary);
        command
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&outdir)
            .arg(path);

        let limit = options.timeout.unwrap_or(self.timeout);
        log::debug!("Converting {} with {} (limit {:?})", filename, self.name(), limit);
        let output = run_tool(command, self.name(), limit)?;
        if !output.status.success() {
            return Err(Error::ConversionFailed {
                tool: self.name().to_string(),
                message: failure_message(&output.stderr, &output.status.to_string()),
            });
        }

        let output_name = pdf_name_for(filename);
        let produced = outdir.join(&output_name);
        let pdf = match read_bounded(&produced, u64::MAX, options.io_timeout) {
            Ok(pdf) => pdf,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConversionFailed {
                    tool: self.name().to_string(),
                    message: failure_message(&output.stderr, "no PDF was produced"),
                });
            }
            Err(e) => return Err(e),
        };

        if !is_pdf_bytes(&pdf) {
            return Err(Error::ConversionFailed {
                tool: self.name().to_string(),
                message: "output is not a PDF".into(),
            });
        }

        let mut result = ConvertResult::new(Vec::new(), output_name, self.name());
        if options.verify_output {
            let pages = PdfParser::from_bytes(&pdf)
                .map(|parser| parser.page_count())
                .map_err(|e| Error::ConversionFailed {
                    tool: self.name().to_string(),
                    message: format!("produced an unreadable PDF: {}", e),
                })?;
            result = result.with_page_count(pages);
        }
        result.output = pdf;

        log::info!(
            "Converted {} to {} ({} bytes)",
            filename,
            result.output_name,
            result.output_len()
        );
        Ok(result)
    }
}

/// Prefer the tool's own diagnostics over a bare exit status.
fn failure_message(stderr: &str, fallback: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        fallback.to_string()
    } else if stderr.contains("source file could not be loaded") {
        format!("document could not be read, it may be corrupt ({})", stderr)
    } else {
        stderr.to_string()
    }
}
