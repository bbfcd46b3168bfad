//! Whole-page rendering for the rasterize strategy.

use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use image::ImageReader;

use crate::error::{Error, Result};
use crate::model::{Document, EmbeddedImage, ImageKey, Page};
use crate::timeout::run_tool;
use crate::writer::PdfWriter;

use super::tier::CompressionParameters;

/// Default limit for rendering one page.
pub const DEFAULT_RASTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Renders a page to a single JPEG image.
///
/// Implementations must not keep state between calls; the pipeline may
/// render pages of one document from several threads.
pub trait PageRasterizer: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Render `page` at `params.raster_dpi()` and JPEG quality
    /// `params.jpeg_quality()`.
    fn rasterize(&self, page: &Page, params: &CompressionParameters) -> Result<EmbeddedImage>;
}

/// Rasterizer backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    binary: PathBuf,
    timeout: Duration,
}

impl PopplerRasterizer {
    /// Use `pdftoppm` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("pdftoppm"),
            timeout: DEFAULT_RASTER_TIMEOUT,
        }
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the per-page time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    fn rasterize(&self, page: &Page, params: &CompressionParameters) -> Result<EmbeddedImage> {
        let single = Document::from_pages(vec![page.clone()]);
        let pdf = PdfWriter::new().to_bytes(&single)?;

        let scratch = tempfile::Builder::new()
            .prefix("pdfeditz-raster-")
            .tempdir()?;
        let input = scratch.path().join("page.pdf");
        let prefix = scratch.path().join("page");
        std::fs::write(&input, &pdf)?;

        let mut command = Command::new(&self.binary);
        command
            .arg("-jpeg")
            .arg("-jpegopt")
            .arg(format!("quality={}", params.jpeg_quality()))
            .arg("-r")
            .arg(params.raster_dpi().to_string())
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix);

        let output = run_tool(command, self.name(), self.timeout)?;
        if !output.status.success() {
            return Err(Error::ConversionFailed {
                tool: self.name().to_string(),
                message: format!("{} ({})", output.stderr.trim(), output.status),
            });
        }

        let data = std::fs::read(prefix.with_extension("jpg"))?;
        let (width, height) = jpeg_dimensions(&data)?;
        Ok(EmbeddedImage::jpeg(ImageKey::fresh(), data, width, height, false))
    }
}

/// Pixel size of a JPEG without decoding it.
pub(crate) fn jpeg_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::with_format(Cursor::new(data), image::ImageFormat::Jpeg);
    Ok(reader.into_dimensions()?)
}
