//! # pdfeditz
//!
//! PDF compression, merging and Word→PDF conversion.
//!
//! Compression works in named quality tiers. Each tier is a set of
//! parameters (resolution, JPEG quality, page scale, what to strip) applied
//! page by page; when the result does not shrink the file enough, the
//! pipeline escalates to a more aggressive tier, a bounded number of times.
//! The output is never larger than the input.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfeditz::{compress_file, QualityTier};
//!
//! fn main() -> pdfeditz::Result<()> {
//!     let report = compress_file("scan.pdf", "compressed_scan.pdf", QualityTier::Medium)?;
//!     println!("{}% smaller at tier {}", report.reduction_percent, report.tier_used);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Quality tiers**: `high`, `medium`, `low`, `extreme`, with a validated,
//!   tunable parameter table
//! - **Escalation**: bounded retries at more aggressive tiers under a deadline
//! - **Merge**: ordered concatenation with optional fit-to-paper-size
//! - **Convert**: `.docx` to PDF through LibreOffice, bounded by a timeout
//! - **Staging**: per-request scratch directories and atomic output writes
//! - **Parallel processing**: pages are transformed with Rayon

pub mod compress;
pub mod convert;
pub mod detect;
pub mod error;
pub mod merge;
pub mod model;
pub mod parser;
pub mod report;
pub mod staging;
pub mod timeout;
pub mod writer;

// Re-export commonly used types
pub use compress::{
    CompressOptions, CompressionParameters, CompressionPipeline, CompressionResult,
    CompressionStatus, PageRasterizer, PopplerRasterizer, QualityTier, SizePolicy,
    StrategySelector,
};
pub use convert::{
    ConvertOptions, ConvertResult, ConverterRegistry, DocumentConverter, OfficeConverter,
};
pub use detect::{detect_format_from_bytes, detect_format_from_path, DocumentKind, PdfFormat};
pub use error::{Error, ErrorKind, Result};
pub use merge::{MergeEngine, MergeOptions};
pub use model::{Document, Metadata, Page, PageSize};
pub use parser::{ParseOptions, PdfParser};
pub use report::{CompressionGrade, CompressionReport, ConversionReport, MergeReport};
pub use staging::{ScratchSpace, StagedFile};
pub use writer::PdfWriter;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use staging::{compressed_name, read_bounded, write_atomic};

/// Download name of a merged document.
pub const MERGED_NAME: &str = "merged.pdf";

/// Parse a PDF file into a document.
///
/// # Example
///
/// ```no_run
/// use pdfeditz::parse_file;
///
/// let doc = parse_file("document.pdf").unwrap();
/// println!("Pages: {}", doc.page_count());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    PdfParser::open(path)?.parse()
}

/// Parse a PDF from bytes.
pub fn parse_bytes(data: &[u8]) -> Result<Document> {
    PdfParser::from_bytes(data)?.parse()
}

/// Parse a PDF from bytes with custom options.
pub fn parse_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Document> {
    PdfParser::from_bytes_with_options(data, options)?.parse()
}

/// Compress PDF bytes at `tier` with default settings.
///
/// # Example
///
/// ```no_run
/// use pdfeditz::{compress_bytes, QualityTier};
///
/// let data = std::fs::read("scan.pdf").unwrap();
/// let result = compress_bytes(&data, QualityTier::High).unwrap();
/// assert!(result.output.len() <= data.len());
/// ```
pub fn compress_bytes(data: &[u8], tier: QualityTier) -> Result<CompressionResult> {
    compress_bytes_with_options(data, &CompressOptions::new().with_tier(tier))
}

/// Compress PDF bytes with custom options.
pub fn compress_bytes_with_options(data: &[u8], options: &CompressOptions) -> Result<CompressionResult> {
    CompressionPipeline::new(options)?.run(data, options.tier)
}

/// Compress PDF bytes on Tokio's blocking pool.
#[cfg(feature = "async")]
pub async fn compress_bytes_async(data: Vec<u8>, options: CompressOptions) -> Result<CompressionResult> {
    tokio::task::spawn_blocking(move || compress_bytes_with_options(&data, &options))
        .await
        .map_err(|e| Error::Other(format!("compression task failed: {}", e)))?
}

/// Compress `input` into `output`. Nothing is written on failure.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    tier: QualityTier,
) -> Result<CompressionReport> {
    PdfEditz::new().with_tier(tier).compress_file(input, output)
}

/// Merge PDF files in order into `output`, optionally fitting pages to `resize`.
pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs: &[P],
    output: Q,
    resize: Option<PageSize>,
) -> Result<MergeReport> {
    PdfEditz::new().merge_files(inputs, output, resize)
}

/// Convert a `.docx` file to PDF at `output`.
pub fn convert_docx<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<ConversionReport> {
    PdfEditz::new().convert_file(input, output)
}

/// Bytes produced by an operation plus its report.
#[derive(Debug, Clone)]
pub struct Processed<R> {
    pub output: Vec<u8>,
    pub report: R,
}

/// Service-wide configuration and request entry points.
///
/// Every request runs in its own [`ScratchSpace`], removed when the request
/// finishes.
///
/// # Example
///
/// ```no_run
/// use pdfeditz::PdfEditz;
///
/// let service = PdfEditz::new()
///     .with_max_upload_size(16 * 1024 * 1024)
///     .with_tier_token("low");
/// let data = std::fs::read("scan.pdf")?;
/// let done = service.compress_upload("scan.pdf", &data)?;
/// std::fs::write(&done.report.filename, &done.output)?;
/// # Ok::<(), pdfeditz::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PdfEditz {
    max_upload_size: u64,
    scratch_root: Option<PathBuf>,
    io_timeout: Duration,
    compress: CompressOptions,
    merge: MergeOptions,
    office: OfficeConverter,
    convert: ConvertOptions,
}

impl PdfEditz {
    /// Create a service with default settings.
    pub fn new() -> Self {
        Self {
            max_upload_size: staging::DEFAULT_MAX_UPLOAD_SIZE,
            scratch_root: None,
            io_timeout: staging::DEFAULT_IO_TIMEOUT,
            compress: CompressOptions::default(),
            merge: MergeOptions::default(),
            office: OfficeConverter::new(),
            convert: ConvertOptions::default(),
        }
    }

    /// Set the upload ceiling in bytes.
    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    /// Create scratch directories under `root`.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Set the limit for each filesystem call.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self.convert = self.convert.with_io_timeout(timeout);
        self
    }

    /// Set the default tier.
    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.compress = self.compress.with_tier(tier);
        self
    }

    /// Set the default tier from a user token.
    pub fn with_tier_token(mut self, token: &str) -> Self {
        self.compress = self.compress.with_tier_token(token);
        self
    }

    /// Set the overall compression deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.compress = self.compress.with_deadline(deadline);
        self
    }

    /// Use a custom size policy.
    pub fn with_policy(mut self, policy: SizePolicy) -> Self {
        self.compress = self.compress.with_policy(policy);
        self
    }

    /// Use a custom tier table.
    pub fn with_selector(mut self, selector: StrategySelector) -> Self {
        self.compress = self.compress.with_selector(selector);
        self
    }

    /// Enable the rasterize strategy.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.compress = self.compress.with_rasterizer(rasterizer);
        self
    }

    /// Use a specific LibreOffice binary.
    pub fn with_office_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.office = self.office.with_binary(binary);
        self
    }

    /// Set the conversion time limit.
    pub fn with_convert_timeout(mut self, timeout: Duration) -> Self {
        self.office = self.office.with_timeout(timeout);
        self.convert = self.convert.with_timeout(timeout);
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.compress = self.compress.sequential();
        self.merge = self.merge.sequential();
        self
    }

    /// Compression options in use.
    pub fn compress_options(&self) -> &CompressOptions {
        &self.compress
    }

    /// Upload ceiling in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Limit for each filesystem call.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Fresh scratch space for one request.
    pub fn scratch(&self) -> Result<ScratchSpace> {
        let space = match &self.scratch_root {
            Some(root) => ScratchSpace::in_dir(root)?,
            None => ScratchSpace::new()?,
        };
        Ok(space
            .with_max_upload_size(self.max_upload_size)
            .with_io_timeout(self.io_timeout))
    }

    /// Compress an upload at the configured tier.
    pub fn compress_upload(&self, filename: &str, data: &[u8]) -> Result<Processed<CompressionReport>> {
        self.compress_upload_at(filename, data, self.compress.tier)
    }

    /// Compress an upload at `tier`.
    pub fn compress_upload_at(
        &self,
        filename: &str,
        data: &[u8],
        tier: QualityTier,
    ) -> Result<Processed<CompressionReport>> {
        let space = self.scratch()?;
        let staged = space.stage_upload(filename, data, DocumentKind::Pdf)?;
        let input = space.read(&staged)?;

        let result = CompressionPipeline::new(&self.compress)?.run(&input, tier)?;
        let report = CompressionReport::new(compressed_name(filename), &result);
        log::info!(
            "{}: {:.2}% ({})",
            report.filename,
            report.reduction_percent,
            report.grade.message()
        );
        Ok(Processed {
            output: result.output,
            report,
        })
    }

    /// Merge uploads in order.
    ///
    /// Uploads that are not valid PDFs are skipped; at least two must
    /// remain. Oversized uploads fail the request.
    pub fn merge_uploads(
        &self,
        uploads: &[(&str, &[u8])],
        resize: Option<PageSize>,
    ) -> Result<Processed<MergeReport>> {
        let space = self.scratch()?;
        let mut inputs = Vec::new();
        let mut skipped = Vec::new();
        for (filename, data) in uploads {
            match space.stage_upload(filename, data, DocumentKind::Pdf) {
                Ok(staged) => inputs.push(space.read(&staged)?),
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    log::warn!("Skipping {}: {}", filename, e);
                    skipped.push(filename.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        if inputs.len() < 2 {
            return Err(Error::InvalidInput(
                "Please upload at least 2 valid PDF files".into(),
            ));
        }

        let mut options = self.merge.clone();
        options.resize = resize;
        let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
        let engine = MergeEngine::new(options);
        let merged = engine.merge_bytes(&refs)?;
        let page_count = merged.page_count();
        let output = engine.encode(merged)?;

        Ok(Processed {
            report: MergeReport {
                filename: MERGED_NAME.to_string(),
                file_count: inputs.len(),
                skipped,
                page_count,
                output_size: output.len() as u64,
                resize,
            },
            output,
        })
    }

    /// Convert a `.docx` upload to PDF.
    pub fn convert_upload(&self, filename: &str, data: &[u8]) -> Result<Processed<ConversionReport>> {
        let space = self.scratch()?;
        let staged = space.stage_upload(filename, data, DocumentKind::Docx)?;
        let converted = self.office.convert(&staged.path, &self.convert)?;

        let report = ConversionReport {
            filename: convert::pdf_name_for(filename),
            source: filename.to_string(),
            output_size: converted.output_len() as u64,
            page_count: converted.page_count,
            converter: converted.converter,
        };
        Ok(Processed {
            output: converted.output,
            report,
        })
    }

    /// Compress a file into `output`. Nothing is written on failure.
    pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<CompressionReport> {
        let (name, data) = self.read_input(input.as_ref())?;
        let done = self.compress_upload(&name, &data)?;
        write_atomic(output.as_ref(), &done.output, self.io_timeout)?;
        Ok(done.report)
    }

    /// Merge files into `output`. Nothing is written on failure.
    pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        inputs: &[P],
        output: Q,
        resize: Option<PageSize>,
    ) -> Result<MergeReport> {
        let mut files = Vec::with_capacity(inputs.len());
        for input in inputs {
            files.push(self.read_input(input.as_ref())?);
        }
        let uploads: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        let done = self.merge_uploads(&uploads, resize)?;
        write_atomic(output.as_ref(), &done.output, self.io_timeout)?;
        Ok(done.report)
    }

    /// Convert a `.docx` file into `output`. Nothing is written on failure.
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<ConversionReport> {
        let (name, data) = self.read_input(input.as_ref())?;
        let done = self.convert_upload(&name, &data)?;
        write_atomic(output.as_ref(), &done.output, self.io_timeout)?;
        Ok(done.report)
    }

    fn read_input(&self, path: &Path) -> Result<(String, Vec<u8>)> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", path.display())))?
            .to_string();
        let data = read_bounded(path, self.max_upload_size, self.io_timeout)?;
        Ok((name, data))
    }
}

impl Default for PdfEditz {
    fn default() -> Self {
        Self::new()
    }
}
