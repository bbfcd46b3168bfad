//! Tiered PDF compression.
//!
//! A request names a [`QualityTier`]. The [`StrategySelector`] maps it to
//! [`CompressionParameters`], the [`PageTransformer`] applies them to every
//! page, and the [`SizeOracle`] measures the encoded result. When the
//! reduction falls short of the [`SizePolicy`] minimum, the
//! [`CompressionPipeline`] escalates to a more aggressive tier, within a
//! bounded number of steps and an overall deadline.
//!
//! # Example
//!
//! ```no_run
//! use pdfeditz::compress::{CompressOptions, CompressionPipeline, QualityTier};
//!
//! fn main() -> pdfeditz::Result<()> {
//!     let input = std::fs::read("scan.pdf")?;
//!     let pipeline = CompressionPipeline::new(&CompressOptions::default())?;
//!     let result = pipeline.run(&input, QualityTier::Medium)?;
//!     println!("{} -> {} bytes at {}", result.input_size, result.output_size, result.tier_used);
//!     Ok(())
//! }
//! ```

mod options;
mod oracle;
mod pipeline;
mod raster;
pub(crate) mod resample;
mod selector;
mod tier;
mod transformer;

pub use options::{CompressOptions, DEFAULT_DEADLINE};
pub use oracle::{reduction_ratio, SizeOracle, SizePolicy, SizeReport};
pub use pipeline::{AttemptRecord, CompressionPipeline, CompressionResult, CompressionStatus};
pub use raster::{PageRasterizer, PopplerRasterizer, DEFAULT_RASTER_TIMEOUT};
pub use resample::REENCODE_THRESHOLD;
pub use selector::{StrategySelector, DEFAULT_TABLE};
pub use tier::{CompressionParameters, QualityTier};
pub use transformer::PageTransformer;
