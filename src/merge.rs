//! Page concatenation across documents.
//!
//! [`MergeEngine`] appends the pages of each input in order. Page content is
//! carried over untouched unless a resize target is set, in which case every
//! page is scaled to fit the target size and centred on it first.

use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Document, PageSize};
use crate::parser::{ParseOptions, PdfParser};
use crate::timeout::run_with_timeout;
use crate::writer::PdfWriter;

/// Default limit for decoding and for encoding a merge.
pub const DEFAULT_MERGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Options for merging documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Fit every page to this size before concatenation
    pub resize: Option<PageSize>,

    /// Keep the first input's information dictionary
    pub keep_metadata: bool,

    /// Decode inputs on the rayon pool
    pub parallel: bool,

    /// Limit for decoding the inputs, and again for encoding the result
    pub timeout: Duration,
}

impl MergeOptions {
    /// Create new merge options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit pages to `size`.
    pub fn with_resize(mut self, size: PageSize) -> Self {
        self.resize = Some(size);
        self
    }

    /// Set the resize target from a user token (`none` or empty for no resize).
    pub fn with_resize_token(mut self, token: &str) -> Result<Self> {
        self.resize = PageSize::parse_option(token)?;
        Ok(self)
    }

    /// Keep or drop the first input's metadata.
    pub fn with_metadata(mut self, keep: bool) -> Self {
        self.keep_metadata = keep;
        self
    }

    /// Disable parallel decoding.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the decode and encode time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            resize: None,
            keep_metadata: true,
            parallel: true,
            timeout: DEFAULT_MERGE_TIMEOUT,
        }
    }
}

/// Concatenates documents page by page.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    options: MergeOptions,
}

impl MergeEngine {
    /// Create an engine with the given options.
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge decoded documents in sequence order.
    ///
    /// Pages are renumbered from 1. The output uses the highest PDF version
    /// among the inputs.
    pub fn merge(&self, documents: &[Document]) -> Result<Document> {
        if documents.is_empty() {
            return Err(Error::InvalidInput("Nothing to merge".into()));
        }

        let mut merged = Document::new();
        if let Some(version) = documents.iter().map(|d| d.version.as_str()).max() {
            merged.version = version.to_string();
        }
        if self.options.keep_metadata {
            merged.metadata = documents[0].metadata.clone();
        }

        for (index, doc) in documents.iter().enumerate() {
            log::debug!("Appending input {} ({} page(s))", index + 1, doc.page_count());
            for page in &doc.pages {
                let mut page = match self.options.resize {
                    Some(size) => page.fit_to(size),
                    None => page.clone(),
                };
                page.number = merged.page_count() + 1;
                merged.add_page(page);
            }
        }

        log::info!(
            "Merged {} document(s) into {} page(s)",
            documents.len(),
            merged.page_count()
        );
        Ok(merged)
    }

    /// Decode one input. `index` is zero-based and only used in messages.
    pub fn decode(&self, index: usize, data: &[u8]) -> Result<Document> {
        let options = ParseOptions::new().with_images(false);
        PdfParser::from_bytes_with_options(data, options)
            .and_then(PdfParser::parse)
            .map_err(|e| match e {
                Error::FatalDecode(msg) => Error::FatalDecode(format!("input {}: {}", index + 1, msg)),
                other => other,
            })
    }

    /// Decode and merge PDF byte streams within the configured timeout.
    /// Any undecodable input fails the merge.
    pub fn merge_bytes(&self, inputs: &[&[u8]]) -> Result<Document> {
        let engine = self.clone();
        let inputs: Vec<Vec<u8>> = inputs.iter().map(|data| data.to_vec()).collect();
        run_with_timeout("merge", self.options.timeout, move || {
            let documents: Vec<Document> = if engine.options.parallel {
                inputs
                    .par_iter()
                    .enumerate()
                    .map(|(index, data)| engine.decode(index, data))
                    .collect::<Result<_>>()?
            } else {
                inputs
                    .iter()
                    .enumerate()
                    .map(|(index, data)| engine.decode(index, data))
                    .collect::<Result<_>>()?
            };
            engine.merge(&documents)
        })
    }

    /// Encode a merged document within the configured timeout.
    pub fn encode(&self, merged: Document) -> Result<Vec<u8>> {
        run_with_timeout("merge encode", self.options.timeout, move || {
            PdfWriter::new().to_bytes(&merged)
        })
    }

    /// Decode, merge and encode.
    pub fn merge_to_bytes(&self, inputs: &[&[u8]]) -> Result<Vec<u8>> {
        let merged = self.merge_bytes(inputs)?;
        self.encode(merged)
    }
}
