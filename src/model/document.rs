//! Document-level types.

use super::Page;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded PDF document: an ordered sequence of pages.
///
/// Stages never edit a document in place; they build a new one from
/// transformed pages with [`Document::with_pages`].
#[derive(Debug, Clone)]
pub struct Document {
    /// PDF version written to the header (e.g., "1.7")
    pub version: String,

    /// Document information dictionary
    pub metadata: Metadata,

    /// Pages in reading order
    pub pages: Vec<Page>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self {
            version: "1.5".to_string(),
            metadata: Metadata::default(),
            pages: Vec::new(),
        }
    }

    /// Create a document from pages.
    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self {
            pages,
            ..Self::new()
        }
    }

    /// Same header and metadata, different pages.
    pub fn with_pages(&self, pages: Vec<Page>) -> Self {
        Self {
            version: self.version.clone(),
            metadata: self.metadata.clone(),
            pages,
        }
    }

    /// Copy without the information dictionary.
    pub fn without_metadata(mut self) -> Self {
        self.metadata = Metadata::default();
        self
    }

    /// Get the number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page by number (1-indexed).
    pub fn get_page(&self, page_num: u32) -> Option<&Page> {
        if page_num == 0 {
            return None;
        }
        self.pages.get((page_num - 1) as usize)
    }

    /// Add a page to the document.
    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Check if the document has any pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of image XObjects across all pages.
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Document metadata (the `/Info` dictionary).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Keywords
    pub keywords: Option<String>,

    /// Creator application
    pub creator: Option<String>,

    /// PDF producer
    pub producer: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Check whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty() && self.created.is_none() && self.modified.is_none()
    }

    /// Set text fields as `(Info key, value)` pairs.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
            ("Producer", &self.producer),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_new() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert_eq!(doc.page_count(), 0);
        assert!(doc.get_page(0).is_none());
    }

    #[test]
    fn test_with_pages_keeps_header() {
        let mut doc = Document::from_pages(vec![Page::letter(1), Page::a4(2)]);
        doc.version = "1.7".into();
        doc.metadata.title = Some("Report".into());

        let single = doc.with_pages(vec![doc.pages[1].clone()]);
        assert_eq!(single.version, "1.7");
        assert_eq!(single.page_count(), 1);
        assert_eq!(single.get_page(1).unwrap().number, 2);
        assert_eq!(doc.page_count(), 2);

        let stripped = single.without_metadata();
        assert!(stripped.metadata.is_empty());
    }

    #[test]
    fn test_metadata_entries() {
        let metadata = Metadata {
            title: Some("Title".into()),
            producer: Some("pdfeditz".into()),
            ..Default::default()
        };
        assert_eq!(
            metadata.entries(),
            vec![("Title", "Title"), ("Producer", "pdfeditz")]
        );
    }

    #[test]
    fn test_metadata_dates_count_as_content() {
        let metadata = Metadata {
            modified: Some(Utc::now()),
            ..Default::default()
        };
        assert!(metadata.entries().is_empty());
        assert!(!metadata.is_empty());
    }
}
