//! Document model types for PDF content representation.
//!
//! A [`Document`] is an ordered sequence of [`Page`] values. Pages own their
//! content stream, resources, images and annotations; everything they still
//! reference indirectly (fonts, colour spaces, form XObjects) lives in an
//! immutable [`ObjectStore`] shared by all pages decoded from the same file.
//! Transformations build new pages instead of mutating existing ones.

mod document;
mod geometry;
mod embedded;
mod objects;
mod page;

pub use document::{Document, Metadata};
pub(crate) use geometry::format_number;
pub use geometry::{Affine, PageSize, Rect};
pub use embedded::{EmbeddedImage, ImageKey};
pub use objects::ObjectStore;
pub use page::{Page, ATTACHMENT_KEYS};
pub(crate) use page::strip_image_invocations;
