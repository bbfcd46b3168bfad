//! PDF decoding module.

mod options;
mod pdf_parser;

pub(crate) use pdf_parser::parse_pdf_date;
pub use options::{ErrorMode, ParseOptions};
pub use pdf_parser::PdfParser;
