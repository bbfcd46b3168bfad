//! PDF encoding module.

mod importer;
mod pdf_writer;

pub use pdf_writer::PdfWriter;
