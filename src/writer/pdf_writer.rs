//! Serialize the document model with lopdf.

use std::io::Write;

use lopdf::{dictionary, Dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};

use crate::error::Result;
use crate::model::{Document, Metadata, Page};

use super::importer::Importer;

/// PDF serializer.
///
/// Builds a fresh file on every call: only objects reachable from the
/// pages are written, so anything a transformation dropped is gone from
/// the output too.
#[derive(Debug, Clone)]
pub struct PdfWriter {
    compress_streams: bool,
}

impl PdfWriter {
    /// Create a writer that Flate-compresses unfiltered streams.
    pub fn new() -> Self {
        Self {
            compress_streams: true,
        }
    }

    /// Enable or disable stream compression.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Encode `doc` to PDF bytes.
    pub fn to_bytes(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(doc, &mut buf)?;
        Ok(buf)
    }

    /// Encode `doc` into `target`.
    pub fn write_to<W: Write>(&self, doc: &Document, target: &mut W) -> Result<()> {
        let mut out = self.build(doc);
        out.save_to(target)?;
        Ok(())
    }

    fn build(&self, doc: &Document) -> LopdfDocument {
        let mut out = LopdfDocument::with_version(doc.version.as_str());
        let mut importer = Importer::new();
        let pages_id = out.new_object_id();

        let kids: Vec<Object> = doc
            .pages
            .iter()
            .map(|page| Object::Reference(write_page(&mut out, &mut importer, page, pages_id)))
            .collect();

        out.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );

        let catalog_id = out.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        out.trailer.set("Root", catalog_id);

        if !doc.metadata.is_empty() {
            let info_id = out.add_object(info_dictionary(&doc.metadata));
            out.trailer.set("Info", info_id);
        }

        if self.compress_streams {
            out.compress();
        }

        log::debug!(
            "Encoded {} page(s), {} object(s), {} image(s)",
            doc.pages.len(),
            out.objects.len(),
            importer.image_count()
        );
        out
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_page(out: &mut LopdfDocument, importer: &mut Importer, page: &Page, parent: ObjectId) -> ObjectId {
    let store = page.store();
    let page_id = out.new_object_id();

    importer.register_form_images(store.origin(), &page.form_images);
    let mut resources = importer.import_dict(out, store, &page.resources);
    if !page.images.is_empty() {
        let mut xobjects = match resources.get(b"XObject") {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => out
                .get_dictionary(*id)
                .map(Dictionary::clone)
                .unwrap_or_default(),
            _ => Dictionary::new(),
        };
        for (name, image) in &page.images {
            let image_id = importer.import_image(out, store, image);
            xobjects.set(name.clone(), Object::Reference(image_id));
        }
        resources.set("XObject", xobjects);
    }

    let content_id = out.add_object(Stream::new(Dictionary::new(), page.content.clone()));

    let mut dict = dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "MediaBox" => page.media_box.to_object(),
        "Resources" => resources,
        "Contents" => content_id,
    };
    if page.rotation != 0 {
        dict.set("Rotate", page.rotation);
    }
    let boxes = [
        ("CropBox", page.crop_box),
        ("BleedBox", page.bleed_box),
        ("TrimBox", page.trim_box),
        ("ArtBox", page.art_box),
    ];
    for (key, page_box) in boxes {
        if let Some(page_box) = page_box {
            dict.set(key, page_box.to_object());
        }
    }
    if let Some(unit) = page.user_unit {
        dict.set("UserUnit", Object::Real(unit));
    }

    if !page.annotations.is_empty() {
        let annots: Vec<Object> = page
            .annotations
            .iter()
            .map(|annotation| {
                let mut copy = importer.import_dict(out, store, annotation);
                copy.set("P", page_id);
                Object::Reference(out.add_object(copy))
            })
            .collect();
        dict.set("Annots", annots);
    }

    for (key, value) in page.attachments.iter() {
        let value = importer.import_object(out, store, value);
        dict.set(key.clone(), value);
    }

    out.objects.insert(page_id, Object::Dictionary(dict));
    page_id
}

fn info_dictionary(metadata: &Metadata) -> Dictionary {
    let mut info = Dictionary::new();
    for (key, value) in metadata.entries() {
        info.set(key, text_string(value));
    }
    if let Some(created) = metadata.created {
        info.set("CreationDate", pdf_date(&created));
    }
    if let Some(modified) = metadata.modified {
        info.set("ModDate", pdf_date(&modified));
    }
    info
}

/// Encode a text string: ASCII as a literal, anything else as UTF-16BE.
fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn pdf_date(date: &chrono::DateTime<chrono::Utc>) -> Object {
    Object::string_literal(date.format("D:%Y%m%d%H%M%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EmbeddedImage, ImageKey, PageSize, Rect};
    use crate::parser::PdfParser;

    fn jpeg_image(key: ImageKey) -> EmbeddedImage {
        EmbeddedImage::jpeg(key, vec![0xFF, 0xD8, 0xFF, 0xD9], 8, 8, true)
    }

    fn count_images(data: &[u8]) -> usize {
        let doc = LopdfDocument::load_mem(data).unwrap();
        doc.objects
            .values()
            .filter(|obj| match obj {
                Object::Stream(s) => matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"),
                _ => false,
            })
            .count()
    }

    #[test]
    fn test_round_trip_pages() {
        let mut doc = Document::from_pages(vec![
            Page::letter(1).with_content("0 0 m 10 10 l S"),
            Page::a4(2).with_content("BT ET"),
        ]);
        doc.pages[1].rotation = 90;

        let bytes = PdfWriter::new().to_bytes(&doc).unwrap();
        let reread = PdfParser::from_bytes(&bytes).unwrap().parse().unwrap();

        assert_eq!(reread.page_count(), 2);
        assert_eq!(reread.pages[0].dimensions(), (612.0, 792.0));
        assert_eq!(reread.pages[1].dimensions(), PageSize::A4.dimensions());
        assert_eq!(reread.pages[1].rotation, 90);
        assert!(String::from_utf8_lossy(&reread.pages[0].content).contains("10 10 l"));
    }

    #[test]
    fn test_page_boxes_round_trip() {
        let mut page = Page::letter(1);
        page.crop_box = Some(Rect::new(36.0, 36.0, 576.0, 756.0));
        page.bleed_box = Some(Rect::new(9.0, 9.0, 603.0, 783.0));
        page.trim_box = Some(Rect::new(18.0, 18.0, 594.0, 774.0));
        page.art_box = Some(Rect::new(72.0, 72.0, 540.0, 720.0));
        page.user_unit = Some(1.5);

        let bytes = PdfWriter::new().to_bytes(&Document::from_pages(vec![page.clone()])).unwrap();
        let reread = PdfParser::from_bytes(&bytes).unwrap().parse().unwrap();
        let reread = &reread.pages[0];

        assert_eq!(reread.crop_box, page.crop_box);
        assert_eq!(reread.bleed_box, page.bleed_box);
        assert_eq!(reread.trim_box, page.trim_box);
        assert_eq!(reread.art_box, page.art_box);
        assert_eq!(reread.user_unit, Some(1.5));
    }

    #[test]
    fn test_shared_image_written_once() {
        let key = ImageKey::fresh();
        let doc = Document::from_pages(vec![
            Page::letter(1).with_image("Im0", jpeg_image(key)),
            Page::letter(2).with_image("Im0", jpeg_image(key)),
            Page::letter(3).with_image("Im0", jpeg_image(ImageKey::fresh())),
        ]);

        let bytes = PdfWriter::new().to_bytes(&doc).unwrap();
        assert_eq!(count_images(&bytes), 2);

        let reread = PdfParser::from_bytes(&bytes).unwrap().parse().unwrap();
        assert_eq!(reread.pages[0].images[b"Im0".as_slice()].key, reread.pages[1].images[b"Im0".as_slice()].key);
    }

    #[test]
    fn test_info_written_only_when_present() {
        let mut doc = Document::from_pages(vec![Page::letter(1)]);
        let bytes = PdfWriter::new().to_bytes(&doc).unwrap();
        let raw = LopdfDocument::load_mem(&bytes).unwrap();
        assert!(raw.trailer.get(b"Info").is_err());

        doc.metadata.title = Some("Résumé".into());
        doc.metadata.author = Some("Ada".into());
        let bytes = PdfWriter::new().to_bytes(&doc).unwrap();
        let reread = PdfParser::from_bytes(&bytes).unwrap().parse().unwrap();
        assert_eq!(reread.metadata.title.as_deref(), Some("Résumé"));
        assert_eq!(reread.metadata.author.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_uncompressed_is_larger() {
        let content = "0 0 m 100 100 l S\n".repeat(200);
        let doc = Document::from_pages(vec![Page::letter(1).with_content(content)]);

        let packed = PdfWriter::new().to_bytes(&doc).unwrap();
        let plain = PdfWriter::new().with_compression(false).to_bytes(&doc).unwrap();
        assert!(packed.len() < plain.len());
    }
}
