//! PDF document decoder using lopdf.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::detect::{detect_format_from_bytes, PdfFormat};
use crate::error::{Error, Result};
use crate::model::{
    Document, EmbeddedImage, ImageKey, Metadata, ObjectStore, Page, PageSize, Rect,
    ATTACHMENT_KEYS,
};

use super::options::{ErrorMode, ParseOptions};

/// Maximum `/Parent` chain walked when resolving inherited page attributes.
const MAX_INHERIT_DEPTH: usize = 64;

/// PDF document parser.
///
/// Loads the whole file with lopdf, then turns every page into a
/// self-contained [`Page`] value backed by a shared [`ObjectStore`].
pub struct PdfParser {
    doc: LopdfDocument,
    format: PdfFormat,
    options: ParseOptions,
}

impl PdfParser {
    /// Open a PDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    /// Open a PDF file with custom options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes_with_options(&data, options)
    }

    /// Parse a PDF from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    /// Parse a PDF from bytes with custom options.
    pub fn from_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Self> {
        let format = detect_format_from_bytes(data)?;

        let doc = LopdfDocument::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            lopdf::Error::IO(io) => Error::Io(io),
            other => Error::FatalDecode(other.to_string()),
        })?;

        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }

        Ok(Self {
            doc,
            format,
            options,
        })
    }

    /// Parse a PDF from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, ParseOptions::default())
    }

    /// Parse a PDF from a reader with custom options.
    pub fn from_reader_with_options<R: Read>(mut reader: R, options: ParseOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes_with_options(&data, options)
    }

    /// Header version detected before loading.
    pub fn format(&self) -> &PdfFormat {
        &self.format
    }

    /// Number of pages in the page tree.
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// Decode the document into owned page values.
    pub fn parse(self) -> Result<Document> {
        let Self {
            mut doc, options, ..
        } = self;

        let page_ids: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        if page_ids.is_empty() {
            return Err(Error::FatalDecode("document has no pages".to_string()));
        }

        let version = doc.version.clone();
        let info = doc.trailer.get(b"Info").ok().cloned();
        let store = ObjectStore::new(std::mem::take(&mut doc.objects));

        let metadata = info
            .as_ref()
            .and_then(|obj| store.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .map(extract_metadata)
            .unwrap_or_default();

        let mut pages = Vec::with_capacity(page_ids.len());
        for (number, id) in page_ids {
            pages.push(parse_page(&store, number, id, &options)?);
        }

        log::debug!(
            "Decoded {} page(s), {} object(s), PDF {}",
            pages.len(),
            store.len(),
            version
        );

        Ok(Document {
            version,
            metadata,
            pages,
        })
    }
}

/// Decode one page dictionary.
fn parse_page(
    store: &Arc<ObjectStore>,
    number: u32,
    id: ObjectId,
    options: &ParseOptions,
) -> Result<Page> {
    let dict = store
        .get(id)
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| Error::FatalDecode(format!("page {} is not a dictionary", number)))?;

    let media_box = page_box(store, inherited(store, dict, b"MediaBox")).unwrap_or_else(|| {
        log::warn!("Page {}: missing or invalid MediaBox, assuming Letter", number);
        let (w, h) = PageSize::Letter.dimensions();
        Rect::from_size(w, h)
    });

    let mut page = Page::with_store(number, media_box, Arc::clone(store));

    page.crop_box = page_box(store, inherited(store, dict, b"CropBox")).filter(|r| *r != media_box);
    page.bleed_box = page_box(store, dict.get(b"BleedBox").ok().and_then(|o| store.resolve(o)));
    page.trim_box = page_box(store, dict.get(b"TrimBox").ok().and_then(|o| store.resolve(o)));
    page.art_box = page_box(store, dict.get(b"ArtBox").ok().and_then(|o| store.resolve(o)));
    page.user_unit = dict
        .get(b"UserUnit")
        .ok()
        .and_then(|o| store.resolve(o))
        .and_then(|o| o.as_float().ok())
        .filter(|u| *u > 0.0 && (*u - 1.0).abs() > f32::EPSILON);

    page.rotation = inherited(store, dict, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|r| r.rem_euclid(360))
        .unwrap_or(0);

    page.resources = inherited(store, dict, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    page.content = page_content(store, dict, number, options.error_mode)?;

    if options.extract_images {
        page.images = lift_images(store, &mut page.resources);
        page.form_images = form_images(store, &page.resources);
    }

    page.annotations = dict
        .get(b"Annots")
        .ok()
        .and_then(|obj| store.resolve(obj))
        .and_then(|obj| obj.as_array().ok())
        .map(|annots| {
            annots
                .iter()
                .filter_map(|a| store.resolve(a))
                .filter_map(|a| a.as_dict().ok())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    for key in ATTACHMENT_KEYS {
        if let Ok(value) = dict.get(key) {
            page.attachments.set(key.to_vec(), value.clone());
        }
    }

    Ok(page)
}

/// Read a page boundary array whose entries may be indirect.
fn page_box(store: &ObjectStore, value: Option<&Object>) -> Option<Rect> {
    let values = value?.as_array().ok()?;
    let resolved: Vec<Object> = values
        .iter()
        .filter_map(|v| store.resolve(v).cloned())
        .collect();
    Rect::from_objects(&resolved)
}

/// Look up a page attribute, walking up the page tree for inheritable keys.
fn inherited<'a>(store: &'a ObjectStore, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return store.resolve(value);
        }
        current = current
            .get(b"Parent")
            .ok()
            .and_then(|parent| store.resolve(parent))
            .and_then(|parent| parent.as_dict().ok())?;
    }
    None
}

/// Concatenate the page's content streams, decoded.
fn page_content(
    store: &ObjectStore,
    dict: &Dictionary,
    number: u32,
    mode: ErrorMode,
) -> Result<Vec<u8>> {
    let contents = match dict.get(b"Contents").ok().and_then(|c| store.resolve(c)) {
        Some(contents) => contents,
        None => return Ok(Vec::new()),
    };

    let parts: Vec<&Object> = match contents {
        Object::Array(items) => items.iter().filter_map(|i| store.resolve(i)).collect(),
        other => vec![other],
    };

    let mut content = Vec::new();
    for part in parts {
        let decoded = match part {
            Object::Stream(stream) => decode_stream(stream),
            _ => Err(Error::PdfParse("content entry is not a stream".to_string())),
        };
        match decoded {
            Ok(data) => {
                content.extend_from_slice(&data);
                content.push(b'\n');
            }
            Err(e) => match mode {
                ErrorMode::Strict => {
                    return Err(Error::FatalDecode(format!("page {}: {}", number, e)));
                }
                ErrorMode::Lenient => {
                    log::warn!("Page {}: skipping content stream: {}", number, e);
                }
            },
        }
    }
    Ok(content)
}

/// Decoded bytes of a stream; unfiltered streams are returned as stored.
fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|e| Error::PdfParse(format!("undecodable content stream: {}", e)))
}

/// Move image XObjects out of `resources`, keyed by resource name.
fn lift_images(store: &ObjectStore, resources: &mut Dictionary) -> BTreeMap<Vec<u8>, EmbeddedImage> {
    let mut images = BTreeMap::new();

    let xobjects = match resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| store.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        Some(xobjects) => xobjects.clone(),
        None => return images,
    };

    let mut remaining = Dictionary::new();
    for (name, value) in xobjects.iter() {
        if let Object::Reference(id) = value {
            if let Some(Object::Stream(stream)) = store.get(*id) {
                if is_image(&stream.dict) {
                    let key = ImageKey::source(store.origin(), *id);
                    images.insert(
                        name.clone(),
                        EmbeddedImage::new(key, stream.dict.clone(), stream.content.clone()),
                    );
                    continue;
                }
            }
        }
        remaining.set(name.clone(), value.clone());
    }

    if remaining.is_empty() {
        resources.remove(b"XObject");
    } else {
        resources.set("XObject", remaining);
    }
    images
}

/// Collect the images painted by form XObjects in `resources`, following
/// nested forms. Each form is visited once.
fn form_images(store: &ObjectStore, resources: &Dictionary) -> BTreeMap<ObjectId, Option<EmbeddedImage>> {
    let mut images = BTreeMap::new();
    let mut visited = HashSet::new();
    let mut pending: Vec<ObjectId> = xobject_refs(store, resources);

    while let Some(id) = pending.pop() {
        if !visited.insert(id) {
            continue;
        }
        let stream = match store.get(id) {
            Some(Object::Stream(stream)) => stream,
            _ => continue,
        };
        if is_image(&stream.dict) {
            // drawn directly by the page when not reached through a form
            continue;
        }
        if !is_form(&stream.dict) {
            continue;
        }
        let form_resources = match stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| store.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
        {
            Some(dict) => dict,
            None => continue,
        };
        for child in xobject_refs(store, form_resources) {
            match store.get(child) {
                Some(Object::Stream(inner)) if is_image(&inner.dict) => {
                    let key = ImageKey::source(store.origin(), child);
                    images.insert(
                        child,
                        Some(EmbeddedImage::new(key, inner.dict.clone(), inner.content.clone())),
                    );
                }
                Some(Object::Stream(_)) => pending.push(child),
                _ => {}
            }
        }
    }
    images
}

/// Indirect XObjects named in a resource dictionary.
fn xobject_refs(store: &ObjectStore, resources: &Dictionary) -> Vec<ObjectId> {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| store.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())
        .map(|xobjects| {
            xobjects
                .iter()
                .filter_map(|(_, value)| value.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn is_image(dict: &Dictionary) -> bool {
    has_subtype(dict, b"Image")
}

fn is_form(dict: &Dictionary) -> bool {
    has_subtype(dict, b"Form")
}

fn has_subtype(dict: &Dictionary, subtype: &[u8]) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|n| n == subtype)
        .unwrap_or(false)
}

/// Read the document information dictionary.
fn extract_metadata(info: &Dictionary) -> Metadata {
    Metadata {
        title: get_string_from_dict(info, b"Title"),
        author: get_string_from_dict(info, b"Author"),
        subject: get_string_from_dict(info, b"Subject"),
        keywords: get_string_from_dict(info, b"Keywords"),
        creator: get_string_from_dict(info, b"Creator"),
        producer: get_string_from_dict(info, b"Producer"),
        created: get_string_from_dict(info, b"CreationDate").and_then(|d| parse_pdf_date(&d)),
        modified: get_string_from_dict(info, b"ModDate").and_then(|d| parse_pdf_date(&d)),
    }
}

/// Get a string value from a dictionary.
fn get_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key).ok().and_then(|obj| match obj {
        Object::String(bytes, _) => {
            // UTF-16BE with BOM
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                String::from_utf8(bytes.clone())
                    .ok()
                    .or_else(|| Some(bytes.iter().map(|&b| b as char).collect()))
            }
        }
        Object::Name(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    })
}

/// Parse a PDF date string (D:YYYYMMDDHHmmSSOHH'mm').
pub(crate) fn parse_pdf_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = s.strip_prefix("D:")?;

    // At minimum we need YYYY
    if s.len() < 4 {
        return None;
    }

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(1);
    let day: u32 = s.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(1);
    let hour: u32 = s.get(8..10).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use lopdf::dictionary;

    fn rect(w: i64, h: i64) -> Vec<Object> {
        vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(w),
            Object::Integer(h),
        ]
    }

    /// One A4 page inheriting its MediaBox, with an image, a form XObject,
    /// a link annotation and a thumbnail.
    fn sample_pdf() -> Vec<u8> {
        let mut doc = LopdfDocument::with_version("1.6");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2_i64,
                "Height" => 2_i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
            },
            vec![0, 64, 128, 255],
        ));
        let nested_image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1_i64,
                "Height" => 1_i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
            },
            vec![200],
        ));
        let inner_form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect(10, 10),
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im9" => nested_image_id },
                },
            },
            b"/Im9 Do".to_vec(),
        ));
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect(10, 10),
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Fm1" => inner_form_id },
                },
            },
            b"0 0 10 10 re f /Fm1 Do".to_vec(),
        ));

        let mut content = Stream::new(dictionary! {}, b"q 2 0 0 2 0 0 cm /Im0 Do Q /Fm0 Do".to_vec());
        content.compress().unwrap();
        let content_id = doc.add_object(content);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id, "Fm0" => form_id },
            },
            "Annots" => vec![Object::Dictionary(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => rect(100, 20),
            })],
            "Thumb" => Object::Null,
            "CropBox" => vec![Object::Integer(10), Object::Integer(10), Object::Integer(585), Object::Integer(832)],
            "TrimBox" => vec![Object::Integer(20), Object::Integer(20), Object::Integer(575), Object::Integer(822)],
            "UserUnit" => 2_i64,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
                "MediaBox" => rect(595, 842),
            }),
        );
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly"),
            "CreationDate" => Object::string_literal("D:20240115103045Z"),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_parse_page_structure() {
        let data = sample_pdf();
        let parser = PdfParser::from_bytes(&data).unwrap();
        assert_eq!(parser.page_count(), 1);
        assert_eq!(parser.format().version, "1.6");

        let doc = parser.parse().unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.metadata.title.as_deref(), Some("Quarterly"));
        assert_eq!(doc.metadata.created.map(|d| d.year()), Some(2024));

        let page = &doc.pages[0];
        assert_eq!(page.dimensions(), (595.0, 842.0));
        assert_eq!(page.annotations.len(), 1);
        assert!(page.attachments.get(b"Thumb").is_ok());

        let text = String::from_utf8_lossy(&page.content);
        assert!(text.contains("/Im0 Do"));
    }

    #[test]
    fn test_images_lifted_forms_kept() {
        let doc = PdfParser::from_bytes(&sample_pdf()).unwrap().parse().unwrap();
        let page = &doc.pages[0];

        assert_eq!(page.images.len(), 1);
        let image = &page.images[b"Im0".as_slice()];
        assert_eq!(image.width(), Some(2));
        assert_eq!(image.key.origin, page.store().origin());

        let xobjects = page.resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Fm0").is_ok());
        assert!(xobjects.get(b"Im0").is_err());
    }

    #[test]
    fn test_images_inside_nested_forms_collected() {
        let doc = PdfParser::from_bytes(&sample_pdf()).unwrap().parse().unwrap();
        let page = &doc.pages[0];

        assert_eq!(page.form_images.len(), 1);
        let (id, image) = page.form_images.iter().next().unwrap();
        let image = image.as_ref().unwrap();
        assert_eq!(image.key, ImageKey::source(page.store().origin(), *id));
        assert_eq!(image.data, vec![200]);
        assert_eq!(page.image_bytes(), 4 + 1);
    }

    #[test]
    fn test_page_boxes_and_user_unit() {
        let doc = PdfParser::from_bytes(&sample_pdf()).unwrap().parse().unwrap();
        let page = &doc.pages[0];

        assert_eq!(page.crop_box, Some(Rect::new(10.0, 10.0, 585.0, 832.0)));
        assert_eq!(page.trim_box, Some(Rect::new(20.0, 20.0, 575.0, 822.0)));
        assert!(page.bleed_box.is_none());
        assert_eq!(page.user_unit, Some(2.0));
    }

    #[test]
    fn test_images_left_in_resources_when_disabled() {
        let options = ParseOptions::new().with_images(false);
        let doc = PdfParser::from_bytes_with_options(&sample_pdf(), options)
            .unwrap()
            .parse()
            .unwrap();
        let page = &doc.pages[0];
        assert!(page.images.is_empty());
        assert!(page.form_images.is_empty());
        let xobjects = page.resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Im0").is_ok());
    }

    #[test]
    fn test_corrupt_input_is_rejected() {
        assert!(matches!(
            PdfParser::from_bytes(b"not a pdf at all"),
            Err(Error::UnknownFormat)
        ));

        let truncated = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog";
        assert!(PdfParser::from_bytes(truncated)
            .and_then(|p| p.parse())
            .is_err());
    }

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20240115103045").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 15);
    }

    #[test]
    fn test_parse_pdf_date_minimal() {
        let date = parse_pdf_date("D:2024").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 1);
        assert!(parse_pdf_date("2024").is_none());
    }
}
