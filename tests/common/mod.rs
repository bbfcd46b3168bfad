//! PDF fixtures built in memory with lopdf.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Width and height of the fixture photo.
pub const PHOTO_SIZE: (u32, u32) = (200, 150);

fn rect(width: i64, height: i64) -> Object {
    Object::Array(vec![0_i64.into(), 0_i64.into(), width.into(), height.into()])
}

fn finish(mut doc: Document, pages_id: ObjectId, kids: Vec<ObjectId>) -> Vec<u8> {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture serializes");
    out
}

/// One page per `(width, height, label)`, each drawing its label as text.
pub fn labelled_pdf(pages: &[(i64, i64, &str)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for (width, height, label) in pages {
        let content = format!("BT /F1 12 Tf 20 20 Td ({}) Tj ET\n", label);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect(*width, *height),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }));
    }
    finish(doc, pages_id, kids)
}

/// One page of `width` x `height` shown with `/Rotate rotate`, drawing `label`.
pub fn rotated_pdf(width: i64, height: i64, rotate: i64, label: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = format!("BT /F1 12 Tf 20 20 Td ({}) Tj ET\n", label);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(width, height),
        "Rotate" => rotate,
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id])
}

/// Uncompressed RGB gradient, large enough to be re-encoded.
pub fn photo_stream() -> Stream {
    let (width, height) = PHOTO_SIZE;
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width) as u8);
            data.push((y * 255 / height) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        data,
    );
    stream.allows_compression = false;
    stream
}

/// `pages` Letter pages sharing one photo, each with a link annotation and
/// an uncompressed drawing program.
pub fn photo_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let photo_id = doc.add_object(photo_stream());
    let drawing = "0 0 m 612 792 l S\n".repeat(200);

    let mut kids = Vec::new();
    for i in 0..pages {
        let content = format!("q 200 0 0 150 50 50 cm /Im0 Do Q\nBT 20 20 Td (page {}) Tj ET\n{}", i + 1, drawing);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect(612, 792),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => photo_id },
            },
            "Annots" => vec![Object::Dictionary(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => rect(100, 100),
            })],
        }));
    }
    finish(doc, pages_id, kids)
}

/// One Letter page that paints the photo only through a form XObject.
pub fn form_photo_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let photo_id = doc.add_object(photo_stream());
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect(1, 1),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => photo_id },
            },
        },
        b"q 1 0 0 1 0 0 cm /Im0 Do Q 0 0 m 1 1 l S".to_vec(),
    ));
    let content = format!("q 200 0 0 150 50 50 cm /Fm0 Do Q\n{}", "0 0 m 612 792 l S\n".repeat(50));
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(612, 792),
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Fm0" => form_id },
        },
    });
    finish(doc, pages_id, vec![page_id])
}

/// One Letter page cropped to `[100 100 300 300]`, with a bulky drawing.
pub fn cropped_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = "0 0 m 612 792 l S\n".repeat(400);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(612, 792),
        "CropBox" => vec![100_i64.into(), 100_i64.into(), 300_i64.into(), 300_i64.into()],
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id])
}

/// Every image stream in a serialized PDF.
pub fn image_streams(data: &[u8]) -> Vec<Stream> {
    let doc = Document::load_mem(data).expect("output parses");
    doc.objects
        .values()
        .filter_map(|obj| match obj {
            Object::Stream(s) if matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") => {
                Some(s.clone())
            }
            _ => None,
        })
        .collect()
}

/// Decoded content of every form XObject in a serialized PDF.
pub fn form_contents(data: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(data).expect("output parses");
    doc.objects
        .values()
        .filter_map(|obj| match obj {
            Object::Stream(s) if matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form") => {
                let content = if s.dict.get(b"Filter").is_ok() {
                    s.decompressed_content().expect("form decodes")
                } else {
                    s.content.clone()
                };
                Some(String::from_utf8_lossy(&content).into_owned())
            }
            _ => None,
        })
        .collect()
}

/// A single empty page with compressed streams; hard to shrink further.
pub fn minimal_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(10, 10),
    });
    let count = 1_i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture serializes");
    out
}

/// Valid header, unreadable body.
pub fn corrupt_pdf() -> Vec<u8> {
    b"%PDF-1.7\n1 0 obj << /Type /Catalog /Pages 2 0 R\nthis is not a pdf body\n%%EOF".to_vec()
}
