//! Image XObjects embedded in pages.

use lopdf::{dictionary, Dictionary, Object, ObjectId};

use super::objects::next_origin;

/// Identity of an image stream across pages.
///
/// Pages decoded from one file that draw the same XObject share a key, so
/// the writer emits that stream once. A transformed image keeps the source
/// id and records the transformation in `variant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    pub origin: u64,
    pub id: ObjectId,
    pub variant: u64,
}

impl ImageKey {
    /// Key for an image read from a file.
    pub fn source(origin: u64, id: ObjectId) -> Self {
        Self {
            origin,
            id,
            variant: 0,
        }
    }

    /// Key for an image that exists nowhere else.
    pub fn fresh() -> Self {
        Self {
            origin: next_origin(),
            id: (0, 0),
            variant: 0,
        }
    }

    /// Same source image, different encoding.
    pub fn with_variant(self, variant: u64) -> Self {
        Self { variant, ..self }
    }
}

/// An image XObject as stored in the file: its stream dictionary and the
/// encoded (still filtered) stream bytes.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub key: ImageKey,
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    /// Create an image from a stream dictionary and encoded data.
    pub fn new(key: ImageKey, mut dict: Dictionary, data: Vec<u8>) -> Self {
        dict.remove(b"Length");
        Self { key, dict, data }
    }

    /// Create a baseline JPEG image XObject.
    pub fn jpeg(key: ImageKey, data: Vec<u8>, width: u32, height: u32, grayscale: bool) -> Self {
        let color_space = if grayscale { "DeviceGray" } else { "DeviceRGB" };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        };
        Self { key, dict, data }
    }

    /// Width in pixels.
    pub fn width(&self) -> Option<u32> {
        self.dict
            .get(b"Width")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|w| u32::try_from(w).ok())
    }

    /// Height in pixels.
    pub fn height(&self) -> Option<u32> {
        self.dict
            .get(b"Height")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|h| u32::try_from(h).ok())
    }

    /// Bits per colour component.
    pub fn bits_per_component(&self) -> Option<i64> {
        self.dict
            .get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .ok()
    }

    /// Filter names applied to the stream, outermost first.
    pub fn filters(&self) -> Vec<String> {
        match self.dict.get(b"Filter") {
            Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
            Ok(Object::Array(arr)) => arr
                .iter()
                .filter_map(|f| f.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).to_string())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Colour space name when it is given directly.
    ///
    /// Array colour spaces report their family (`ICCBased`, `Indexed`, ...).
    pub fn color_space(&self) -> Option<String> {
        match self.dict.get(b"ColorSpace").ok()? {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            Object::Array(arr) => arr
                .first()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).to_string()),
            _ => None,
        }
    }

    /// Whether this is a stencil mask rather than a colour image.
    pub fn is_mask(&self) -> bool {
        matches!(self.dict.get(b"ImageMask"), Ok(Object::Boolean(true)))
    }

    /// Whether the stream is JPEG-encoded.
    pub fn is_jpeg(&self) -> bool {
        self.filters().iter().any(|f| f == "DCTDecode")
    }

    /// Size of the encoded stream in bytes.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}
