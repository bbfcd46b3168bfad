//! Image downsampling and JPEG re-encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Object, Stream};

use crate::error::{Error, Result};
use crate::model::{EmbeddedImage, ObjectStore};

use super::tier::CompressionParameters;

/// Images whose encoded stream is at most this many bytes are left alone.
pub const REENCODE_THRESHOLD: usize = 50 * 1024;

/// Colour layout of raw sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Components {
    Gray,
    Rgb,
    Cmyk,
}

impl Components {
    fn count(&self) -> usize {
        match self {
            Components::Gray => 1,
            Components::Rgb => 3,
            Components::Cmyk => 4,
        }
    }
}

/// Re-encode `image` under `params`.
///
/// Returns `Ok(None)` when the image is left as it is: small, of a kind
/// this encoder does not handle, or not smaller after re-encoding.
/// Decode and encode failures are errors; callers skip the image.
pub fn reencode(
    image: &EmbeddedImage,
    store: &ObjectStore,
    params: &CompressionParameters,
) -> Result<Option<EmbeddedImage>> {
    if image.encoded_len() <= REENCODE_THRESHOLD {
        return Ok(None);
    }

    let decoded = match decode(image, store)? {
        Some(decoded) => decoded,
        None => return Ok(None),
    };
    let decoded = downsample(decoded, params.max_image_dimension());
    let grayscale = matches!(decoded, DynamicImage::ImageLuma8(_));
    let (width, height) = (decoded.width(), decoded.height());

    let data = encode_jpeg(&decoded, params.jpeg_quality())?;
    if data.len() >= image.encoded_len() {
        log::debug!(
            "Re-encoded image is not smaller ({} >= {} bytes), keeping original",
            data.len(),
            image.encoded_len()
        );
        return Ok(None);
    }

    let key = image.key.with_variant(params.fingerprint());
    let mut reencoded = EmbeddedImage::jpeg(key, data, width, height, grayscale);
    let carried_keys: [&[u8]; 3] = [b"SMask", b"Interpolate", b"Intent"];
    for carried in carried_keys {
        if let Ok(value) = image.dict.get(carried) {
            reencoded.dict.set(carried.to_vec(), value.clone());
        }
    }
    Ok(Some(reencoded))
}

/// Decode to 8-bit gray or RGB pixels, or `None` for unsupported layouts.
fn decode(image: &EmbeddedImage, store: &ObjectStore) -> Result<Option<DynamicImage>> {
    if image.is_mask() || image.dict.get(b"Decode").is_ok() {
        return Ok(None);
    }
    let components = match components(image, store) {
        Some(components) => components,
        None => return Ok(None),
    };

    let filters = image.filters();
    match filters.as_slice() {
        [only] if only == "DCTDecode" => {
            // Adobe CMYK JPEGs are stored inverted; leave them alone.
            if components == Components::Cmyk {
                return Ok(None);
            }
            let decoded = image::load_from_memory_with_format(&image.data, ImageFormat::Jpeg)?;
            Ok(Some(match components {
                Components::Gray => DynamicImage::ImageLuma8(decoded.to_luma8()),
                _ => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            }))
        }
        [] | [_] if filters.iter().all(|f| f == "FlateDecode") => {
            if image.bits_per_component() != Some(8) || has_predictor(image) {
                return Ok(None);
            }
            let samples = raw_samples(image)?;
            raw_to_image(image, components, samples).map(Some)
        }
        _ => Ok(None),
    }
}

/// Components per pixel from the colour space, resolving ICC profiles.
fn components(image: &EmbeddedImage, store: &ObjectStore) -> Option<Components> {
    let color_space = image.dict.get(b"ColorSpace").ok().and_then(|cs| store.resolve(cs))?;
    match color_space {
        Object::Name(name) => named_components(name),
        Object::Array(items) => {
            let family = items.first()?.as_name().ok()?;
            if family != b"ICCBased" {
                return named_components(family);
            }
            let profile = items.get(1).and_then(|p| store.resolve(p))?;
            let n = match profile {
                Object::Stream(stream) => stream.dict.get(b"N").and_then(Object::as_i64).ok()?,
                _ => return None,
            };
            match n {
                1 => Some(Components::Gray),
                3 => Some(Components::Rgb),
                4 => Some(Components::Cmyk),
                _ => None,
            }
        }
        _ => None,
    }
}

fn named_components(name: &[u8]) -> Option<Components> {
    match name {
        b"DeviceGray" | b"CalGray" => Some(Components::Gray),
        b"DeviceRGB" | b"CalRGB" => Some(Components::Rgb),
        b"DeviceCMYK" => Some(Components::Cmyk),
        _ => None,
    }
}

fn has_predictor(image: &EmbeddedImage) -> bool {
    match image.dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(parms)) => parms
            .get(b"Predictor")
            .and_then(Object::as_i64)
            .map(|p| p > 1)
            .unwrap_or(false),
        Ok(Object::Null) | Err(_) => false,
        Ok(_) => true,
    }
}

/// Filter-decoded sample bytes.
fn raw_samples(image: &EmbeddedImage) -> Result<Vec<u8>> {
    if image.filters().is_empty() {
        return Ok(image.data.clone());
    }
    let stream = Stream::new(image.dict.clone(), image.data.clone());
    stream
        .decompressed_content()
        .map_err(|e| Error::Image(format!("cannot inflate image data: {}", e)))
}

fn raw_to_image(image: &EmbeddedImage, components: Components, samples: Vec<u8>) -> Result<DynamicImage> {
    let (width, height) = match (image.width(), image.height()) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::Image("image has no valid dimensions".to_string())),
    };
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(components.count()))
        .ok_or_else(|| Error::Image(format!("image dimensions {}x{} are too large", width, height)))?;
    if samples.len() < expected {
        return Err(Error::Image(format!(
            "image data is truncated: {} of {} bytes",
            samples.len(),
            expected
        )));
    }

    let mut samples = samples;
    samples.truncate(expected);
    let invalid = || Error::Image("sample buffer does not match dimensions".to_string());

    match components {
        Components::Gray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(invalid),
        Components::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(invalid),
        Components::Cmyk => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(invalid),
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(samples.len() / 4 * 3);
    for px in samples.chunks_exact(4) {
        let k = 255 - px[3] as u16;
        for channel in &px[..3] {
            rgb.push(((255 - *channel as u16) * k / 255) as u8);
        }
    }
    rgb
}

/// Shrink so neither side exceeds `max_dimension`, keeping the aspect ratio.
fn downsample(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= max_dimension && height <= max_dimension {
        return image;
    }
    let ratio = (max_dimension as f64 / width as f64).min(max_dimension as f64 / height as f64);
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_dimension);
    log::debug!(
        "Downsampling image {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Baseline JPEG at `quality`.
pub(crate) fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    image.write_with_encoder(JpegEncoder::new_with_quality(&mut data, quality))?;
    Ok(data)
}
