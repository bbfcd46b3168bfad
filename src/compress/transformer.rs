//! Per-page compression strategies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lopdf::Dictionary;
use rayon::prelude::*;

use crate::error::Result;
use crate::model::format_number;
use crate::model::{Document, EmbeddedImage, ImageKey, Page};

use super::raster::PageRasterizer;
use super::resample::reencode;
use super::tier::CompressionParameters;

/// Resource name of the image that replaces a rasterized page.
const RASTER_IMAGE_NAME: &[u8] = b"Im0";

/// Re-encoding results for one document, so an image shared by several
/// pages is decoded once.
#[derive(Default)]
struct ReencodeCache {
    entries: Mutex<HashMap<ImageKey, Option<EmbeddedImage>>>,
}

impl ReencodeCache {
    fn get(&self, key: &ImageKey) -> Option<Option<EmbeddedImage>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn insert(&self, key: ImageKey, value: Option<EmbeddedImage>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, value);
        }
    }
}

/// Applies one tier's parameters to pages.
///
/// Two strategies: *structural* (strip annotations and images, re-encode
/// large images, scale) and *rasterize* (render the page to one JPEG).
/// Rasterizing needs a [`PageRasterizer`] and only applies to pages that
/// draw images under tiers that keep them; a page that fails to render is
/// compressed structurally instead.
#[derive(Clone, Default)]
pub struct PageTransformer {
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl PageTransformer {
    /// Structural strategy only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the rasterize strategy.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Whether a rasterizer is configured.
    pub fn can_rasterize(&self) -> bool {
        self.rasterizer.is_some()
    }

    /// Transform a single page. The input is never modified.
    pub fn transform(&self, page: &Page, params: &CompressionParameters) -> Page {
        self.transform_cached(page, params, &ReencodeCache::default())
    }

    /// Transform every retained page of `doc`.
    ///
    /// With `page_subsampling_stride` N > 1 only pages 1, 1+N, 1+2N, ... are
    /// kept. The result carries no information dictionary.
    pub fn transform_document(
        &self,
        doc: &Document,
        params: &CompressionParameters,
        parallel: bool,
    ) -> Document {
        let stride = params.page_subsampling_stride.max(1) as usize;
        let kept: Vec<&Page> = doc.pages.iter().step_by(stride).collect();
        if stride > 1 {
            log::info!(
                "Page subsampling keeps {} of {} page(s)",
                kept.len(),
                doc.pages.len()
            );
        }

        let cache = ReencodeCache::default();
        let pages: Vec<Page> = if parallel {
            kept.par_iter()
                .map(|page| self.transform_cached(page, params, &cache))
                .collect()
        } else {
            kept.iter()
                .map(|page| self.transform_cached(page, params, &cache))
                .collect()
        };

        doc.with_pages(pages).without_metadata()
    }

    fn transform_cached(
        &self,
        page: &Page,
        params: &CompressionParameters,
        cache: &ReencodeCache,
    ) -> Page {
        if let Some(rasterizer) = &self.rasterizer {
            if should_rasterize(page, params) {
                match rasterize(rasterizer.as_ref(), page, params) {
                    Ok(rendered) => return rendered,
                    Err(e) => log::warn!(
                        "Page {}: {} failed ({}), using structural strategy",
                        page.number,
                        rasterizer.name(),
                        e
                    ),
                }
            }
        }
        structural(page, params, cache)
    }
}

impl std::fmt::Debug for PageTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTransformer")
            .field("rasterizer", &self.rasterizer.as_ref().map(|r| r.name()))
            .finish()
    }
}

fn should_rasterize(page: &Page, params: &CompressionParameters) -> bool {
    !params.drop_images && page.has_images() && page.rotation == 0
}

/// Strip, re-encode and scale.
fn structural(page: &Page, params: &CompressionParameters, cache: &ReencodeCache) -> Page {
    let mut current = if params.drop_annotations {
        page.without_annotations()
    } else {
        page.clone()
    };

    if params.drop_images {
        current = current.without_images();
    } else {
        reencode_images(&mut current, params, cache);
    }

    current.scaled(params.scale_factor)
}

/// Replace large images on `page` (a private copy) with re-encoded ones,
/// including the ones its forms paint.
fn reencode_images(page: &mut Page, params: &CompressionParameters, cache: &ReencodeCache) {
    let store = Arc::clone(page.store());
    let number = page.number;
    let direct = page
        .images
        .iter_mut()
        .map(|(name, image)| (String::from_utf8_lossy(name).into_owned(), image));
    let nested = page
        .form_images
        .iter_mut()
        .filter_map(|(id, image)| image.as_mut().map(|image| (format!("{} {} R", id.0, id.1), image)));

    for (label, image) in direct.chain(nested) {
        let replacement = match cache.get(&image.key) {
            Some(cached) => cached,
            None => {
                let result = match reencode(image, &store, params) {
                    Ok(result) => result,
                    Err(e) => {
                        log::warn!("Page {}: skipping image {}: {}", number, label, e);
                        None
                    }
                };
                cache.insert(image.key, result.clone());
                result
            }
        };
        if let Some(replacement) = replacement {
            *image = replacement;
        }
    }
}

/// Render the page and place the image on a page scaled by `scale_factor`.
fn rasterize(
    rasterizer: &dyn PageRasterizer,
    page: &Page,
    params: &CompressionParameters,
) -> Result<Page> {
    let image = rasterizer.rasterize(page, params)?;

    let base = if params.drop_annotations {
        page.without_annotations()
    } else {
        page.clone()
    };
    let mut rendered = base.scaled(params.scale_factor);

    let area = rendered.media_box;
    rendered.content = format!(
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        format_number(area.width()),
        format_number(area.height()),
        format_number(area.x0),
        format_number(area.y0),
        String::from_utf8_lossy(RASTER_IMAGE_NAME)
    )
    .into_bytes();
    rendered.resources = Dictionary::new();
    rendered.images.clear();
    rendered.form_images.clear();
    rendered.images.insert(RASTER_IMAGE_NAME.to_vec(), image);

    log::debug!("Page {}: rasterized at {} dpi", page.number, params.raster_dpi());
    Ok(rendered)
}
