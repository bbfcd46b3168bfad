//! Page-level types.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};

use super::geometry::{format_number, Affine, PageSize, Rect};
use super::embedded::EmbeddedImage;
use super::objects::ObjectStore;

/// Optional page-level entries removed by a structural strip.
pub const ATTACHMENT_KEYS: &[&[u8]] = &[
    b"AA",
    b"Group",
    b"PieceInfo",
    b"LastModified",
    b"Thumb",
    b"B",
    b"Tabs",
    b"Metadata",
];

/// A single page in the document.
///
/// Pages are values: every transformation returns a new `Page`.
#[derive(Debug, Clone)]
pub struct Page {
    /// Page number in the source document (1-indexed)
    pub number: u32,

    /// Page area in points
    pub media_box: Rect,

    /// Visible region, when narrower than the media box
    pub crop_box: Option<Rect>,

    /// Production boxes carried through unchanged in meaning
    pub bleed_box: Option<Rect>,
    pub trim_box: Option<Rect>,
    pub art_box: Option<Rect>,

    /// Size of one user-space unit in points, when not 1
    pub user_unit: Option<f32>,

    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i64,

    /// Decoded content stream
    pub content: Vec<u8>,

    /// Resource dictionary, without image XObjects
    pub resources: Dictionary,

    /// Image XObjects by resource name
    pub images: BTreeMap<Vec<u8>, EmbeddedImage>,

    /// Images painted from inside form XObjects, by source object id.
    /// `None` marks an image removed from the page.
    pub form_images: BTreeMap<ObjectId, Option<EmbeddedImage>>,

    /// Annotation dictionaries
    pub annotations: Vec<Dictionary>,

    /// Optional page attachments (see [`ATTACHMENT_KEYS`])
    pub attachments: Dictionary,

    /// Objects referenced from `resources`, `annotations` and `attachments`
    pub(crate) store: Arc<ObjectStore>,
}

impl Page {
    /// Create an empty page with the given dimensions.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self::with_store(number, Rect::from_size(width, height), ObjectStore::empty())
    }

    /// Create an empty page backed by an existing object store.
    pub fn with_store(number: u32, media_box: Rect, store: Arc<ObjectStore>) -> Self {
        Self {
            number,
            media_box,
            crop_box: None,
            bleed_box: None,
            trim_box: None,
            art_box: None,
            user_unit: None,
            rotation: 0,
            content: Vec::new(),
            resources: Dictionary::new(),
            images: BTreeMap::new(),
            form_images: BTreeMap::new(),
            annotations: Vec::new(),
            attachments: Dictionary::new(),
            store,
        }
    }

    /// Create an empty page with standard Letter size (8.5 x 11 inches).
    pub fn letter(number: u32) -> Self {
        let (w, h) = PageSize::Letter.dimensions();
        Self::new(number, w, h)
    }

    /// Create an empty page with standard A4 size (210 x 297 mm).
    pub fn a4(number: u32) -> Self {
        let (w, h) = PageSize::A4.dimensions();
        Self::new(number, w, h)
    }

    /// Object store backing this page.
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// Page width in points.
    pub fn width(&self) -> f32 {
        self.media_box.width()
    }

    /// Page height in points.
    pub fn height(&self) -> f32 {
        self.media_box.height()
    }

    /// Get page dimensions as (width, height) tuple.
    pub fn dimensions(&self) -> (f32, f32) {
        (self.width(), self.height())
    }

    /// Check if the page is in landscape orientation.
    pub fn is_landscape(&self) -> bool {
        self.width() > self.height()
    }

    /// Region a viewer shows: the crop box, or the media box without one.
    pub fn visible_box(&self) -> Rect {
        self.crop_box.unwrap_or(self.media_box)
    }

    /// Check if the page draws any image XObjects, directly or through forms.
    pub fn has_images(&self) -> bool {
        !self.images.is_empty() || self.form_images.values().any(Option::is_some)
    }

    /// Total encoded size of the page's images.
    pub fn image_bytes(&self) -> usize {
        self.images
            .values()
            .chain(self.form_images.values().flatten())
            .map(EmbeddedImage::encoded_len)
            .sum()
    }

    /// Replace the content stream.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    /// Add an image under a resource name.
    pub fn with_image(mut self, name: impl Into<Vec<u8>>, image: EmbeddedImage) -> Self {
        self.images.insert(name.into(), image);
        self
    }

    /// Add an annotation dictionary.
    pub fn with_annotation(mut self, annotation: Dictionary) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Copy of this page without annotations and optional attachments.
    pub fn without_annotations(&self) -> Page {
        let mut page = self.clone();
        page.annotations.clear();
        page.attachments = Dictionary::new();
        page
    }

    /// Copy of this page with every image XObject removed.
    ///
    /// `Do` operators that painted the removed images are dropped from the
    /// content stream. If the content cannot be decoded it is kept as-is;
    /// viewers skip unknown XObject names. Images inside forms are marked
    /// removed and stripped from the forms when the page is written.
    pub fn without_images(&self) -> Page {
        let mut page = self.clone();
        for image in page.form_images.values_mut() {
            *image = None;
        }
        if page.images.is_empty() {
            return page;
        }
        let names: BTreeSet<Vec<u8>> = page.images.keys().cloned().collect();
        page.images.clear();

        match strip_image_invocations(&page.content, &names) {
            Some(content) => page.content = content,
            None => log::warn!(
                "Page {}: content stream not decodable, leaving image invocations in place",
                page.number
            ),
        }
        page
    }

    /// Copy of this page with its content scaled uniformly about the origin.
    ///
    /// Every page box scales with the content; rotation is kept.
    pub fn scaled(&self, factor: f32) -> Page {
        let transform = Affine::scale(factor);
        let media_box = self.media_box.transformed(&transform);
        self.transformed(transform, media_box, None)
    }

    /// Copy of this page scaled to fit `size` and centred on it.
    pub fn fit_to(&self, size: PageSize) -> Page {
        let (target_w, target_h) = size.dimensions();
        self.fit_to_dimensions(target_w, target_h)
    }

    /// Copy of this page scaled to fit `target_w` x `target_h` points and centred.
    ///
    /// The region a viewer shows (crop box, rotated by `/Rotate`) is what
    /// gets fitted. The result is upright, has no crop box and uses the
    /// default user unit; content outside the old crop box is clipped.
    pub fn fit_to_dimensions(&self, target_w: f32, target_h: f32) -> Page {
        let visible = self.visible_box();
        let (w, h) = match self.rotation.rem_euclid(360) {
            90 | 270 => (visible.height(), visible.width()),
            _ => (visible.width(), visible.height()),
        };
        let scale = (target_w / w).min(target_h / h);
        let transform = Affine::translate(-visible.x0, -visible.y0)
            .then(&Affine::rotation(self.rotation, visible.width(), visible.height()))
            .then(&Affine::scale(scale))
            .then(&Affine::translate(
                (target_w - w * scale) / 2.0,
                (target_h - h * scale) / 2.0,
            ));

        let mut page = self.transformed(
            transform,
            Rect::from_size(target_w, target_h),
            self.crop_box,
        );
        page.rotation = 0;
        page.crop_box = None;
        page.user_unit = None;
        page
    }

    /// Wrap the content in `transform`, optionally clipped to `clip` in the
    /// old coordinates, and move annotations and page boxes with it.
    fn transformed(&self, transform: Affine, media_box: Rect, clip: Option<Rect>) -> Page {
        let mut page = self.clone();
        page.media_box = media_box;
        if transform.is_identity() && clip.is_none() {
            return page;
        }

        for page_box in [
            &mut page.crop_box,
            &mut page.bleed_box,
            &mut page.trim_box,
            &mut page.art_box,
        ] {
            *page_box = page_box.map(|r| r.transformed(&transform));
        }

        let mut content = Vec::with_capacity(self.content.len() + 96);
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(transform.to_cm().as_bytes());
        content.push(b'\n');
        if let Some(clip) = clip {
            content.extend_from_slice(
                format!(
                    "{} {} {} {} re W n\n",
                    format_number(clip.x0),
                    format_number(clip.y0),
                    format_number(clip.width()),
                    format_number(clip.height())
                )
                .as_bytes(),
            );
        }
        content.extend_from_slice(&self.content);
        content.extend_from_slice(b"\nQ\n");
        page.content = content;

        for annotation in &mut page.annotations {
            let rect = annotation
                .get(b"Rect")
                .and_then(Object::as_array)
                .ok()
                .and_then(|values| Rect::from_objects(values));
            if let Some(rect) = rect {
                annotation.set("Rect", rect.transformed(&transform).to_object());
            }
        }
        page
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::letter(1)
    }
}

/// Remove `Do` operators that paint any of `names`.
pub(crate) fn strip_image_invocations(content: &[u8], names: &BTreeSet<Vec<u8>>) -> Option<Vec<u8>> {
    let mut decoded = Content::decode(content).ok()?;
    decoded.operations.retain(|op| {
        if op.operator != "Do" {
            return true;
        }
        match op.operands.first().and_then(|o| o.as_name().ok()) {
            Some(name) => !names.contains(name),
            None => true,
        }
    });
    decoded.encode().ok()
}
