//! Copy objects from source stores into an output document.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::model::{strip_image_invocations, EmbeddedImage, ImageKey, ObjectStore};

/// Deep-copies indirect objects into `out`, assigning fresh ids.
///
/// Each source object is copied at most once per output document, so
/// fonts and images shared between pages stay shared. References into the
/// source page tree are cut (replaced by `null`); the writer builds its own.
///
/// Images that pages reach through form XObjects are written from the
/// page's transformed copy; removed ones become `null` and the forms stop
/// painting them.
pub(super) struct Importer {
    remap: HashMap<(u64, ObjectId), ObjectId>,
    images: HashMap<ImageKey, ObjectId>,
    replacements: HashMap<(u64, ObjectId), EmbeddedImage>,
    removed: HashSet<(u64, ObjectId)>,
}

impl Importer {
    pub(super) fn new() -> Self {
        Self {
            remap: HashMap::new(),
            images: HashMap::new(),
            replacements: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Record what a page did to the images inside its forms.
    pub(super) fn register_form_images(
        &mut self,
        origin: u64,
        form_images: &BTreeMap<ObjectId, Option<EmbeddedImage>>,
    ) {
        for (id, image) in form_images {
            match image {
                Some(image) => {
                    self.replacements.insert((origin, *id), image.clone());
                }
                None => {
                    self.removed.insert((origin, *id));
                }
            }
        }
    }

    /// Number of distinct image streams emitted so far.
    pub(super) fn image_count(&self) -> usize {
        self.images.len()
    }

    pub(super) fn import_object(
        &mut self,
        out: &mut LopdfDocument,
        store: &ObjectStore,
        obj: &Object,
    ) -> Object {
        match obj {
            Object::Reference(id) => self.import_reference(out, store, *id),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.import_object(out, store, item))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.import_dict(out, store, dict)),
            Object::Stream(stream) => Object::Stream(self.import_stream(out, store, stream)),
            other => other.clone(),
        }
    }

    pub(super) fn import_dict(
        &mut self,
        out: &mut LopdfDocument,
        store: &ObjectStore,
        dict: &Dictionary,
    ) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.import_object(out, store, value));
        }
        copy
    }

    fn import_stream(&mut self, out: &mut LopdfDocument, store: &ObjectStore, stream: &Stream) -> Stream {
        let mut dict = stream.dict.clone();
        dict.remove(b"Length");
        let mut content = stream.content.clone();

        let removed = self.removed_names(store, &dict);
        if !removed.is_empty() {
            match form_content(stream).and_then(|c| strip_image_invocations(&c, &removed)) {
                Some(stripped) => {
                    content = stripped;
                    dict.remove(b"Filter");
                    dict.remove(b"DecodeParms");
                }
                None => log::warn!("Form content not decodable, leaving removed images invoked"),
            }
        }

        let dict = self.import_dict(out, store, &dict);
        let mut copy = Stream::new(dict, content);
        copy.allows_compression = stream.allows_compression;
        copy
    }

    /// Names under which a form's resources refer to removed images.
    fn removed_names(&self, store: &ObjectStore, dict: &Dictionary) -> BTreeSet<Vec<u8>> {
        if self.removed.is_empty() {
            return BTreeSet::new();
        }
        let is_form = matches!(dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Form"));
        let xobjects = dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| store.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|resources| resources.get(b"XObject").ok())
            .and_then(|obj| store.resolve(obj))
            .and_then(|obj| obj.as_dict().ok());
        match xobjects {
            Some(xobjects) if is_form => xobjects
                .iter()
                .filter(|(_, value)| match value {
                    Object::Reference(id) => self.removed.contains(&(store.origin(), *id)),
                    _ => false,
                })
                .map(|(name, _)| name.clone())
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    fn import_reference(&mut self, out: &mut LopdfDocument, store: &ObjectStore, id: ObjectId) -> Object {
        if let Some(new_id) = self.remap.get(&(store.origin(), id)) {
            return Object::Reference(*new_id);
        }
        if self.removed.contains(&(store.origin(), id)) {
            return Object::Null;
        }
        if let Some(image) = self.replacements.get(&(store.origin(), id)).cloned() {
            let new_id = self.import_image(out, store, &image);
            self.remap.insert((store.origin(), id), new_id);
            return Object::Reference(new_id);
        }
        let source = match store.get(id) {
            Some(source) => source,
            None => return Object::Null,
        };
        if is_page_tree_node(source) {
            return Object::Null;
        }

        // Registered before recursing so cycles resolve to the new id.
        let new_id = out.new_object_id();
        self.remap.insert((store.origin(), id), new_id);
        let copy = self.import_object(out, store, source);
        out.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }

    /// Emit an image XObject once per [`ImageKey`].
    pub(super) fn import_image(
        &mut self,
        out: &mut LopdfDocument,
        store: &ObjectStore,
        image: &EmbeddedImage,
    ) -> ObjectId {
        if let Some(id) = self.images.get(&image.key) {
            return *id;
        }
        let dict = self.import_dict(out, store, &image.dict);
        let id = out.add_object(Stream::new(dict, image.data.clone()));
        self.images.insert(image.key, id);
        id
    }
}

/// Decoded content of a form stream.
fn form_content(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Some(stream.content.clone());
    }
    stream.decompressed_content().ok()
}

fn is_page_tree_node(obj: &Object) -> bool {
    let dict = match obj {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Page") | Ok(b"Pages")
    )
}
