use crate::{normalize_degrees, CodecError, DocumentCodec, PageSize, Placement, RgbaImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeSet, HashMap};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
const MAX_TREE_DEPTH: usize = 32;

/// A parsed document owned by whoever holds the handle.
#[derive(Debug, Clone)]
pub struct PdfHandle {
    document: Document,
    /// Pages whose original content has already been wrapped in `q ... Q`.
    isolated_pages: BTreeSet<ObjectId>,
}

impl PdfHandle {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub(crate) fn page_id(&self, page_index: u32) -> Result<ObjectId, CodecError> {
        let pages = self.document.get_pages();
        pages.get(&(page_index + 1)).copied().ok_or(CodecError::PageOutOfRange {
            page: page_index,
            page_count: pages.len() as u32,
        })
    }

    /// Decoded content stream bytes of a page, concatenated.
    pub fn page_content(&self, page_index: u32) -> Result<Vec<u8>, CodecError> {
        let page_id = self.page_id(page_index)?;
        Ok(self.document.get_page_content(page_id)?)
    }

    fn pages_root(&self) -> Result<ObjectId, CodecError> {
        let catalog = self.document.catalog()?;
        Ok(catalog.get(b"Pages")?.as_reference()?)
    }
}

/// An image XObject embedded into one particular document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfImage {
    id: ObjectId,
}

impl PdfImage {
    fn resource_name(&self) -> String {
        format!("WbIm{}_{}", self.id.0, self.id.1)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfCodec;

impl LopdfCodec {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentCodec for LopdfCodec {
    type Handle = PdfHandle;
    type Image = PdfImage;

    fn load(&self, bytes: &[u8]) -> Result<PdfHandle, CodecError> {
        let document = Document::load_mem(bytes)?;
        if document.trailer.has(b"Encrypt") {
            log::warn!("refusing encrypted document ({} bytes)", bytes.len());
            return Err(CodecError::EncryptedUnsupported);
        }
        if document.get_pages().is_empty() {
            return Err(CodecError::NoPages);
        }

        log::debug!("parsed document with {} pages", document.get_pages().len());
        Ok(PdfHandle { document, isolated_pages: BTreeSet::new() })
    }

    fn page_count(&self, handle: &PdfHandle) -> u32 {
        handle.document.get_pages().len() as u32
    }

    fn page_size(&self, handle: &PdfHandle, page_index: u32) -> Result<PageSize, CodecError> {
        let page_id = handle.page_id(page_index)?;
        let media_box = inherited_attribute(&handle.document, page_id, b"MediaBox")
            .and_then(|object| rect_from(&handle.document, &object))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        Ok(PageSize {
            width_pt: (media_box[2] - media_box[0]).abs(),
            height_pt: (media_box[3] - media_box[1]).abs(),
        })
    }

    fn page_rotation(&self, handle: &PdfHandle, page_index: u32) -> Result<u16, CodecError> {
        let page_id = handle.page_id(page_index)?;
        let rotate = inherited_attribute(&handle.document, page_id, b"Rotate")
            .and_then(|object| resolve(&handle.document, &object).as_i64().ok())
            .unwrap_or(0);

        Ok(normalize_degrees(rotate))
    }

    fn create_empty(&self) -> PdfHandle {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0_i64,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        PdfHandle { document, isolated_pages: BTreeSet::new() }
    }

    fn copy_pages(
        &self,
        source: &PdfHandle,
        page_indices: &[u32],
        target: &mut PdfHandle,
    ) -> Result<Vec<u32>, CodecError> {
        let pages_root = target.pages_root()?;
        let mut next_index = self.page_count(target);
        let mut appended = Vec::with_capacity(page_indices.len());

        for &page_index in page_indices {
            let source_page = source.page_id(page_index)?;
            let copied = import_page(&source.document, source_page, &mut target.document)?;
            attach_to_root(&mut target.document, pages_root, copied)?;
            appended.push(next_index);
            next_index += 1;
        }

        Ok(appended)
    }

    fn set_page_rotation(
        &self,
        handle: &mut PdfHandle,
        page_index: u32,
        degrees: u16,
    ) -> Result<(), CodecError> {
        if degrees % 90 != 0 {
            return Err(CodecError::InvalidRotation(degrees));
        }

        let page_id = handle.page_id(page_index)?;
        let page = handle.document.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Rotate", i64::from(degrees % 360));
        Ok(())
    }

    fn embed_image(
        &self,
        handle: &mut PdfHandle,
        image: &RgbaImage,
    ) -> Result<PdfImage, CodecError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CodecError::EmptyImage);
        }

        let pixel_count = (width as usize) * (height as usize);
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        let soft_mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
            },
            alpha,
        );
        let soft_mask_id = handle.document.add_object(soft_mask);

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "SMask" => Object::Reference(soft_mask_id),
            },
            rgb,
        );
        let id = handle.document.add_object(image_stream);

        Ok(PdfImage { id })
    }

    fn draw_image(
        &self,
        handle: &mut PdfHandle,
        page_index: u32,
        image: &PdfImage,
        placement: Placement,
    ) -> Result<(), CodecError> {
        let page_id = handle.page_id(page_index)?;
        let name = image.resource_name();

        let mut resources = inherited_attribute(&handle.document, page_id, b"Resources")
            .and_then(|object| resolve(&handle.document, &object).as_dict().ok().cloned())
            .unwrap_or_else(Dictionary::new);
        let mut xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| resolve(&handle.document, object).as_dict().ok().cloned())
            .unwrap_or_else(Dictionary::new);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image.id));
        resources.set("XObject", Object::Dictionary(xobjects));

        if handle.isolated_pages.insert(page_id) {
            isolate_existing_content(&mut handle.document, page_id)?;
        }

        let operators = format!(
            "q {:.3} 0 0 {:.3} {:.3} {:.3} cm /{} Do Q\n",
            placement.width, placement.height, placement.x, placement.y, name
        );
        let content_id =
            handle.document.add_object(Stream::new(Dictionary::new(), operators.into_bytes()));

        let page = handle.document.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));
        append_content(page, content_id);
        Ok(())
    }

    fn save(&self, handle: &PdfHandle) -> Result<Vec<u8>, CodecError> {
        let mut document = handle.document.clone();
        document.compress();

        let mut bytes = Vec::new();
        document.save_to(&mut bytes)?;
        log::debug!("serialized document ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn rect_from(document: &Document, object: &Object) -> Option<[f32; 4]> {
    let array = resolve(document, object).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(array) {
        *slot = resolve(document, value).as_float().ok()?;
    }
    Some(rect)
}

/// Looks `key` up on the page, then on its ancestors.
fn inherited_attribute(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = document.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = document.get_dictionary(parent).ok()?;
    }

    None
}

fn is_page(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").and_then(Object::as_name).ok())
        .is_some_and(|name| name == b"Page")
}

/// Deep-copies one page and everything it references into `target`.
///
/// Inherited attributes are materialized on the copy, and references to other
/// pages (link destinations and the like) are cut so the copy never drags the
/// source page tree along.
fn import_page(
    source: &Document,
    page_id: ObjectId,
    target: &mut Document,
) -> Result<ObjectId, CodecError> {
    let mut page = source.get_dictionary(page_id)?.clone();
    for key in INHERITABLE_KEYS {
        if !page.has(key) {
            if let Some(value) = inherited_attribute(source, page_id, key) {
                page.set(key.to_vec(), value);
            }
        }
    }
    page.remove(b"Parent");

    let mut ids = HashMap::new();
    let mut pending = Vec::new();
    let copied_page_id = target.new_object_id();
    ids.insert(page_id, copied_page_id);

    let page = remap_dictionary(&page, &mut ids, &mut pending, target);
    target.objects.insert(copied_page_id, Object::Dictionary(page));

    while let Some((old_id, new_id)) = pending.pop() {
        let object = match source.get_object(old_id) {
            Ok(object) if is_page(object) => Object::Null,
            Ok(object) => remap_object(object, &mut ids, &mut pending, target),
            Err(_) => Object::Null,
        };
        target.objects.insert(new_id, object);
    }

    Ok(copied_page_id)
}

fn remap_object(
    object: &Object,
    ids: &mut HashMap<ObjectId, ObjectId>,
    pending: &mut Vec<(ObjectId, ObjectId)>,
    target: &mut Document,
) -> Object {
    match object {
        Object::Reference(old_id) => {
            let new_id = match ids.get(old_id) {
                Some(new_id) => *new_id,
                None => {
                    let new_id = target.new_object_id();
                    ids.insert(*old_id, new_id);
                    pending.push((*old_id, new_id));
                    new_id
                }
            };
            Object::Reference(new_id)
        }
        Object::Array(items) => {
            Object::Array(items.iter().map(|item| remap_object(item, ids, pending, target)).collect())
        }
        Object::Dictionary(dict) => Object::Dictionary(remap_dictionary(dict, ids, pending, target)),
        Object::Stream(stream) => {
            let mut copied = stream.clone();
            copied.dict = remap_dictionary(&stream.dict, ids, pending, target);
            Object::Stream(copied)
        }
        other => other.clone(),
    }
}

fn remap_dictionary(
    dict: &Dictionary,
    ids: &mut HashMap<ObjectId, ObjectId>,
    pending: &mut Vec<(ObjectId, ObjectId)>,
    target: &mut Document,
) -> Dictionary {
    let mut copied = Dictionary::new();
    for (key, value) in dict.iter() {
        copied.set(key.clone(), remap_object(value, ids, pending, target));
    }
    copied
}

fn attach_to_root(
    document: &mut Document,
    pages_root: ObjectId,
    page_id: ObjectId,
) -> Result<(), CodecError> {
    if let Ok(Object::Dictionary(page)) = document.get_object_mut(page_id) {
        page.set("Parent", Object::Reference(pages_root));
    }

    let root = document.get_object_mut(pages_root)?.as_dict_mut()?;
    let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);

    match root.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => kids.push(Object::Reference(page_id)),
        _ => {
            return Err(CodecError::Malformed("page tree root has no inline Kids array".to_owned()))
        }
    }
    root.set("Count", count + 1);
    Ok(())
}

/// Wraps the page's existing content in `q ... Q` so later overlays start from
/// a clean graphics state.
fn isolate_existing_content(document: &mut Document, page_id: ObjectId) -> Result<(), CodecError> {
    let existing = match document.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    if existing.is_empty() {
        return Ok(());
    }

    let save_id = document.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = document.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(restore_id));

    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

fn append_content(page: &mut Dictionary, content_id: ObjectId) {
    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(existing)) => {
            vec![Object::Reference(*existing), Object::Reference(content_id)]
        }
        Ok(Object::Array(items)) => {
            let mut items = items.clone();
            items.push(Object::Reference(content_id));
            items
        }
        _ => vec![Object::Reference(content_id)],
    };
    page.set("Contents", Object::Array(contents));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_page_document() -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();

        let mut kids = Vec::new();
        for (label, width) in [("first", 612_i64), ("second", 300_i64)] {
            let content = format!("BT /F1 12 Tf 72 720 Td ({label}) Tj ET");
            let content_id =
                document.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(792),
                ],
            });
            kids.push(Object::Reference(page_id));
        }

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2_i64,
                "Rotate" => 90_i64,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("sample document should serialize");
        bytes
    }

    #[test]
    fn loads_page_count_and_inherited_attributes() {
        let codec = LopdfCodec::new();
        let handle = codec.load(&two_page_document()).expect("load should succeed");

        assert_eq!(codec.page_count(&handle), 2);
        assert_eq!(codec.page_rotation(&handle, 0).expect("rotation should resolve"), 90);
        let size = codec.page_size(&handle, 1).expect("size should resolve");
        assert_eq!(size, PageSize { width_pt: 300.0, height_pt: 792.0 });
    }

    #[test]
    fn rejects_garbage_bytes() {
        let codec = LopdfCodec::new();
        let err = codec.load(b"definitely not a pdf").expect_err("garbage must not parse");

        assert!(matches!(err, CodecError::Pdf(_) | CodecError::NoPages));
    }

    /// One page drawing `text`, optionally with an `/Encrypt` trailer entry.
    fn text_document(text: &str, encrypted: bool) -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = document.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));
        if encrypted {
            let encrypt_id = document.add_object(dictionary! {
                "Filter" => "Standard",
                "V" => 1_i64,
                "R" => 2_i64,
                "P" => -4_i64,
            });
            document.trailer.set("Encrypt", Object::Reference(encrypt_id));
        }

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("sample document should serialize");
        bytes
    }

    #[test]
    fn encrypt_keyword_in_page_text_is_not_encryption() {
        let codec = LopdfCodec::new();
        let bytes = text_document("How /Encrypt works", false);

        let handle = codec.load(&bytes).expect("plain document mentioning /Encrypt should load");

        assert_eq!(codec.page_count(&handle), 1);
        let content = handle.page_content(0).expect("content");
        assert!(String::from_utf8_lossy(&content).contains("/Encrypt"));
    }

    #[test]
    fn encrypt_entry_in_trailer_is_rejected() {
        let codec = LopdfCodec::new();
        let err = codec.load(&text_document("secret", true)).expect_err("encrypted must not load");

        assert!(matches!(err, CodecError::EncryptedUnsupported));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let codec = LopdfCodec::new();
        let handle = codec.load(&two_page_document()).expect("load should succeed");
        let err = codec.page_size(&handle, 5).expect_err("page 5 does not exist");

        assert!(matches!(err, CodecError::PageOutOfRange { page: 5, page_count: 2 }));
    }

    #[test]
    fn copy_preserves_order_content_and_inherited_rotation() {
        let codec = LopdfCodec::new();
        let source = codec.load(&two_page_document()).expect("load should succeed");
        let mut target = codec.create_empty();

        let appended =
            codec.copy_pages(&source, &[1, 0], &mut target).expect("copy should succeed");
        assert_eq!(appended, vec![0, 1]);

        let bytes = codec.save(&target).expect("save should succeed");
        let reloaded = codec.load(&bytes).expect("saved output should parse");

        assert_eq!(codec.page_count(&reloaded), 2);
        assert_eq!(codec.page_rotation(&reloaded, 0).expect("rotation"), 90);
        assert_eq!(codec.page_size(&reloaded, 0).expect("size").width_pt, 300.0);
        assert_eq!(
            reloaded.page_content(0).expect("content"),
            source.page_content(1).expect("content")
        );
    }

    #[test]
    fn rotation_must_be_quarter_turns() {
        let codec = LopdfCodec::new();
        let mut handle = codec.load(&two_page_document()).expect("load should succeed");

        codec.set_page_rotation(&mut handle, 1, 180).expect("180 is valid");
        assert_eq!(codec.page_rotation(&handle, 1).expect("rotation"), 180);
        assert_eq!(codec.page_rotation(&handle, 0).expect("rotation"), 90);

        let err = codec.set_page_rotation(&mut handle, 0, 45).expect_err("45 is not valid");
        assert!(matches!(err, CodecError::InvalidRotation(45)));
    }

    #[test]
    fn drawn_images_are_referenced_from_page_content() {
        let codec = LopdfCodec::new();
        let mut handle = codec.load(&two_page_document()).expect("load should succeed");
        let overlay = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 128]));

        let image = codec.embed_image(&mut handle, &overlay).expect("embed should succeed");
        let placement = Placement { x: 10.0, y: 10.0, width: 40.0, height: 20.0 };
        codec.draw_image(&mut handle, 0, &image, placement).expect("draw should succeed");
        codec.draw_image(&mut handle, 0, &image, placement).expect("draw should succeed");

        let bytes = codec.save(&handle).expect("save should succeed");
        let reloaded = codec.load(&bytes).expect("output should parse");
        let content = reloaded.page_content(0).expect("content");
        let text = String::from_utf8_lossy(&content);

        assert_eq!(text.matches(" Do Q").count(), 2);
        assert!(text.starts_with("q\n"));
        assert!(text.contains("(first) Tj"));
    }

    #[test]
    fn empty_images_are_rejected() {
        let codec = LopdfCodec::new();
        let mut handle = codec.create_empty();
        let err = codec
            .embed_image(&mut handle, &RgbaImage::new(0, 0))
            .expect_err("zero-sized image must fail");

        assert!(matches!(err, CodecError::EmptyImage));
    }
}
