use crate::{CodecError, DocumentCodec, LopdfCodec, PageRasterizer, RgbaImage};
use image::{imageops, Rgba};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Lightweight preview renderer.
///
/// Draws the page box at the requested scale, a band whose colour is derived
/// from the page's content streams, and applies the page rotation. Two pages
/// with the same box, rotation and content render pixel-identically.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviewRasterizer {
    codec: LopdfCodec,
}

impl PreviewRasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageRasterizer for PreviewRasterizer {
    fn render_page_at_scale(
        &self,
        bytes: &[u8],
        page_index: u32,
        scale: f32,
    ) -> Result<RgbaImage, CodecError> {
        let handle = self.codec.load(bytes)?;
        let page_size = self.codec.page_size(&handle, page_index)?;
        let rotation = self.codec.page_rotation(&handle, page_index)?;
        let content = handle.page_content(page_index)?;
        let scale = if scale <= 0.0 { 1.0 } else { scale };

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        paint_content_band(&mut image, &content);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(match rotation {
            90 => imageops::rotate90(&image),
            180 => imageops::rotate180(&image),
            270 => imageops::rotate270(&image),
            _ => image,
        })
    }

    fn render_page_thumbnail(
        &self,
        bytes: &[u8],
        page_index: u32,
        target_width_px: u32,
    ) -> Result<RgbaImage, CodecError> {
        let handle = self.codec.load(bytes)?;
        let rotation = self.codec.page_rotation(&handle, page_index)?;
        let displayed = self.codec.page_size(&handle, page_index)?.rotated(rotation);

        let scale = if displayed.width_pt > 0.0 {
            target_width_px.max(1) as f32 / displayed.width_pt
        } else {
            1.0
        };

        self.render_page_at_scale(bytes, page_index, scale)
    }
}

/// Fills the top eighth of the page with a colour keyed on the content bytes.
fn paint_content_band(image: &mut RgbaImage, content: &[u8]) {
    if content.is_empty() {
        return;
    }

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let [r, g, b, ..] = hasher.finish().to_le_bytes();
    let band = Rgba([r, g, b, 255]);

    let band_height = (image.height() / 8).max(1);
    for y in 0..band_height {
        for x in 0..image.width() {
            image.put_pixel(x, y, band);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary, Document, Object, Stream};

    fn single_page(rotate: i64, content: &str) -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let content_id =
            document.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Rotate" => rotate,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(200),
                Object::Integer(100),
            ],
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

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("sample document should serialize");
        bytes
    }

    #[test]
    fn render_respects_scale_and_rotation() {
        let rasterizer = PreviewRasterizer::new();

        let upright = rasterizer
            .render_page_at_scale(&single_page(0, "0 0 m"), 0, 0.5)
            .expect("render should succeed");
        assert_eq!(upright.dimensions(), (100, 50));

        let turned = rasterizer
            .render_page_at_scale(&single_page(90, "0 0 m"), 0, 0.5)
            .expect("render should succeed");
        assert_eq!(turned.dimensions(), (50, 100));
    }

    #[test]
    fn thumbnail_targets_displayed_width() {
        let rasterizer = PreviewRasterizer::new();
        let thumb = rasterizer
            .render_page_thumbnail(&single_page(90, "0 0 m"), 0, 50)
            .expect("thumbnail should render");

        assert_eq!(thumb.width(), 50);
        assert_eq!(thumb.height(), 100);
    }

    #[test]
    fn different_content_renders_differently() {
        let rasterizer = PreviewRasterizer::new();
        let first = rasterizer
            .render_page_at_scale(&single_page(0, "1 0 0 RG 0 0 m"), 0, 0.25)
            .expect("render should succeed");
        let second = rasterizer
            .render_page_at_scale(&single_page(0, "0 1 0 RG 0 0 m"), 0, 0.25)
            .expect("render should succeed");

        assert_eq!(first.dimensions(), second.dimensions());
        assert_ne!(first.as_raw(), second.as_raw());
    }
}
