use super::WatermarkConfig;
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::Rgba;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;
use pdf_engine::RgbaImage;
use std::f32::consts::PI;

/// Tile size in pixels. The 5:2 ratio matches the stamp box `(size × 9, size × 3.6)`.
pub const TILE_WIDTH_PX: u32 = 600;
pub const TILE_HEIGHT_PX: u32 = 240;

const MAX_RUN_WIDTH_PX: u32 = 400;
const CELL_PX: u32 = 8;
const MAX_CELL_SCALE: u32 = 5;
const TILT: f32 = PI / 6.0;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Renders the style's text centred on a transparent tile, tilted 30°
/// counter-clockwise, in the style colour at the style opacity.
pub fn render_glyph(config: &WatermarkConfig) -> RgbaImage {
    let [r, g, b] = config.rgb();
    let alpha = (config.opacity() * 255.0).round().clamp(0.0, 255.0) as u8;
    let ink = Rgba([r, g, b, alpha]);

    let glyphs: Vec<[u8; 8]> = config.text().chars().map(glyph_rows).collect();
    let mut tile = RgbaImage::from_pixel(TILE_WIDTH_PX, TILE_HEIGHT_PX, TRANSPARENT);
    if glyphs.is_empty() {
        return tile;
    }

    let natural_width = glyphs.len() as u32 * CELL_PX;
    let scale = (MAX_RUN_WIDTH_PX / natural_width).clamp(1, MAX_CELL_SCALE);
    let run_width = natural_width * scale;
    let run_height = CELL_PX * scale;
    let origin_x = (TILE_WIDTH_PX as i32 - run_width as i32) / 2;
    let origin_y = (TILE_HEIGHT_PX as i32 - run_height as i32) / 2;

    for (position, rows) in glyphs.iter().enumerate() {
        let glyph_x = origin_x + (position as u32 * CELL_PX * scale) as i32;
        if glyph_x >= TILE_WIDTH_PX as i32 {
            break;
        }
        for (row, bits) in rows.iter().enumerate() {
            for column in 0..CELL_PX {
                // Bit 0 is the leftmost pixel of the row.
                if bits & (1 << column) == 0 {
                    continue;
                }
                let x = glyph_x + (column * scale) as i32;
                let y = origin_y + (row as u32 * scale) as i32;
                draw_filled_rect_mut(&mut tile, Rect::at(x, y).of_size(scale, scale), ink);
            }
        }
    }

    rotate_about_center(&tile, -TILT, Interpolation::Nearest, TRANSPARENT)
}

fn glyph_rows(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}
