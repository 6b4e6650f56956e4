//! Watermark styles and the bounded queue of styles stamped at export.

mod glyph;

pub use glyph::render_glyph;

use crate::error::{WorkbenchError, WorkbenchResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const MAX_STYLES: usize = 10;
pub const MAX_STAMPS_PER_PAGE: u32 = 30;

pub const MIN_SIZE_PX: u32 = 8;
pub const MAX_SIZE_PX: u32 = 160;
pub const MIN_OPACITY: f32 = 0.05;
pub const MAX_OPACITY: f32 = 1.0;

pub const DEFAULT_COUNT: u32 = 1;
pub const DEFAULT_SIZE_PX: u32 = 24;
pub const DEFAULT_OPACITY: f32 = 0.5;
pub const DEFAULT_TEXT: &str = "Watermark";
pub const DEFAULT_COLOR: &str = "#bfbfbf";

/// Fallback text and colour for watermark input left blank or unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkDefaults {
    pub text: String,
    pub color: String,
}

impl Default for WatermarkDefaults {
    fn default() -> Self {
        Self { text: DEFAULT_TEXT.to_string(), color: DEFAULT_COLOR.to_string() }
    }
}

/// Watermark form input exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkDraft {
    pub text: String,
    pub count: String,
    pub size_px: String,
    pub opacity: String,
    pub color: String,
}

/// A normalized watermark style plus how many stamps of it go on each page.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkConfig {
    text: String,
    count: u32,
    size_px: u32,
    opacity: f32,
    color: String,
    rgb: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StyleKey {
    text: String,
    size_px: u32,
    opacity_bits: u32,
    color: String,
}

impl WatermarkConfig {
    /// Builds a style from typed values, clamping each into its valid range.
    pub fn new(
        text: &str,
        count: i64,
        size_px: i64,
        opacity: f64,
        color: &str,
        defaults: &WatermarkDefaults,
    ) -> Self {
        let text = normalize_text(text, defaults);
        let count = clamp_reporting("count", count, 1, i64::from(MAX_STAMPS_PER_PAGE)) as u32;
        let size_px =
            clamp_reporting("size", size_px, i64::from(MIN_SIZE_PX), i64::from(MAX_SIZE_PX)) as u32;

        let opacity = if opacity.is_nan() {
            warn!("watermark opacity is not a number, using {DEFAULT_OPACITY}");
            DEFAULT_OPACITY
        } else {
            let clamped = opacity.clamp(f64::from(MIN_OPACITY), f64::from(MAX_OPACITY)) as f32;
            if f64::from(clamped) != opacity {
                warn!("watermark opacity {opacity} clamped to {clamped}");
            }
            clamped
        };

        let (color, rgb) = match parse_hex_color(color) {
            Some(rgb) => (to_hex(rgb), rgb),
            None => {
                let fallback = parse_hex_color(&defaults.color)
                    .or_else(|| parse_hex_color(DEFAULT_COLOR))
                    .unwrap_or([0xbf, 0xbf, 0xbf]);
                if !color.trim().is_empty() {
                    warn!("watermark colour {color:?} not understood, using {}", to_hex(fallback));
                }
                (to_hex(fallback), fallback)
            }
        };

        Self { text, count, size_px, opacity, color, rgb }
    }

    /// Builds a style from raw form input. Numbers are read from their
    /// leading numeric prefix; zero or unreadable values take the defaults
    /// before clamping.
    pub fn from_raw(draft: &WatermarkDraft, defaults: &WatermarkDefaults) -> Self {
        let count = parse_int_prefix(&draft.count)
            .filter(|value| *value != 0)
            .unwrap_or(i64::from(DEFAULT_COUNT));
        let size_px = parse_int_prefix(&draft.size_px)
            .filter(|value| *value != 0)
            .unwrap_or(i64::from(DEFAULT_SIZE_PX));
        let opacity = parse_float_prefix(&draft.opacity)
            .filter(|value| *value != 0.0)
            .unwrap_or(f64::from(DEFAULT_OPACITY));

        Self::new(&draft.text, count, size_px, opacity, &draft.color, defaults)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn size_px(&self) -> u32 {
        self.size_px
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Colour as lowercase `#rrggbb`.
    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    /// Stamp size in points: `(size × 9, size × 3.6)`.
    pub fn stamp_size(&self) -> (f32, f32) {
        let size = self.size_px as f32;
        (size * 9.0, size * 3.6)
    }

    fn style_key(&self) -> StyleKey {
        StyleKey {
            text: self.text.clone(),
            size_px: self.size_px,
            opacity_bits: self.opacity.to_bits(),
            color: self.color.clone(),
        }
    }

    pub fn same_style(&self, other: &Self) -> bool {
        self.style_key() == other.style_key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    /// The style was already queued; its count grew to `count`.
    Merged { count: u32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatermarkQueue {
    entries: Vec<WatermarkConfig>,
}

impl WatermarkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, config: WatermarkConfig) -> WorkbenchResult<EnqueueOutcome> {
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.same_style(&config)) {
            existing.count = (existing.count + config.count).min(MAX_STAMPS_PER_PAGE);
            debug!("watermark \"{}\" merged, count now {}", existing.text, existing.count);
            return Ok(EnqueueOutcome::Merged { count: existing.count });
        }

        if self.entries.len() >= MAX_STYLES {
            return Err(WorkbenchError::QueueFull { capacity: MAX_STYLES });
        }

        debug!(
            "watermark \"{}\" queued ({}px, opacity {}, {} per page)",
            config.text, config.size_px, config.opacity, config.count
        );
        self.entries.push(config);
        Ok(EnqueueOutcome::Added)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatermarkConfig> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of queued counts, before the per-page ceiling.
    pub fn requested_per_page(&self) -> u32 {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    /// Stamps per style for one page, as `(queue position, stamps)`, in queue
    /// order. Styles past the per-page ceiling are truncated or skipped.
    pub fn stamp_plan(&self) -> Vec<(usize, u32)> {
        let mut left = MAX_STAMPS_PER_PAGE;
        let mut plan = Vec::new();
        for (position, entry) in self.entries.iter().enumerate() {
            if left == 0 {
                break;
            }
            let times = entry.count.min(left);
            left -= times;
            plan.push((position, times));
        }
        plan
    }
}

fn normalize_text(text: &str, defaults: &WatermarkDefaults) -> String {
    let stripped: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let trimmed = stripped.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let fallback = defaults.text.trim();
    if fallback.is_empty() {
        DEFAULT_TEXT.to_string()
    } else {
        fallback.to_string()
    }
}

fn clamp_reporting(field: &str, value: i64, min: i64, max: i64) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("watermark {field} {value} clamped to {clamped}");
    }
    clamped
}

/// Accepts `#rgb` and `#rrggbb`, case-insensitive.
fn parse_hex_color(input: &str) -> Option<[u8; 3]> {
    let hex = input.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, digit) in rgb.iter_mut().zip(hex.chars()) {
                let nibble = digit.to_digit(16)? as u8;
                *slot = nibble * 17;
            }
            Some(rgb)
        }
        6 => {
            let mut rgb = [0u8; 3];
            for (slot, pair) in rgb.iter_mut().zip(hex.as_bytes().chunks(2)) {
                let pair = std::str::from_utf8(pair).ok()?;
                *slot = u8::from_str_radix(pair, 16).ok()?;
            }
            Some(rgb)
        }
        _ => None,
    }
}

fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Leading integer of `input`, ignoring whatever follows it. Saturates on
/// overflow.
fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        seen = true;
        value = value.saturating_mul(10).saturating_add(i64::from(byte - b'0'));
    }

    seen.then(|| if negative { -value } else { value })
}

/// Leading decimal number of `input` (`1`, `.5`, `0.3e1`), ignoring
/// whatever follows it.
fn parse_float_prefix(input: &str) -> Option<f64> {
    let trimmed = input.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end += 1;
    }
    let integer_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - integer_start;

    if bytes.get(end) == Some(&b'.') {
        let fraction_start = end + 1;
        let mut cursor = fraction_start;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        digits += cursor - fraction_start;
        if digits > 0 {
            end = cursor;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut cursor = end + 1;
        if matches!(bytes.get(cursor), Some(b'-') | Some(b'+')) {
            cursor += 1;
        }
        let exponent_start = cursor;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        if cursor > exponent_start {
            end = cursor;
        }
    }

    trimmed[..end].parse::<f64>().ok().filter(|value| value.is_finite())
}
