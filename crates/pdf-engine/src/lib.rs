//! Document codec and page rasterizer used by the workbench.
//!
//! The workbench never touches the persisted document format directly. It talks
//! to a [`DocumentCodec`] for load/copy/rotate/embed/save and to a
//! [`PageRasterizer`] for previews. [`LopdfCodec`] and [`PreviewRasterizer`] are
//! the default implementations.

use image::{ImageBuffer, Rgba};

mod lopdf_codec;
mod raster;

#[cfg(feature = "test-support")]
pub mod fixtures;

pub use lopdf_codec::{LopdfCodec, PdfHandle, PdfImage};
pub use raster::PreviewRasterizer;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Size as displayed after applying a clockwise rotation in degrees.
    pub fn rotated(self, degrees: u16) -> Self {
        if degrees % 180 == 90 {
            Self { width_pt: self.height_pt, height_pt: self.width_pt }
        } else {
            self
        }
    }
}

/// Placement of a drawn image in page space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(u16),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Load/compose/save primitives for the persisted document format.
///
/// Handles are plain owned values: whoever holds a handle owns that parsed
/// document. Page indices are 0-based.
pub trait DocumentCodec {
    type Handle;
    type Image;

    fn load(&self, bytes: &[u8]) -> Result<Self::Handle, CodecError>;

    fn page_count(&self, handle: &Self::Handle) -> u32;

    fn page_size(&self, handle: &Self::Handle, page_index: u32) -> Result<PageSize, CodecError>;

    /// Effective clockwise rotation of a page, normalized to 0/90/180/270.
    fn page_rotation(&self, handle: &Self::Handle, page_index: u32) -> Result<u16, CodecError>;

    fn create_empty(&self) -> Self::Handle;

    /// Copies `page_indices` of `source` to the end of `target`, in the given
    /// order, and returns the indices the copies received in `target`.
    fn copy_pages(
        &self,
        source: &Self::Handle,
        page_indices: &[u32],
        target: &mut Self::Handle,
    ) -> Result<Vec<u32>, CodecError>;

    fn set_page_rotation(
        &self,
        handle: &mut Self::Handle,
        page_index: u32,
        degrees: u16,
    ) -> Result<(), CodecError>;

    fn embed_image(
        &self,
        handle: &mut Self::Handle,
        image: &RgbaImage,
    ) -> Result<Self::Image, CodecError>;

    fn draw_image(
        &self,
        handle: &mut Self::Handle,
        page_index: u32,
        image: &Self::Image,
        placement: Placement,
    ) -> Result<(), CodecError>;

    fn save(&self, handle: &Self::Handle) -> Result<Vec<u8>, CodecError>;
}

/// Renders pages of serialized documents into pixel buffers.
pub trait PageRasterizer {
    fn render_page_at_scale(
        &self,
        bytes: &[u8],
        page_index: u32,
        scale: f32,
    ) -> Result<RgbaImage, CodecError>;

    /// Renders a page scaled so the (rotated) result is `target_width_px` wide.
    fn render_page_thumbnail(
        &self,
        bytes: &[u8],
        page_index: u32,
        target_width_px: u32,
    ) -> Result<RgbaImage, CodecError>;
}

/// Normalizes any integer angle into `[0, 360)`.
pub fn normalize_degrees(degrees: i64) -> u16 {
    degrees.rem_euclid(360) as u16
}

pub fn default_codec() -> LopdfCodec {
    LopdfCodec::new()
}
