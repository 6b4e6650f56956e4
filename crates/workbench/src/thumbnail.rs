use crate::page::{DocId, PageRef};
use image::imageops;
use pdf_engine::{CodecError, PageRasterizer, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailTicket {
    pub page: PageRef,
    pub generation: u64,
}

/// A self-contained thumbnail render: owns a snapshot of the document bytes,
/// so it can run after the workbench has moved on.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    ticket: ThumbnailTicket,
    bytes: Arc<[u8]>,
    page_index: u32,
    target_width_px: u32,
    /// Clockwise turn on top of the page's own rotation.
    preview_rotation: u16,
}

impl ThumbnailJob {
    pub fn ticket(&self) -> ThumbnailTicket {
        self.ticket
    }

    pub fn preview_rotation(&self) -> u16 {
        self.preview_rotation
    }

    pub fn render<R: PageRasterizer>(&self, rasterizer: &R) -> Result<RgbaImage, CodecError> {
        let image =
            rasterizer.render_page_thumbnail(&self.bytes, self.page_index, self.target_width_px)?;
        Ok(match self.preview_rotation {
            90 => imageops::rotate90(&image),
            180 => imageops::rotate180(&image),
            270 => imageops::rotate270(&image),
            _ => image,
        })
    }
}

/// Generation per page. Only the newest ticket for a page is current.
#[derive(Debug, Default)]
pub struct ThumbnailTracker {
    next_generation: u64,
    current: HashMap<PageRef, u64>,
}

impl ThumbnailTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn issue(&mut self, page: PageRef) -> ThumbnailTicket {
        self.next_generation += 1;
        self.current.insert(page, self.next_generation);
        ThumbnailTicket { page, generation: self.next_generation }
    }

    pub(crate) fn job(
        &mut self,
        page: PageRef,
        bytes: Arc<[u8]>,
        target_width_px: u32,
        preview_rotation: u16,
    ) -> ThumbnailJob {
        ThumbnailJob {
            ticket: self.issue(page),
            bytes,
            page_index: page.index,
            target_width_px,
            preview_rotation,
        }
    }

    pub fn is_current(&self, ticket: &ThumbnailTicket) -> bool {
        self.current.get(&ticket.page) == Some(&ticket.generation)
    }

    pub fn invalidate_page(&mut self, page: PageRef) {
        self.current.remove(&page);
    }

    pub fn invalidate_document(&mut self, doc: DocId) {
        self.current.retain(|page, _| page.doc != doc);
    }

    pub fn clear(&mut self) {
        self.current.clear();
    }
}
