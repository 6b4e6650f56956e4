//! Export pipeline: copy pages in order, apply rotations, stamp watermarks,
//! serialize. The result is handed to an [`ExportSink`].

use crate::error::{WorkbenchError, WorkbenchResult};
use crate::page::PageRef;
use crate::registry::Registry;
use crate::rotation::RotationMap;
use crate::watermark::{render_glyph, WatermarkQueue};
use log::{debug, error, info};
use pdf_engine::{DocumentCodec, PageSize, Placement};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Distance kept between a stamp and the page edge, in points.
const STAMP_MARGIN_PT: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    MergeAll,
    MergeSelected,
    SplitSelected,
    FullDownload,
}

impl ExportKind {
    pub fn suggested_filename(self) -> &'static str {
        match self {
            Self::MergeAll => "merged-all.pdf",
            Self::MergeSelected => "merged-selected.pdf",
            Self::SplitSelected => "splitted.pdf",
            Self::FullDownload => "final.pdf",
        }
    }

    pub fn uses_selection(self) -> bool {
        matches!(self, Self::MergeSelected | Self::SplitSelected)
    }
}

/// Receives finished exports. Delivery is fire-and-forget.
pub trait ExportSink {
    fn deliver(&mut self, bytes: &[u8], suggested_filename: &str, mime_type: &str);
}

/// Writes each export into a directory under its suggested filename.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    delivered: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), delivered: Vec::new() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in delivery order.
    pub fn delivered(&self) -> &[PathBuf] {
        &self.delivered
    }
}

impl ExportSink for DirectorySink {
    fn deliver(&mut self, bytes: &[u8], suggested_filename: &str, mime_type: &str) {
        let path = self.dir.join(suggested_filename);
        let written = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, bytes));
        match written {
            Ok(()) => {
                info!("wrote {} ({mime_type}, {} bytes)", path.display(), bytes.len());
                self.delivered.push(path);
            }
            Err(err) => error!("could not write {}: {err}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub bytes: Vec<u8>,
    pub suggested_filename: String,
    pub mime_type: String,
}

/// Keeps deliveries in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub deliveries: Vec<Delivery>,
}

impl ExportSink for CollectingSink {
    fn deliver(&mut self, bytes: &[u8], suggested_filename: &str, mime_type: &str) {
        self.deliveries.push(Delivery {
            bytes: bytes.to_vec(),
            suggested_filename: suggested_filename.to_string(),
            mime_type: mime_type.to_string(),
        });
    }
}

/// Builds one output document from `pages`, in exactly that order.
///
/// Any codec failure aborts the whole export.
pub fn compose<C: DocumentCodec, R: Rng>(
    registry: &Registry<C>,
    pages: &[PageRef],
    rotations: &RotationMap,
    watermarks: &WatermarkQueue,
    rng: &mut R,
) -> WorkbenchResult<Vec<u8>> {
    if pages.is_empty() {
        return Err(WorkbenchError::ExportFailed {
            reason: "no pages to export".to_string(),
            source: None,
        });
    }

    let codec = registry.codec();
    let mut output = codec.create_empty();

    for &page in pages {
        let source = registry.get(page.doc).map_err(|_| WorkbenchError::ExportFailed {
            reason: format!("page {page} belongs to a document that is no longer loaded"),
            source: None,
        })?;

        let copied = codec
            .copy_pages(source.handle(), &[page.index], &mut output)
            .map_err(WorkbenchError::export)?;
        let Some(&target_index) = copied.first() else {
            return Err(WorkbenchError::ExportFailed {
                reason: format!("page {page} was not copied"),
                source: None,
            });
        };

        let wanted = rotations.get(page);
        let current = codec.page_rotation(&output, target_index).map_err(WorkbenchError::export)?;
        if wanted != current {
            codec
                .set_page_rotation(&mut output, target_index, wanted)
                .map_err(WorkbenchError::export)?;
        }
    }

    if !watermarks.is_empty() {
        stamp_watermarks(codec, &mut output, watermarks, rng)?;
    }

    let bytes = codec.save(&output).map_err(WorkbenchError::export)?;
    debug!("composed {} pages into {} bytes", pages.len(), bytes.len());
    Ok(bytes)
}

fn stamp_watermarks<C: DocumentCodec, R: Rng>(
    codec: &C,
    output: &mut C::Handle,
    watermarks: &WatermarkQueue,
    rng: &mut R,
) -> WorkbenchResult<()> {
    let styles: Vec<_> = watermarks.iter().collect();
    let mut images = Vec::with_capacity(styles.len());
    for style in &styles {
        let image = codec.embed_image(output, &render_glyph(style)).map_err(WorkbenchError::export)?;
        images.push(image);
    }

    let plan = watermarks.stamp_plan();
    for page_index in 0..codec.page_count(output) {
        let page = codec.page_size(output, page_index).map_err(WorkbenchError::export)?;
        for &(position, times) in &plan {
            let (width, height) = styles[position].stamp_size();
            for _ in 0..times {
                let placement = random_placement(rng, page, width, height);
                codec
                    .draw_image(output, page_index, &images[position], placement)
                    .map_err(WorkbenchError::export)?;
            }
        }
    }

    debug!(
        "stamped {} watermark styles on {} pages",
        plan.len(),
        codec.page_count(output)
    );
    Ok(())
}

/// Uniform position for a `width × height` stamp, kept off the page edges.
/// Collapses to the margin when the page is too small for the stamp.
pub fn random_placement<R: Rng>(
    rng: &mut R,
    page: PageSize,
    width: f32,
    height: f32,
) -> Placement {
    let mut axis = |extent: f32, size: f32| {
        let span = extent - size - 2.0 * STAMP_MARGIN_PT;
        if span > 0.0 {
            STAMP_MARGIN_PT + rng.gen::<f32>() * span
        } else {
            STAMP_MARGIN_PT
        }
    };

    let x = axis(page.width_pt, width);
    let y = axis(page.height_pt, height);
    Placement { x, y, width, height }
}
